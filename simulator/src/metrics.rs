//! Simulation metrics.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use serde::Serialize;

/// Simulation metrics.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationMetrics {
    /// Total operations attempted.
    pub total_operations: u64,
    /// Committed operations.
    pub successful_operations: u64,
    /// Rejected or failed operations.
    pub failed_operations: u64,
    /// Committed operations per kind.
    pub successes_by_kind: BTreeMap<&'static str, u64>,
    /// Failures per error code.
    pub failures_by_code: BTreeMap<&'static str, u64>,
    /// Latency samples (µs).
    #[serde(skip)]
    latency_samples: VecDeque<u64>,
    /// Maximum samples to keep.
    #[serde(skip)]
    max_samples: usize,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            total_operations: 0,
            successful_operations: 0,
            failed_operations: 0,
            successes_by_kind: BTreeMap::new(),
            failures_by_code: BTreeMap::new(),
            latency_samples: VecDeque::with_capacity(10000),
            max_samples: 10000,
        }
    }

    fn sample(&mut self, latency: Duration) {
        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency.as_micros() as u64);
    }

    /// Record a committed operation.
    pub fn record_success(&mut self, kind: &'static str, latency: Duration) {
        self.total_operations += 1;
        self.successful_operations += 1;
        *self.successes_by_kind.entry(kind).or_default() += 1;
        self.sample(latency);
    }

    /// Record a failed operation.
    pub fn record_failure(&mut self, code: &'static str, latency: Duration) {
        self.total_operations += 1;
        self.failed_operations += 1;
        *self.failures_by_code.entry(code).or_default() += 1;
        self.sample(latency);
    }

    /// Get average latency in µs.
    pub fn average_latency_us(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    /// Get p50 latency.
    pub fn p50_latency_us(&self) -> u64 {
        self.percentile_latency(50)
    }

    /// Get p99 latency.
    pub fn p99_latency_us(&self) -> u64 {
        self.percentile_latency(99)
    }

    /// Get percentile latency.
    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Get success rate.
    pub fn success_rate(&self) -> f64 {
        if self.total_operations == 0 {
            return 0.0;
        }

        self.successful_operations as f64 / self.total_operations as f64
    }

    /// Get throughput (operations per second).
    pub fn throughput(&self, elapsed: Duration) -> f64 {
        if elapsed.is_zero() {
            return 0.0;
        }

        self.total_operations as f64 / elapsed.as_secs_f64()
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}
