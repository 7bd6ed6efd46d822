//! Rate source trait and implementations.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::debug;
use walletd_common::{Currency, RateTable};

use crate::error::{FxError, FxResult};

/// Upstream source of the full exchange-rate table.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Get the source name.
    fn name(&self) -> &str;

    /// Fetch the current rate of every known currency.
    async fn fetch_rates(&self) -> FxResult<RateTable>;
}

/// In-memory rate source with adjustable rates.
///
/// Used by tests, the simulator, and servers started with fixed rates.
pub struct FixedRateSource {
    name: String,
    rates: DashMap<Currency, Decimal>,
    unavailable: AtomicBool,
    delay: Duration,
    fetches: AtomicU64,
}

impl FixedRateSource {
    /// Create a source serving the given `(code, rate)` pairs.
    pub fn new<I, C>(rates: I) -> Self
    where
        I: IntoIterator<Item = (C, Decimal)>,
        C: Into<Currency>,
    {
        Self {
            name: "fixed".to_string(),
            rates: rates.into_iter().map(|(c, r)| (c.into(), r)).collect(),
            unavailable: AtomicBool::new(false),
            delay: Duration::ZERO,
            fetches: AtomicU64::new(0),
        }
    }

    /// Delay every fetch by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the rate of a currency, adding it when unknown.
    pub fn set_rate(&self, currency: impl Into<Currency>, rate: Decimal) {
        self.rates.insert(currency.into(), rate);
    }

    /// Remove a currency from the table.
    pub fn remove_rate(&self, currency: &Currency) {
        self.rates.remove(currency);
    }

    /// Make subsequent fetches fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of fetches served so far, failed ones included.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateSource for FixedRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rates(&self) -> FxResult<RateTable> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FxError::SourceUnavailable(format!(
                "{} source switched off",
                self.name
            )));
        }

        let table = RateTable::new(
            self.rates
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        )?;
        debug!(source = %self.name, currencies = table.len(), "Served rate table");
        Ok(table)
    }
}
