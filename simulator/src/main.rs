//! walletd Simulator
//!
//! Drives concurrent deposits, withdrawals and exchanges against an
//! in-memory ledger and checks that every balance reconciles afterwards.

use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use walletd_fx::ResolverConfig;

mod controller;
mod metrics;
mod scenario;

use controller::{SimulationConfig, SimulationController};
use scenario::{Scenario, ScenarioKind};

/// walletd Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Concurrent load scenarios for the walletd ledger")]
struct Args {
    /// Scenario to run
    #[arg(short, long, value_enum, default_value = "steady-mix")]
    scenario: ScenarioKind,

    /// Number of simulated accounts
    #[arg(short, long, default_value = "10")]
    accounts: usize,

    /// Number of concurrent workers
    #[arg(short, long, default_value = "8")]
    workers: usize,

    /// Total operations across all workers
    #[arg(short, long, default_value = "2000")]
    operations: u64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Rate cache TTL in milliseconds
    #[arg(long, default_value = "100")]
    cache_ttl_ms: u64,

    /// Pause between forced rate resyncs in milliseconds
    #[arg(long, default_value = "20")]
    retry_interval_ms: u64,

    /// Row lock wait bound in milliseconds
    #[arg(long, default_value = "250")]
    lock_timeout_ms: u64,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = SimulationConfig {
        accounts: args.accounts,
        workers: args.workers,
        operations: args.operations,
        seed: args.seed,
        resolver: ResolverConfig {
            cache_ttl: Duration::from_millis(args.cache_ttl_ms),
            retry_interval: Duration::from_millis(args.retry_interval_ms),
            ..ResolverConfig::default()
        },
        lock_timeout: Duration::from_millis(args.lock_timeout_ms),
    };
    config.resolver.validate().map_err(anyhow::Error::msg)?;

    let controller =
        SimulationController::new(config, Scenario::load(args.scenario, args.operations));
    let report = controller.run().await?;
    let metrics = &report.metrics;
    let elapsed = Duration::from_millis(report.elapsed_ms as u64);

    info!("Simulation complete");
    info!("Seed: {}", report.seed);
    info!("Total operations: {}", metrics.total_operations);
    info!(
        "Successful: {} ({:.1}%)",
        metrics.successful_operations,
        metrics.success_rate() * 100.0
    );
    for (kind, count) in &metrics.successes_by_kind {
        info!("  {kind}: {count}");
    }
    info!("Failed: {}", metrics.failed_operations);
    for (code, count) in &metrics.failures_by_code {
        info!("  {code}: {count}");
    }
    info!(
        "Latency: avg {}us, p50 {}us, p99 {}us",
        metrics.average_latency_us(),
        metrics.p50_latency_us(),
        metrics.p99_latency_us()
    );
    info!("Throughput: {:.0} ops/s", metrics.throughput(elapsed));
    info!("Rate fetches: {}", report.rate_fetches);
    info!(
        "Reconciled {} wallets across {} accounts",
        report.reconciliation.wallets_checked, report.reconciliation.accounts_checked
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if !report.reconciliation.is_clean() {
        for mismatch in &report.reconciliation.mismatches {
            warn!("{mismatch}");
        }
        anyhow::bail!(
            "{} balance mismatches",
            report.reconciliation.mismatches.len()
        );
    }

    Ok(())
}
