//! walletd binary
//!
//! Serves the wallet ledger over HTTP, backed by Postgres and an upstream
//! rate feed.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use walletd_fx::{FixedRateSource, RateResolver, RateSource};
use walletd_ledger::{PgStore, WalletLedger};
use walletd_server::{HttpRateSource, ServerConfig, WalletServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting walletd");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }
    let addr = config.socket_addr().map_err(anyhow::Error::msg)?;

    let source: Arc<dyn RateSource> = match &config.fixed_rates {
        Some(rates) => {
            info!(currencies = rates.len(), "Serving fixed rates");
            Arc::new(FixedRateSource::new(rates.clone()))
        }
        None => {
            info!(url = %config.rates_url, "Polling upstream rate feed");
            Arc::new(HttpRateSource::new(
                config.rates_url.clone(),
                config.resolver.request_timeout,
            )?)
        }
    };
    let resolver = Arc::new(RateResolver::new(source, config.resolver.clone()).await?);

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    let store = PgStore::new(pool);
    store.migrate().await?;

    let server = WalletServer::new(WalletLedger::new(store, resolver));
    server.run(addr, shutdown_signal()).await?;

    info!("walletd shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
