//! # walletd server
//!
//! REST facade over the wallet ledger.
//!
//! ## Endpoints
//!
//! - `GET /health` - Liveness check
//! - `GET /api/v1/exchange/rates` - Current rate table
//! - `GET /api/v1/accounts/:account/balance` - Balances of an account
//! - `POST /api/v1/accounts/:account/wallet/deposit` - Deposit
//! - `POST /api/v1/accounts/:account/wallet/withdraw` - Withdraw
//! - `POST /api/v1/accounts/:account/exchange` - Exchange between currencies

pub mod config;
mod dto;
mod error;
mod handlers;
mod routes;
mod state;
pub mod upstream;

pub use config::ServerConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
pub use upstream::HttpRateSource;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use walletd_ledger::{TransactionalStore, WalletLedger};

/// HTTP server for a wallet ledger.
pub struct WalletServer<S: TransactionalStore> {
    state: Arc<AppState<S>>,
}

impl<S: TransactionalStore> WalletServer<S> {
    /// Creates a new server around the ledger.
    pub fn new(ledger: WalletLedger<S>) -> Self {
        Self {
            state: Arc::new(AppState::new(ledger)),
        }
    }

    /// Creates the router with all routes and layers configured.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        create_router(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Serves on `addr` until `shutdown` resolves, then drains in-flight
    /// requests.
    pub async fn run(
        self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!(addr = %addr, "walletd listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}
