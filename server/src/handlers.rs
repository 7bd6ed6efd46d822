//! API route handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use walletd_common::AccountId;
use walletd_ledger::TransactionalStore;

use crate::dto::*;
use crate::error::ApiError;
use crate::state::AppState;

type Result<T> = std::result::Result<T, ApiError>;

fn parse_account(raw: &str) -> Result<AccountId> {
    let account = AccountId::new(raw);
    if !account.is_valid() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("Invalid account: {raw}"),
            "INVALID_ACCOUNT",
        ));
    }
    Ok(account)
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /api/v1/exchange/rates
pub async fn get_rates<S: TransactionalStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<RatesResponse>> {
    let table = state.ledger.rates().await?;
    let rates = table.iter().map(|(c, r)| (c.clone(), *r)).collect();
    Ok(Json(RatesResponse { rates }))
}

/// GET /api/v1/accounts/:account/balance
pub async fn get_balance<S: TransactionalStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(account): Path<String>,
) -> Result<Json<BalanceResponse>> {
    let account = parse_account(&account)?;
    let balance = state.ledger.balances(&account).await?;
    Ok(Json(BalanceResponse { balance }))
}

/// POST /api/v1/accounts/:account/wallet/deposit
pub async fn deposit<S: TransactionalStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(account): Path<String>,
    payload: std::result::Result<Json<AmountRequest>, JsonRejection>,
) -> Result<Json<BalanceChangeResponse>> {
    let account = parse_account(&account)?;
    let Json(req) = payload?;

    let new_balance = state
        .ledger
        .deposit(&account, &req.currency, req.amount)
        .await?;

    info!(account = %account, currency = %req.currency, "Deposit accepted");
    Ok(Json(BalanceChangeResponse {
        message: "Account topped up successfully",
        new_balance,
    }))
}

/// POST /api/v1/accounts/:account/wallet/withdraw
pub async fn withdraw<S: TransactionalStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(account): Path<String>,
    payload: std::result::Result<Json<AmountRequest>, JsonRejection>,
) -> Result<Json<BalanceChangeResponse>> {
    let account = parse_account(&account)?;
    let Json(req) = payload?;

    let new_balance = state
        .ledger
        .withdraw(&account, &req.currency, req.amount)
        .await?;

    info!(account = %account, currency = %req.currency, "Withdrawal accepted");
    Ok(Json(BalanceChangeResponse {
        message: "Withdrawal successful",
        new_balance,
    }))
}

/// POST /api/v1/accounts/:account/exchange
pub async fn exchange<S: TransactionalStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(account): Path<String>,
    payload: std::result::Result<Json<ExchangeRequest>, JsonRejection>,
) -> Result<Json<ExchangeResponse>> {
    let account = parse_account(&account)?;
    let Json(req) = payload?;

    let outcome = state
        .ledger
        .exchange(&account, &req.from_currency, &req.to_currency, req.amount)
        .await?;

    Ok(Json(ExchangeResponse {
        message: "Exchange successful",
        exchanged_amount: outcome.exchanged,
        rate: outcome.rate,
        new_balance: outcome.balances,
    }))
}
