//! Request and response bodies.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use walletd_common::{AccountWallets, Currency};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Current exchange rates.
#[derive(Debug, Serialize)]
pub struct RatesResponse {
    pub rates: BTreeMap<Currency, Decimal>,
}

/// Balances of an account.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: AccountWallets,
}

/// Deposit or withdrawal request.
#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Decimal,
    pub currency: Currency,
}

/// Deposit or withdrawal response.
#[derive(Debug, Serialize)]
pub struct BalanceChangeResponse {
    pub message: &'static str,
    pub new_balance: AccountWallets,
}

/// Exchange request.
#[derive(Debug, Deserialize)]
pub struct ExchangeRequest {
    pub from_currency: Currency,
    pub to_currency: Currency,
    pub amount: Decimal,
}

/// Exchange response.
#[derive(Debug, Serialize)]
pub struct ExchangeResponse {
    pub message: &'static str,
    pub exchanged_amount: Decimal,
    pub rate: Decimal,
    pub new_balance: AccountWallets,
}
