//! Error types for wallet ledger operations.

use crate::Currency;
use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for wallet operations.
#[derive(Error, Debug)]
pub enum WalletError {
    /// Amount is exactly zero.
    #[error("amount cannot be zero")]
    ZeroAmount,

    /// Amount is below zero.
    #[error("amount cannot be negative")]
    NegativeAmount,

    /// Currency is absent from the current rate table.
    #[error("currency does not exist: {0}")]
    NonExistentCurrency(Currency),

    /// Withdrawal exceeds the wallet balance.
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    /// Amount, exchanged amount or resulting balance does not fit a decimal.
    #[error("amount out of range: {0}")]
    AmountOverflow(String),

    /// Rate lookup did not finish within its deadline.
    #[error("rate lookup timed out: {0}")]
    Timeout(String),

    /// Rate could not be resolved after exhausting retries.
    #[error("failed to resolve rate {from}/{to}")]
    RateResolutionFailed { from: Currency, to: Currency },

    /// Upstream rate source failed.
    #[error("rate source unavailable: {0}")]
    RateSourceUnavailable(String),

    /// Store or transport failure.
    #[error("store failure: {0}")]
    StoreFailure(String),
}

impl WalletError {
    /// Check if this error is caused by caller input or account state.
    ///
    /// Validation errors are never retried automatically.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WalletError::ZeroAmount
                | WalletError::NegativeAmount
                | WalletError::NonExistentCurrency(_)
                | WalletError::InsufficientBalance { .. }
                | WalletError::AmountOverflow(_)
        )
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            WalletError::ZeroAmount => "ZERO_AMOUNT",
            WalletError::NegativeAmount => "NEGATIVE_AMOUNT",
            WalletError::NonExistentCurrency(_) => "NON_EXISTENT_CURRENCY",
            WalletError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            WalletError::AmountOverflow(_) => "AMOUNT_OVERFLOW",
            WalletError::Timeout(_) => "TIMEOUT",
            WalletError::RateResolutionFailed { .. } => "RATE_RESOLUTION_FAILED",
            WalletError::RateSourceUnavailable(_) => "RATE_SOURCE_UNAVAILABLE",
            WalletError::StoreFailure(_) => "STORE_FAILURE",
        }
    }

    /// Wrap any store/transport error.
    pub fn store(err: impl std::fmt::Display) -> Self {
        WalletError::StoreFailure(err.to_string())
    }
}

/// Result type alias for wallet operations.
pub type Result<T> = std::result::Result<T, WalletError>;
