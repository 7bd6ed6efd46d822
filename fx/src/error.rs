//! Rate cache and resolver error types.

use std::time::Duration;

use thiserror::Error;
use walletd_common::{Currency, InvalidRateError, WalletError};

/// Errors that can occur while fetching or resolving rates.
#[derive(Debug, Error)]
pub enum FxError {
    /// The initial fetch failed, so no cache could be built.
    #[error("rate cache initialization failed: {0}")]
    Initialization(#[source] Box<FxError>),

    /// The upstream rate source returned an error.
    #[error("rate source unavailable: {0}")]
    SourceUnavailable(String),

    /// The upstream rate source returned an unusable table.
    #[error("invalid rate table: {0}")]
    InvalidRate(#[from] InvalidRateError),

    /// Rate lookup exceeded its request timeout.
    #[error("rate lookup timed out after {0:?}")]
    Timeout(Duration),

    /// Rate still unknown after every retry.
    #[error("rate not available for {from}/{to}")]
    RateResolutionFailed { from: Currency, to: Currency },
}

/// Result type for rate operations.
pub type FxResult<T> = Result<T, FxError>;

impl From<FxError> for WalletError {
    fn from(err: FxError) -> Self {
        match err {
            FxError::Timeout(after) => WalletError::Timeout(format!("{after:?}")),
            FxError::RateResolutionFailed { from, to } => {
                WalletError::RateResolutionFailed { from, to }
            }
            other => WalletError::RateSourceUnavailable(other.to_string()),
        }
    }
}
