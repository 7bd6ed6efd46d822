//! walletd FX
//!
//! Exchange-rate plumbing for the wallet ledger.
//!
//! # Features
//!
//! - Single-flight TTL cache: one upstream fetch per expiry, shared by every
//!   concurrent caller
//! - Currency validation and pairwise rate resolution with bounded
//!   forced-resync retries
//! - Pluggable upstream rate sources
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use walletd_fx::{FixedRateSource, RateResolver, ResolverConfig};
//! use walletd_common::Currency;
//!
//! let source = Arc::new(FixedRateSource::new([("USD", dec!(1)), ("EUR", dec!(0.92))]));
//! let resolver = RateResolver::new(source, ResolverConfig::default()).await?;
//!
//! let rate = resolver.get_rate(&Currency::usd(), &Currency::eur()).await?;
//! ```

pub mod cache;
pub mod error;
pub mod provider;
pub mod resolver;

pub use cache::{CacheStats, StaleRead, TtlCache};
pub use error::{FxError, FxResult};
pub use provider::{FixedRateSource, RateSource};
pub use resolver::{RateResolver, ResolverConfig};
