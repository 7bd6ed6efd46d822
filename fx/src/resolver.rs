//! Currency validation and rate resolution over a cached rate table.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};
use walletd_common::{Currency, RateTable};

use crate::cache::{CacheStats, TtlCache};
use crate::error::{FxError, FxResult};
use crate::provider::RateSource;

/// Configuration for the rate resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// How long a fetched rate table is served before refreshing.
    pub cache_ttl: Duration,
    /// Forced resyncs attempted when a currency is missing.
    pub max_attempts: u32,
    /// Pause before each forced resync.
    pub retry_interval: Duration,
    /// Overall bound on one rate lookup.
    pub request_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(5),
            max_attempts: 3,
            retry_interval: Duration::from_millis(500),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl ResolverConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_ttl.is_zero() {
            return Err("cache_ttl must be greater than zero".to_string());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.request_timeout <= self.retry_interval {
            return Err("request_timeout must be larger than retry_interval".to_string());
        }
        Ok(())
    }
}

/// Answers currency and rate questions from a [`TtlCache`] of the full
/// rate table.
pub struct RateResolver {
    cache: TtlCache<RateTable>,
    config: ResolverConfig,
    source_name: String,
}

impl RateResolver {
    /// Create a resolver, fetching the first rate table from `source`.
    pub async fn new(source: Arc<dyn RateSource>, config: ResolverConfig) -> FxResult<Self> {
        let source_name = source.name().to_string();
        let cache = TtlCache::new(
            move || {
                let source = source.clone();
                async move { source.fetch_rates().await }
            },
            config.cache_ttl,
        )
        .await?;

        debug!(source = %source_name, ttl = ?config.cache_ttl, "Rate resolver ready");

        Ok(Self {
            cache,
            config,
            source_name,
        })
    }

    /// Whether the currency is in the current rate table.
    ///
    /// Reads the cache honoring its TTL and never retries: absence is
    /// reported as `false` straight away.
    #[instrument(skip(self), fields(currency = %currency))]
    pub async fn is_exist_currency(&self, currency: &Currency) -> FxResult<bool> {
        let rates = self.cache.get_data().await.map_err(|stale| stale.into_error())?;
        Ok(rates.contains(currency))
    }

    /// The full current rate table.
    pub async fn get_rates(&self) -> FxResult<Arc<RateTable>> {
        self.cache.get_data().await.map_err(|stale| stale.into_error())
    }

    /// Rate converting `from` into `to`.
    ///
    /// A currency missing from the cached table triggers up to
    /// `max_attempts` forced resyncs, `retry_interval` apart. The whole
    /// lookup is bounded by `request_timeout`.
    #[instrument(skip(self), fields(from = %from, to = %to))]
    pub async fn get_rate(&self, from: &Currency, to: &Currency) -> FxResult<Decimal> {
        match tokio::time::timeout(self.config.request_timeout, self.resolve(from, to)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.config.request_timeout, "Rate lookup timed out");
                Err(FxError::Timeout(self.config.request_timeout))
            }
        }
    }

    async fn resolve(&self, from: &Currency, to: &Currency) -> FxResult<Decimal> {
        let mut rates = self.cache.get_data().await.map_err(|stale| stale.into_error())?;

        for attempt in 1..=self.config.max_attempts {
            if let Some(rate) = rates.rate(from, to) {
                return Ok(rate);
            }

            debug!(attempt, "Rate missing from cached table, forcing resync");
            tokio::time::sleep(self.config.retry_interval).await;

            rates = match self.cache.force_sync().await {
                Ok(fresh) => fresh,
                Err(stale) => {
                    warn!(
                        attempt,
                        source = %self.source_name,
                        error = %stale.error,
                        "Forced resync failed"
                    );
                    stale.value
                }
            };
        }

        rates.rate(from, to).ok_or_else(|| FxError::RateResolutionFailed {
            from: from.clone(),
            to: to.clone(),
        })
    }

    /// Statistics of the underlying cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Resolver configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }
}
