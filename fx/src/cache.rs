//! Single-flight value cache with TTL support.
//!
//! A [`TtlCache`] holds exactly one value produced by an async fetch
//! function. Reads within the TTL are served from memory. Once the TTL has
//! elapsed, the first caller becomes the refresh coordinator and runs the
//! fetch; every caller arriving while that fetch is in flight waits for it
//! instead of issuing a second one.
//!
//! Only the coordinator observes a fetch failure. Callers that joined the
//! refresh get whatever value is cached once it completes, with no error,
//! even when the refresh failed and that value is the old one.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{FxError, FxResult};

type FetchFn<T> = Box<dyn Fn() -> BoxFuture<'static, FxResult<T>> + Send + Sync>;

struct CacheState<T> {
    value: Arc<T>,
    last_sync: Instant,
    /// Completion signal of the refresh in flight, if any.
    in_flight: Option<watch::Receiver<bool>>,
}

/// A refresh failure seen by the coordinating caller.
///
/// The cached value is left untouched and handed back alongside the error.
pub struct StaleRead<T> {
    /// The value still cached after the failed refresh.
    pub value: Arc<T>,
    /// Why the refresh failed.
    pub error: FxError,
}

impl<T> StaleRead<T> {
    /// Discard the stale value and keep the error.
    pub fn into_error(self) -> FxError {
        self.error
    }
}

impl<T> fmt::Debug for StaleRead<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaleRead")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for StaleRead<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "refresh failed, serving cached value: {}", self.error)
    }
}

impl<T> std::error::Error for StaleRead<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served within the TTL.
    pub hits: u64,
    /// Fetches issued after construction, successful or not.
    pub refreshes: u64,
    /// Fetches that returned an error.
    pub failed_refreshes: u64,
    /// Reads that waited on another caller's refresh.
    pub joins: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    refreshes: AtomicU64,
    failed_refreshes: AtomicU64,
    joins: AtomicU64,
}

enum Step<T> {
    Fresh(Arc<T>),
    Join(watch::Receiver<bool>),
    Lead(watch::Sender<bool>),
}

/// Clears the in-flight marker and wakes joiners when the coordinator
/// finishes, including when its future is dropped mid-fetch.
struct InFlightGuard<'a, T> {
    state: &'a Mutex<CacheState<T>>,
    done: watch::Sender<bool>,
}

impl<T> Drop for InFlightGuard<'_, T> {
    fn drop(&mut self) {
        self.state.lock().in_flight = None;
        self.done.send_replace(true);
    }
}

/// Time-bounded, single-flight cache of one value.
pub struct TtlCache<T> {
    state: Mutex<CacheState<T>>,
    fetch: FetchFn<T>,
    ttl: Duration,
    counters: Counters,
}

impl<T: Send + Sync + 'static> TtlCache<T> {
    /// Create a cache, running the first fetch before returning.
    ///
    /// Fails with [`FxError::Initialization`] when that fetch fails, so a
    /// cache never exists without a value.
    pub async fn new<F, Fut>(fetch: F, ttl: Duration) -> FxResult<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FxResult<T>> + Send + 'static,
    {
        let fetch: FetchFn<T> = Box::new(move || fetch().boxed());
        let value = fetch()
            .await
            .map_err(|e| FxError::Initialization(Box::new(e)))?;

        Ok(Self {
            state: Mutex::new(CacheState {
                value: Arc::new(value),
                last_sync: Instant::now(),
                in_flight: None,
            }),
            fetch,
            ttl,
            counters: Counters::default(),
        })
    }

    /// Get the cached value, refreshing it first if the TTL has elapsed.
    pub async fn get_data(&self) -> Result<Arc<T>, StaleRead<T>> {
        self.read(true).await
    }

    /// Refresh regardless of the TTL, or join the refresh already in flight.
    pub async fn force_sync(&self) -> Result<Arc<T>, StaleRead<T>> {
        self.read(false).await
    }

    /// Time since the last successful refresh.
    pub fn age(&self) -> Duration {
        self.state.lock().last_sync.elapsed()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            refreshes: self.counters.refreshes.load(Ordering::Relaxed),
            failed_refreshes: self.counters.failed_refreshes.load(Ordering::Relaxed),
            joins: self.counters.joins.load(Ordering::Relaxed),
        }
    }

    async fn read(&self, honor_ttl: bool) -> Result<Arc<T>, StaleRead<T>> {
        let step = {
            let mut state = self.state.lock();
            if honor_ttl && state.last_sync.elapsed() < self.ttl {
                Step::Fresh(state.value.clone())
            } else if let Some(done) = &state.in_flight {
                Step::Join(done.clone())
            } else {
                let (tx, rx) = watch::channel(false);
                state.in_flight = Some(rx);
                Step::Lead(tx)
            }
        };

        match step {
            Step::Fresh(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit");
                Ok(value)
            }
            Step::Join(mut done) => {
                self.counters.joins.fetch_add(1, Ordering::Relaxed);
                debug!("Joining in-flight refresh");
                // A closed channel means the coordinator was dropped; the refresh is over either way.
                let _ = done.wait_for(|finished| *finished).await;
                Ok(self.state.lock().value.clone())
            }
            Step::Lead(done) => self.refresh(done).await,
        }
    }

    async fn refresh(&self, done: watch::Sender<bool>) -> Result<Arc<T>, StaleRead<T>> {
        let _guard = InFlightGuard {
            state: &self.state,
            done,
        };
        self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
        debug!("Cache expired, refreshing");

        let fetched = (self.fetch)().await;

        let mut state = self.state.lock();
        match fetched {
            Ok(value) => {
                state.value = Arc::new(value);
                state.last_sync = Instant::now();
                Ok(state.value.clone())
            }
            Err(error) => {
                self.counters.failed_refreshes.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %error,
                    age_ms = state.last_sync.elapsed().as_millis() as u64,
                    "Refresh failed, keeping cached value"
                );
                Err(StaleRead {
                    value: state.value.clone(),
                    error,
                })
            }
        }
    }

    /// Backdate the last refresh so the next read sees an expired value.
    #[cfg(test)]
    pub(crate) fn expire(&self) {
        let mut state = self.state.lock();
        if let Some(past) = Instant::now().checked_sub(self.ttl + Duration::from_millis(1)) {
            state.last_sync = past;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counting_fetch(
        counter: Arc<AtomicU32>,
        delay: Duration,
        fail_on: Option<u32>,
    ) -> impl Fn() -> BoxFuture<'static, FxResult<u32>> + Send + Sync + 'static {
        move || {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(delay).await;
                let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if Some(call) == fail_on {
                    return Err(FxError::SourceUnavailable("update failed".into()));
                }
                Ok(call)
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_construction_fetches_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let cache = TtlCache::new(
            counting_fetch(counter.clone(), Duration::ZERO, None),
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(*cache.get_data().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_construction_failure() {
        let counter = Arc::new(AtomicU32::new(0));
        let result = TtlCache::new(
            counting_fetch(counter, Duration::ZERO, Some(1)),
            Duration::from_secs(60),
        )
        .await;

        assert!(matches!(result, Err(FxError::Initialization(_))));
    }

    #[tokio::test]
    async fn test_reads_within_ttl_do_not_fetch() {
        let counter = Arc::new(AtomicU32::new(0));
        let cache = TtlCache::new(
            counting_fetch(counter.clone(), Duration::ZERO, None),
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        assert_eq!(*cache.get_data().await.unwrap(), 1);
        assert_eq!(*cache.get_data().await.unwrap(), 1);

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits, 2);
        assert_eq!(cache.stats().refreshes, 0);
    }

    #[tokio::test]
    async fn test_refresh_after_ttl() {
        let counter = Arc::new(AtomicU32::new(0));
        let cache = TtlCache::new(
            counting_fetch(counter.clone(), Duration::ZERO, None),
            Duration::from_millis(50),
        )
        .await
        .unwrap();

        assert_eq!(*cache.get_data().await.unwrap(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(*cache.get_data().await.unwrap(), 2);
        assert_eq!(*cache.get_data().await.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_expired_reads_fetch_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let cache = Arc::new(
            TtlCache::new(
                counting_fetch(counter.clone(), Duration::from_millis(50), None),
                Duration::from_millis(100),
            )
            .await
            .unwrap(),
        );
        cache.expire();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_data().await })
            })
            .collect();

        for handle in handles {
            let value = handle.await.unwrap().unwrap();
            assert_eq!(*value, 2);
        }

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().refreshes, 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_value() {
        let counter = Arc::new(AtomicU32::new(0));
        let cache = TtlCache::new(
            counting_fetch(counter.clone(), Duration::ZERO, Some(2)),
            Duration::from_millis(50),
        )
        .await
        .unwrap();

        cache.expire();
        let stale = cache.get_data().await.unwrap_err();
        assert_eq!(*stale.value, 1);
        assert_eq!(stale.error.to_string(), "rate source unavailable: update failed");

        // The marker is cleared, so the next expired read retries.
        let value = cache.get_data().await.unwrap();
        assert_eq!(*value, 3);
        assert_eq!(cache.stats().failed_refreshes, 1);
    }

    #[tokio::test]
    async fn test_age_tracks_successful_refreshes() {
        let counter = Arc::new(AtomicU32::new(0));
        let ttl = Duration::from_secs(60);
        let cache = TtlCache::new(counting_fetch(counter.clone(), Duration::ZERO, Some(2)), ttl)
            .await
            .unwrap();
        assert!(cache.age() < ttl);

        cache.expire();
        assert!(cache.age() > ttl);

        // A failed refresh leaves the timestamp of the value it kept.
        let stale = cache.get_data().await.unwrap_err();
        assert_eq!(
            stale.to_string(),
            "refresh failed, serving cached value: rate source unavailable: update failed"
        );
        assert!(cache.age() > ttl);

        assert_eq!(*cache.get_data().await.unwrap(), 3);
        assert!(cache.age() < Duration::from_secs(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_joiner_does_not_see_refresh_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let cache = Arc::new(
            TtlCache::new(
                counting_fetch(counter.clone(), Duration::from_millis(100), Some(2)),
                Duration::from_secs(60),
            )
            .await
            .unwrap(),
        );
        cache.expire();

        let coordinator = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_data().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let joiner = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_data().await })
        };

        let coordinator = coordinator.await.unwrap();
        let joiner = joiner.await.unwrap();

        let stale = coordinator.unwrap_err();
        assert_eq!(*stale.value, 1);
        assert_eq!(*joiner.unwrap(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().joins, 1);
    }

    #[tokio::test]
    async fn test_force_sync_ignores_ttl() {
        let counter = Arc::new(AtomicU32::new(0));
        let cache = TtlCache::new(
            counting_fetch(counter.clone(), Duration::ZERO, None),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();

        assert_eq!(*cache.get_data().await.unwrap(), 1);
        assert_eq!(*cache.force_sync().await.unwrap(), 2);
        assert_eq!(*cache.get_data().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_force_sync_error_keeps_value() {
        let counter = Arc::new(AtomicU32::new(0));
        let cache = TtlCache::new(
            counting_fetch(counter.clone(), Duration::ZERO, Some(2)),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();

        let stale = cache.force_sync().await.unwrap_err();
        assert_eq!(stale.error.to_string(), "rate source unavailable: update failed");
        assert_eq!(*stale.value, 1);

        assert_eq!(*cache.get_data().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_force_sync_fetches_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let cache = Arc::new(
            TtlCache::new(
                counting_fetch(counter.clone(), Duration::from_millis(50), None),
                Duration::from_secs(3600),
            )
            .await
            .unwrap(),
        );

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.force_sync().await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(*cache.get_data().await.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelled_refresh_releases_joiners() {
        let counter = Arc::new(AtomicU32::new(0));
        let cache = Arc::new(
            TtlCache::new(
                counting_fetch(counter.clone(), Duration::from_millis(200), None),
                Duration::from_secs(3600),
            )
            .await
            .unwrap(),
        );

        // Coordinator gives up long before the fetch completes.
        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), cache.force_sync()).await;
        assert!(cancelled.is_err());

        // No refresh is left in flight: the next call leads a new one.
        let value = cache.force_sync().await.unwrap();
        assert_eq!(*value, 2);
        assert_eq!(cache.stats().joins, 0);
    }
}
