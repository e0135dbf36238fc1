//! Application context and the single-flight cache that builds it.

use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::config::AppConfig;
use crate::dispatch::{Dispatcher, HandlerRegistry};
use crate::error::{ConfigError, FunctionError};

/// The fully wired set of handlers and their dependencies.
///
/// Built once per process lifetime through [`ContextCache`] and shared by
/// every invocation; never explicitly torn down.
pub struct AppContext {
    pub config: AppConfig,
    pub dispatcher: Dispatcher,
}

impl AppContext {
    /// Wire a context from the given configuration.
    pub fn new(config: AppConfig) -> Self {
        let registry = Arc::new(HandlerRegistry::builtin());
        Self {
            config,
            dispatcher: Dispatcher::new(registry),
        }
    }

    /// Wire a context from process environment configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(AppConfig::from_env()?))
    }
}

// Manual impl: the dispatcher holds trait objects, which blocks a derive.
impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// What happens to the cached slot when construction fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitRetryPolicy {
    /// Clear the slot so the next invocation attempts construction again.
    #[default]
    Retry,
    /// Keep the failed result; every later invocation re-fails with it.
    Permanent,
}

/// The outcome of a context construction attempt.
pub type InitResult = Result<Arc<AppContext>, FunctionError>;

type InitFuture = Shared<BoxFuture<'static, InitResult>>;

/// Single-flight cache for the process-wide [`AppContext`].
///
/// The pending construction future itself is what gets cached, so
/// concurrent cold-start callers observe and await the same in-flight
/// construction instead of triggering duplicates. The slot is checked and
/// set under a brief lock that is never held across an await.
pub struct ContextCache {
    slot: Mutex<Slot>,
    policy: InitRetryPolicy,
}

/// Pending (or settled) construction attempt, tagged with a generation so a
/// failed waiter only clears the attempt it actually awaited.
#[derive(Default)]
struct Slot {
    next_generation: u64,
    pending: Option<(u64, InitFuture)>,
}

impl ContextCache {
    pub fn new(policy: InitRetryPolicy) -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            policy,
        }
    }

    /// Acquire the context, constructing it at most once.
    ///
    /// `init` is invoked only by the caller that finds the slot empty; all
    /// callers await the same shared future and receive its result. Under
    /// [`InitRetryPolicy::Retry`] a failed construction clears the slot so
    /// a later invocation may try again.
    pub async fn acquire<F, Fut>(&self, init: F) -> InitResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = InitResult> + Send + 'static,
    {
        let (generation, fut) = {
            let mut slot = self.lock_slot();
            match &slot.pending {
                Some((generation, pending)) => (*generation, pending.clone()),
                None => {
                    let generation = slot.next_generation;
                    slot.next_generation += 1;
                    let fresh = init().boxed().shared();
                    slot.pending = Some((generation, fresh.clone()));
                    (generation, fresh)
                }
            }
        };

        let result = fut.await;

        if result.is_err() && self.policy == InitRetryPolicy::Retry {
            let mut slot = self.lock_slot();
            // A newer in-flight construction must not be discarded.
            if slot.pending.as_ref().is_some_and(|(g, _)| *g == generation) {
                slot.pending = None;
            }
        }

        result
    }

    /// Whether a construction result (or attempt) is currently cached.
    pub fn is_populated(&self) -> bool {
        self.lock_slot().pending.is_some()
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Slot> {
        // The critical section cannot panic, but recover from poisoning
        // anyway rather than unwinding every later invocation.
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

static GLOBAL: OnceLock<ContextCache> = OnceLock::new();

/// The process-wide cache used by the entry point.
pub fn global_cache() -> &'static ContextCache {
    GLOBAL.get_or_init(|| ContextCache::new(InitRetryPolicy::default()))
}

/// Default initializer for the process-wide context: wire from env config.
pub fn init_from_env() -> impl Future<Output = InitResult> + Send + 'static {
    async {
        AppContext::from_env()
            .map(Arc::new)
            .map_err(FunctionError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn test_config() -> AppConfig {
        AppConfig::from_lookup(|key| {
            (!key.starts_with("SERVER")).then(|| "test-value".to_string())
        })
        .unwrap()
    }

    fn counting_init(
        counter: &Arc<AtomicUsize>,
        fail: bool,
    ) -> impl Future<Output = InitResult> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            // Yield so concurrent callers pile up on the shared future.
            tokio::time::sleep(Duration::from_millis(10)).await;
            if fail {
                Err(FunctionError::opaque("init failed"))
            } else {
                Ok(Arc::new(AppContext::new(test_config())))
            }
        }
    }

    #[tokio::test]
    async fn concurrent_cold_start_constructs_once() {
        let cache = ContextCache::new(InitRetryPolicy::Retry);
        let constructions = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            cache.acquire(|| counting_init(&constructions, false)),
            cache.acquire(|| counting_init(&constructions, false)),
        );

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(constructions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sequential_calls_reuse_the_cached_result() {
        let cache = ContextCache::new(InitRetryPolicy::Retry);
        let constructions = Arc::new(AtomicUsize::new(0));

        cache
            .acquire(|| counting_init(&constructions, false))
            .await
            .unwrap();
        cache
            .acquire(|| counting_init(&constructions, false))
            .await
            .unwrap();

        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        assert!(cache.is_populated());
    }

    #[tokio::test]
    async fn failure_propagates_to_every_waiter() {
        let cache = ContextCache::new(InitRetryPolicy::Retry);
        let constructions = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            cache.acquire(|| counting_init(&constructions, true)),
            cache.acquire(|| counting_init(&constructions, true)),
        );

        assert_eq!(a.unwrap_err(), FunctionError::opaque("init failed"));
        assert_eq!(b.unwrap_err(), FunctionError::opaque("init failed"));
        assert_eq!(constructions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_policy_allows_a_fresh_attempt_after_failure() {
        let cache = ContextCache::new(InitRetryPolicy::Retry);
        let constructions = Arc::new(AtomicUsize::new(0));

        let first = cache.acquire(|| counting_init(&constructions, true)).await;
        assert!(first.is_err());
        assert!(!cache.is_populated());

        let second = cache.acquire(|| counting_init(&constructions, false)).await;
        assert!(second.is_ok());
        assert_eq!(constructions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_policy_keeps_the_failed_attempt() {
        let cache = ContextCache::new(InitRetryPolicy::Permanent);
        let constructions = Arc::new(AtomicUsize::new(0));

        let first = cache.acquire(|| counting_init(&constructions, true)).await;
        let second = cache.acquire(|| counting_init(&constructions, false)).await;

        assert_eq!(first.unwrap_err(), second.unwrap_err());
        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        assert!(cache.is_populated());
    }
}
