//! Compute-through cache helpers.
//!
//! [`CacheBridge`] fronts an async computation with a [`SharedCache`]: a hit
//! returns the cached value, a miss awaits the computation and stores the
//! result only if it succeeded.
//!
//! # Concurrency
//!
//! [`CacheBridge::get_or_compute`] has no single-flight guard. Concurrent
//! misses for the same key each run their computation and the last one to
//! finish wins. Callers that need at most one computation per key use
//! [`CacheBridge::get_or_compute_single_flight`].
//!
//! The cache lock is only taken for the synchronous lookup and store, never
//! across the computation's await.
//!
//! # Invalidation
//!
//! [`CacheBridge::invalidate_where`] bumps an invalidation generation under
//! the cache lock. A computation that started before the bump still returns
//! its value to its caller but does not store it, so a change that lands
//! mid-fetch is never masked by the pre-change result.

use crate::invalidation::InvalidationSink;
use crate::lock::mutex_lock;
use crate::shared::SharedCache;
use chatsync_types::InvalidationTarget;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

type Gate = Arc<tokio::sync::Mutex<()>>;

/// Cache-or-compute front for a [`SharedCache`].
pub struct CacheBridge<K: Hash + Eq, V> {
    cache: SharedCache<K, V>,
    in_flight: Arc<Mutex<HashMap<K, Gate>>>,
    generation: Arc<AtomicU64>,
}

impl<K: Hash + Eq, V> Clone for CacheBridge<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            in_flight: Arc::clone(&self.in_flight),
            generation: Arc::clone(&self.generation),
        }
    }
}

impl<K: Hash + Eq, V> fmt::Debug for CacheBridge<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBridge")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl<K, V> CacheBridge<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug,
    V: Clone,
{
    /// Front `cache`.
    pub fn new(cache: SharedCache<K, V>) -> Self {
        Self {
            cache,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The underlying cache.
    pub fn cache(&self) -> &SharedCache<K, V> {
        &self.cache
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// On a hit `compute` is never called. On a miss the result of
    /// `compute` is stored with `ttl` (or the cache's `max_age` when `None`)
    /// only if it is `Ok`; an error is returned unchanged and leaves the
    /// cache untouched. A value computed across an
    /// [`invalidate_where`](Self::invalidate_where) is returned but not stored.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: K,
        compute: F,
        ttl: Option<Duration>,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.cache.get(&key) {
            return Ok(value);
        }
        self.compute_and_store(key, compute, ttl).await
    }

    /// [`get_or_compute`](Self::get_or_compute) with at most one computation
    /// in flight per key.
    ///
    /// Callers arriving while a computation for the same key runs wait for
    /// it and then read its cached result. If it failed, the next waiter
    /// runs its own computation.
    pub async fn get_or_compute_single_flight<F, Fut, E>(
        &self,
        key: K,
        compute: F,
        ttl: Option<Duration>,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.cache.get(&key) {
            return Ok(value);
        }

        let gate = {
            let mut in_flight = mutex_lock(&self.in_flight, "bridge", "acquire_gate");
            Arc::clone(in_flight.entry(key.clone()).or_default())
        };

        let result = {
            let _turn = gate.lock().await;
            match self.cache.get(&key) {
                Some(value) => Ok(value),
                None => self.compute_and_store(key.clone(), compute, ttl).await,
            }
        };

        let mut in_flight = mutex_lock(&self.in_flight, "bridge", "release_gate");
        let ours = in_flight
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(current, &gate));
        if ours && Arc::strong_count(&gate) == 2 {
            in_flight.remove(&key);
        }

        result
    }

    /// Remove every cached entry whose key satisfies `predicate` and
    /// discard the results of computations still in flight.
    pub fn invalidate_where<P>(&self, predicate: P) -> usize
    where
        P: FnMut(&K) -> bool,
    {
        self.cache.with(|cache| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            cache.remove_where(predicate)
        })
    }

    async fn compute_and_store<F, Fut, E>(
        &self,
        key: K,
        compute: F,
        ttl: Option<Duration>,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let started = self.generation.load(Ordering::SeqCst);
        let value = compute().await?;

        let stored = self.cache.with(|cache| {
            if self.generation.load(Ordering::SeqCst) != started {
                return false;
            }
            match ttl {
                Some(ttl) => cache.set_with_ttl(key.clone(), value.clone(), ttl),
                None => cache.set(key.clone(), value.clone()),
            }
            true
        });
        if stored {
            debug!(cache = %self.cache.name(), ?key, "cache store");
        } else {
            debug!(cache = %self.cache.name(), ?key, "invalidated during compute; not stored");
        }
        Ok(value)
    }
}

/// Query-result cache keyed by [`InvalidationTarget`].
///
/// As an [`InvalidationSink`] it drops every cached query whose key the
/// target prefixes, so the next fetch recomputes.
pub struct QueryCache<V> {
    bridge: CacheBridge<InvalidationTarget, V>,
}

impl<V> Clone for QueryCache<V> {
    fn clone(&self) -> Self {
        Self {
            bridge: self.bridge.clone(),
        }
    }
}

impl<V> fmt::Debug for QueryCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("bridge", &self.bridge)
            .finish()
    }
}

impl<V: Clone> QueryCache<V> {
    /// Wrap a cache of query results.
    pub fn new(cache: SharedCache<InvalidationTarget, V>) -> Self {
        Self {
            bridge: CacheBridge::new(cache),
        }
    }

    /// Cached result for `key`, computing it on a miss.
    pub async fn fetch<F, Fut, E>(&self, key: InvalidationTarget, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        self.bridge.get_or_compute(key, compute, None).await
    }

    /// Whether a fresh result is cached for `key`.
    pub fn is_cached(&self, key: &InvalidationTarget) -> bool {
        self.bridge.cache().with(|cache| cache.contains(key))
    }

    /// The underlying bridge.
    pub fn bridge(&self) -> &CacheBridge<InvalidationTarget, V> {
        &self.bridge
    }
}

impl<V: Clone + Send + 'static> InvalidationSink for QueryCache<V> {
    fn invalidate(&self, target: InvalidationTarget) {
        let removed = self.bridge.invalidate_where(|key| target.matches(key));
        debug!(%target, removed, "queries marked stale");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsync_types::ConversationId;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn bridge() -> CacheBridge<String, u32> {
        CacheBridge::new(SharedCache::new(
            "test",
            NonZeroUsize::new(8).unwrap(),
            Duration::from_secs(60),
        ))
    }

    // ===========================================
    // get_or_compute Tests
    // ===========================================

    #[tokio::test]
    async fn miss_computes_and_stores() {
        let bridge = bridge();

        let value: Result<u32, ()> = bridge
            .get_or_compute("k".into(), || async { Ok(7) }, None)
            .await;

        assert_eq!(value, Ok(7));
        assert_eq!(bridge.cache().get(&"k".to_string()), Some(7));
    }

    #[tokio::test]
    async fn hit_skips_compute() {
        let bridge = bridge();
        bridge.cache().set("k".into(), 1);
        let calls = AtomicUsize::new(0);

        let value: Result<u32, ()> = bridge
            .get_or_compute(
                "k".into(),
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(2)
                },
                None,
            )
            .await;

        assert_eq!(value, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_is_not_cached() {
        let bridge = bridge();

        let value: Result<u32, &str> = bridge
            .get_or_compute("k".into(), || async { Err("backend down") }, None)
            .await;

        assert_eq!(value, Err("backend down"));
        assert_eq!(bridge.cache().size(), 0);

        let retry: Result<u32, &str> = bridge
            .get_or_compute("k".into(), || async { Ok(3) }, None)
            .await;
        assert_eq!(retry, Ok(3));
    }

    #[tokio::test]
    async fn ttl_is_applied_to_stored_value() {
        let bridge = bridge();

        let _: Result<u32, ()> = bridge
            .get_or_compute("k".into(), || async { Ok(5) }, Some(Duration::from_secs(2)))
            .await;

        let later = Instant::now() + Duration::from_secs(3);
        bridge
            .cache()
            .with(|cache| assert!(cache.get_at(&"k".to_string(), later).is_none()));
    }

    #[tokio::test]
    async fn concurrent_misses_each_compute() {
        let bridge = bridge();
        let calls = AtomicUsize::new(0);
        let compute = |value: u32| {
            let calls = &calls;
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok::<_, ()>(value)
            }
        };

        let (a, b) = tokio::join!(
            bridge.get_or_compute("k".into(), compute(1), None),
            bridge.get_or_compute("k".into(), compute(2), None),
        );

        assert_eq!((a, b), (Ok(1), Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(bridge.cache().get(&"k".to_string()).is_some());
    }

    // ===========================================
    // Single-flight Tests
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn single_flight_computes_once() {
        let bridge = bridge();
        let calls = AtomicUsize::new(0);
        let compute = |value: u32| {
            let calls = &calls;
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, ()>(value)
            }
        };

        let (a, b) = tokio::join!(
            bridge.get_or_compute_single_flight("k".into(), compute(1), None),
            bridge.get_or_compute_single_flight("k".into(), compute(2), None),
        );

        assert_eq!((a, b), (Ok(1), Ok(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(mutex_lock(&bridge.in_flight, "test", "check").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn single_flight_waiter_retries_after_failure() {
        let bridge = bridge();

        let first = async {
            bridge
                .get_or_compute_single_flight(
                    "k".into(),
                    || async {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Err("boom")
                    },
                    None,
                )
                .await
        };
        let second =
            bridge.get_or_compute_single_flight("k".into(), || async { Ok::<_, &str>(9) }, None);

        let (a, b) = tokio::join!(first, second);

        assert_eq!(a, Err("boom"));
        assert_eq!(b, Ok(9));
        assert_eq!(bridge.cache().get(&"k".to_string()), Some(9));
    }

    // ===========================================
    // QueryCache Tests
    // ===========================================

    #[tokio::test]
    async fn invalidation_drops_prefixed_queries() {
        let queries: QueryCache<Vec<String>> = QueryCache::new(SharedCache::new(
            "queries",
            NonZeroUsize::new(16).unwrap(),
            Duration::from_secs(60),
        ));
        let c1 = ConversationId::from("c1");
        let page_two = InvalidationTarget::new(["messages", "c1", "2"]);
        let other = InvalidationTarget::messages(&ConversationId::from("c2"));

        for key in [
            InvalidationTarget::messages(&c1),
            page_two.clone(),
            other.clone(),
        ] {
            let _: Result<_, ()> = queries
                .fetch(key, || async { Ok(vec!["m".to_string()]) })
                .await;
        }

        queries.invalidate(InvalidationTarget::messages(&c1));

        assert!(!queries.is_cached(&InvalidationTarget::messages(&c1)));
        assert!(!queries.is_cached(&page_two));
        assert!(queries.is_cached(&other));
    }

    #[tokio::test]
    async fn refetch_after_invalidation_recomputes() {
        let queries: QueryCache<u32> = QueryCache::new(SharedCache::new(
            "queries",
            NonZeroUsize::new(4).unwrap(),
            Duration::from_secs(60),
        ));
        let key = InvalidationTarget::conversations();

        let first: Result<u32, ()> = queries.fetch(key.clone(), || async { Ok(1) }).await;
        queries.invalidate(InvalidationTarget::conversations());
        let second: Result<u32, ()> = queries.fetch(key, || async { Ok(2) }).await;

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_during_fetch_discards_result() {
        let queries: QueryCache<u32> = QueryCache::new(SharedCache::new(
            "queries",
            NonZeroUsize::new(4).unwrap(),
            Duration::from_secs(3600),
        ));
        let key = InvalidationTarget::conversations();

        let fetch = queries.fetch(key.clone(), || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, ()>(1)
        });
        let change = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            queries.invalidate(InvalidationTarget::conversations());
        };
        let (in_flight, ()) = tokio::join!(fetch, change);

        assert_eq!(in_flight, Ok(1));
        assert!(!queries.is_cached(&key));
        let next: Result<u32, ()> = queries.fetch(key, || async { Ok(2) }).await;
        assert_eq!(next, Ok(2));
    }

    #[test]
    fn invalidate_where_counts_removed_entries() {
        let bridge = bridge();
        bridge.cache().set("messages:1".into(), 1);
        bridge.cache().set("messages:2".into(), 2);
        bridge.cache().set("conversations".into(), 3);

        assert_eq!(bridge.invalidate_where(|k| k.starts_with("messages")), 2);
        assert_eq!(bridge.cache().size(), 1);
    }
}
