//! Bounded key/value cache with combined recency (LRU) and age (TTL) eviction.
//!
//! This module provides [`BoundedCache`], the memory bound for every cached
//! dataset in chatsync:
//! - At most `max_size` entries after any `set`
//! - No `get` returns a value older than `max_age`
//! - Expired entries are purged lazily at the top of every `set`, never by a
//!   background sweep
//!
//! The cache is a plain single-owner structure (`&mut self`). Sharing it
//! across tasks is the caller's job: sync-client wraps it in a mutex and never
//! holds that lock across an await.
//!
//! Every time-dependent operation has an `*_at` variant taking the current
//! instant explicitly, so tests never sleep.

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// A cached value and the instant it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The cached value.
    pub value: V,
    /// When the value was stored. Not refreshed by reads.
    pub timestamp: Instant,
    /// Per-entry lifetime, capped by the cache's `max_age`.
    pub ttl: Option<Duration>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant, max_age: Duration) -> bool {
        let limit = self.ttl.map_or(max_age, |ttl| ttl.min(max_age));
        now.saturating_duration_since(self.timestamp) > limit
    }
}

/// Counters describing cache behaviour since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads that returned a value.
    pub hits: u64,
    /// Reads that found nothing or found an expired entry.
    pub misses: u64,
    /// Entries dropped to make room for a new one.
    pub evictions: u64,
    /// Entries dropped because they outlived their lifetime.
    pub expirations: u64,
}

impl CacheStats {
    /// Fraction of reads that hit (0.0 when nothing was read).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Key/value store bounded by entry count and entry age.
pub struct BoundedCache<K: Hash + Eq, V> {
    entries: LruCache<K, CacheEntry<V>>,
    max_size: NonZeroUsize,
    max_age: Duration,
    stats: CacheStats,
}

impl<K: Hash + Eq, V> std::fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache")
            .field("len", &self.entries.len())
            .field("max_size", &self.max_size)
            .field("max_age", &self.max_age)
            .field("stats", &self.stats)
            .finish()
    }
}

impl<K: Hash + Eq + Clone, V> BoundedCache<K, V> {
    /// Create an empty cache.
    pub fn new(max_size: NonZeroUsize, max_age: Duration) -> Self {
        Self {
            entries: LruCache::new(max_size),
            max_size,
            max_age,
            stats: CacheStats::default(),
        }
    }

    /// Maximum number of entries held after any `set`.
    pub fn max_size(&self) -> usize {
        self.max_size.get()
    }

    /// Maximum age of a returned value.
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Store a value under `key`.
    pub fn set(&mut self, key: K, value: V) {
        self.set_at(key, value, Instant::now());
    }

    /// Store a value under `key` as of `now`.
    ///
    /// Purges expired entries first, then drops any previous entry for the
    /// same key, then evicts the least-recently-used entry if the cache is
    /// still full. The new entry becomes the most recently used.
    pub fn set_at(&mut self, key: K, value: V, now: Instant) {
        self.insert(key, value, None, now);
    }

    /// Store a value that expires after `ttl` (or `max_age`, whichever is shorter).
    pub fn set_with_ttl(&mut self, key: K, value: V, ttl: Duration) {
        self.set_with_ttl_at(key, value, ttl, Instant::now());
    }

    /// [`set_with_ttl`](Self::set_with_ttl) as of `now`.
    pub fn set_with_ttl_at(&mut self, key: K, value: V, ttl: Duration, now: Instant) {
        self.insert(key, value, Some(ttl), now);
    }

    fn insert(&mut self, key: K, value: V, ttl: Option<Duration>, now: Instant) {
        self.purge_expired_at(now);
        self.entries.pop(&key);
        if self.entries.len() >= self.max_size.get() && self.entries.pop_lru().is_some() {
            self.stats.evictions += 1;
        }
        self.entries.put(
            key,
            CacheEntry {
                value,
                timestamp: now,
                ttl,
            },
        );
    }

    /// Look up `key`, marking it most recently used on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.get_at(key, Instant::now())
    }

    /// Look up `key` as of `now`.
    ///
    /// An expired entry is deleted and reported as a miss.
    pub fn get_at(&mut self, key: &K, now: Instant) -> Option<&V> {
        let expired = match self.entries.peek(key) {
            Some(entry) => entry.is_expired(now, self.max_age),
            None => {
                self.stats.misses += 1;
                return None;
            }
        };

        if expired {
            self.entries.pop(key);
            self.stats.expirations += 1;
            self.stats.misses += 1;
            return None;
        }

        self.stats.hits += 1;
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Check for a live entry without touching recency or stats.
    pub fn contains(&self, key: &K) -> bool {
        self.contains_at(key, Instant::now())
    }

    /// [`contains`](Self::contains) as of `now`.
    pub fn contains_at(&self, key: &K, now: Instant) -> bool {
        self.entries
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(now, self.max_age))
    }

    /// Remove an entry, returning its value if it was present (expired or not).
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.pop(key).map(|entry| entry.value)
    }

    /// Remove every entry whose key satisfies `predicate`. Returns how many went.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        let doomed: Vec<K> = self
            .entries
            .iter()
            .filter(|(key, _)| predicate(key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            self.entries.pop(key);
        }
        doomed.len()
    }

    /// Drop every expired entry. Returns how many went.
    pub fn purge_expired(&mut self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    /// [`purge_expired`](Self::purge_expired) as of `now`.
    pub fn purge_expired_at(&mut self, now: Instant) -> usize {
        let max_age = self.max_age;
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now, max_age))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.entries.pop(key);
        }
        self.stats.expirations += expired.len() as u64;
        expired.len()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries currently held (including not-yet-purged expired ones).
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counters since creation.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cache(max_size: usize, max_age_ms: u64) -> BoundedCache<&'static str, i32> {
        BoundedCache::new(
            NonZeroUsize::new(max_size).unwrap(),
            Duration::from_millis(max_age_ms),
        )
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    // ===========================================
    // Age (TTL) Tests
    // ===========================================

    #[test]
    fn expired_entry_is_a_miss_and_removed() {
        let mut cache = cache(10, 100);
        let t0 = Instant::now();

        cache.set_at("a", 1, t0);
        assert_eq!(cache.get_at(&"a", t0 + ms(150)), None);
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn entry_at_exact_max_age_is_still_fresh() {
        let mut cache = cache(10, 100);
        let t0 = Instant::now();

        cache.set_at("a", 1, t0);
        assert_eq!(cache.get_at(&"a", t0 + ms(100)), Some(&1));
    }

    #[test]
    fn reads_do_not_extend_lifetime() {
        let mut cache = cache(10, 100);
        let t0 = Instant::now();

        cache.set_at("a", 1, t0);
        assert_eq!(cache.get_at(&"a", t0 + ms(90)), Some(&1));
        assert_eq!(cache.get_at(&"a", t0 + ms(110)), None);
    }

    #[test]
    fn set_purges_expired_entries_first() {
        let mut cache = cache(10, 100);
        let t0 = Instant::now();

        cache.set_at("a", 1, t0);
        cache.set_at("b", 2, t0 + ms(50));
        cache.set_at("c", 3, t0 + ms(120));

        // "a" is gone without anyone reading it; "b" survives.
        assert_eq!(cache.size(), 2);
        assert!(!cache.contains_at(&"a", t0 + ms(120)));
        assert!(cache.contains_at(&"b", t0 + ms(120)));
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn per_entry_ttl_shortens_lifetime() {
        let mut cache = cache(10, 1000);
        let t0 = Instant::now();

        cache.set_with_ttl_at("a", 1, ms(50), t0);
        assert_eq!(cache.get_at(&"a", t0 + ms(40)), Some(&1));
        assert_eq!(cache.get_at(&"a", t0 + ms(60)), None);
    }

    #[test]
    fn per_entry_ttl_cannot_exceed_max_age() {
        let mut cache = cache(10, 100);
        let t0 = Instant::now();

        cache.set_with_ttl_at("a", 1, ms(10_000), t0);
        assert_eq!(cache.get_at(&"a", t0 + ms(150)), None);
    }

    // ===========================================
    // Recency (LRU) Tests
    // ===========================================

    #[test]
    fn evicts_least_recently_set() {
        let mut cache = cache(2, 60_000);
        let t0 = Instant::now();

        cache.set_at("a", 1, t0);
        cache.set_at("b", 2, t0);
        cache.set_at("c", 3, t0);

        assert_eq!(cache.get_at(&"a", t0), None);
        assert_eq!(cache.get_at(&"b", t0), Some(&2));
        assert_eq!(cache.get_at(&"c", t0), Some(&3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn read_refreshes_recency() {
        let mut cache = cache(2, 60_000);
        let t0 = Instant::now();

        cache.set_at("a", 1, t0);
        cache.set_at("b", 2, t0);
        assert_eq!(cache.get_at(&"a", t0), Some(&1));
        cache.set_at("c", 3, t0);

        assert!(!cache.contains_at(&"b", t0));
        assert_eq!(cache.get_at(&"a", t0), Some(&1));
        assert_eq!(cache.get_at(&"c", t0), Some(&3));
    }

    #[test]
    fn overwrite_refreshes_recency_without_evicting() {
        let mut cache = cache(2, 60_000);
        let t0 = Instant::now();

        cache.set_at("a", 1, t0);
        cache.set_at("b", 2, t0);
        cache.set_at("a", 10, t0);
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.stats().evictions, 0);

        cache.set_at("c", 3, t0);
        assert!(!cache.contains_at(&"b", t0));
        assert_eq!(cache.get_at(&"a", t0), Some(&10));
    }

    #[test]
    fn contains_does_not_refresh_recency() {
        let mut cache = cache(2, 60_000);
        let t0 = Instant::now();

        cache.set_at("a", 1, t0);
        cache.set_at("b", 2, t0);
        assert!(cache.contains_at(&"a", t0));
        cache.set_at("c", 3, t0);

        assert!(!cache.contains_at(&"a", t0));
    }

    // ===========================================
    // Removal Tests
    // ===========================================

    #[test]
    fn clear_drops_everything() {
        let mut cache = cache(10, 60_000);
        cache.set("a", 1);
        cache.set("b", 2);

        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.get(&"a"), None);
    }

    #[test]
    fn remove_returns_value() {
        let mut cache = cache(10, 60_000);
        cache.set("a", 1);

        assert_eq!(cache.remove(&"a"), Some(1));
        assert_eq!(cache.remove(&"a"), None);
    }

    #[test]
    fn remove_where_filters_by_key() {
        let mut cache = cache(10, 60_000);
        cache.set("msg:1", 1);
        cache.set("msg:2", 2);
        cache.set("conv", 3);

        let removed = cache.remove_where(|k| k.starts_with("msg:"));

        assert_eq!(removed, 2);
        assert_eq!(cache.size(), 1);
        assert!(cache.contains(&"conv"));
    }

    #[test]
    fn miss_on_absent_key_counts() {
        let mut cache = cache(10, 60_000);
        assert_eq!(cache.get(&"nope"), None);
        cache.set("a", 1);
        assert_eq!(cache.get(&"a"), Some(&1));

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    // ===========================================
    // Invariant Properties
    // ===========================================

    proptest! {
        #[test]
        fn never_exceeds_capacity_or_returns_stale(
            ops in proptest::collection::vec((0u8..8, 0u64..40, any::<bool>()), 1..200),
            capacity in 1usize..5,
        ) {
            let base = Instant::now();
            let mut cache: BoundedCache<u8, u64> =
                BoundedCache::new(NonZeroUsize::new(capacity).unwrap(), ms(100));
            let mut now_ms = 0u64;

            for (key, advance, is_set) in ops {
                now_ms += advance;
                let now = base + ms(now_ms);
                if is_set {
                    cache.set_at(key, now_ms, now);
                    prop_assert!(cache.size() <= capacity);
                } else if let Some(&stored_at) = cache.get_at(&key, now) {
                    prop_assert!(now_ms - stored_at <= 100);
                }
            }
        }
    }
}
