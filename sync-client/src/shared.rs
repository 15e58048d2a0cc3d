//! Shareable cache handle.
//!
//! [`SharedCache`] wraps a [`BoundedCache`] in `Arc<Mutex<_>>`. Every method
//! takes the lock for a single synchronous operation and releases it before
//! returning, so no lock is ever held across an await point.

use crate::lock::mutex_lock;
use chatsync_core::{BoundedCache, CacheStats};
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Cloneable handle to a named, mutex-protected [`BoundedCache`].
pub struct SharedCache<K: Hash + Eq, V> {
    name: Arc<str>,
    inner: Arc<Mutex<BoundedCache<K, V>>>,
}

impl<K: Hash + Eq, V> Clone for SharedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Hash + Eq, V> fmt::Debug for SharedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCache")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<K, V> SharedCache<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug,
    V: Clone,
{
    /// Create a standalone cache.
    pub fn new(name: &str, max_size: NonZeroUsize, max_age: Duration) -> Self {
        Self::from_cache(name, BoundedCache::new(max_size, max_age))
    }

    /// Wrap an existing cache.
    pub fn from_cache(name: &str, cache: BoundedCache<K, V>) -> Self {
        Self {
            name: Arc::from(name),
            inner: Arc::new(Mutex::new(cache)),
        }
    }

    /// Cache name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fresh value for `key`, refreshing its recency.
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.lock("get").get(key).cloned();
        debug!(cache = %self.name, ?key, hit = value.is_some(), "cache lookup");
        value
    }

    /// Store `value` under `key`.
    pub fn set(&self, key: K, value: V) {
        debug!(cache = %self.name, ?key, "cache store");
        self.lock("set").set(key, value);
    }

    /// Store `value` under `key` with its own lifetime.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        debug!(cache = %self.name, ?key, ?ttl, "cache store");
        self.lock("set_with_ttl").set_with_ttl(key, value, ttl);
    }

    /// Remove and return the entry for `key`.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.lock("remove").remove(key)
    }

    /// Remove every entry whose key satisfies `predicate`.
    pub fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        let removed = self.lock("remove_where").remove_where(predicate);
        if removed > 0 {
            debug!(cache = %self.name, removed, "cache entries invalidated");
        }
        removed
    }

    /// Drop expired entries now.
    pub fn purge_expired(&self) -> usize {
        self.lock("purge_expired").purge_expired()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        debug!(cache = %self.name, "cache cleared");
        self.lock("clear").clear();
    }

    /// Number of entries held.
    pub fn size(&self) -> usize {
        self.lock("size").size()
    }

    /// Counters since creation.
    pub fn stats(&self) -> CacheStats {
        self.lock("stats").stats()
    }

    /// Run `f` with exclusive access to the underlying cache.
    ///
    /// `f` must not block; it runs with the lock held.
    pub fn with<R>(&self, f: impl FnOnce(&mut BoundedCache<K, V>) -> R) -> R {
        f(&mut self.lock("with"))
    }

    fn lock(&self, op: &'static str) -> std::sync::MutexGuard<'_, BoundedCache<K, V>> {
        mutex_lock(&self.inner, "shared_cache", op)
    }
}
