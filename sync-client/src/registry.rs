//! Named cache registry.
//!
//! Cache policies are fixed once at process start (normally from
//! [`CachesConfig`]). Each named cache is created lazily on first request and
//! handed out as a [`SharedCache`] handle, so every consumer of a name shares
//! the same entries.

use crate::config::CachesConfig;
use crate::lock::mutex_lock;
use crate::shared::SharedCache;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Capacity and age bound of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Maximum number of entries.
    pub max_size: NonZeroUsize,
    /// Maximum entry age.
    pub max_age: Duration,
}

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No policy exists for this name.
    #[error("unknown cache: {0}")]
    UnknownCache(String),

    /// The name is already in use with different key or value types.
    #[error("cache {name} already holds a different type than {requested}")]
    TypeMismatch {
        /// Cache name.
        name: String,
        /// Type signature of the rejected request.
        requested: &'static str,
    },
}

/// Type-erased view of a registered cache.
trait ErasedCache: Send + Sync {
    fn clear(&self);
    fn size(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
}

impl<K, V> ErasedCache for SharedCache<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + 'static,
    V: Clone + Send + 'static,
{
    fn clear(&self) {
        SharedCache::clear(self)
    }

    fn size(&self) -> usize {
        SharedCache::size(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Registry of named caches.
pub struct CacheRegistry {
    policies: BTreeMap<String, CachePolicy>,
    caches: Mutex<HashMap<String, Box<dyn ErasedCache>>>,
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::from_config(&CachesConfig::default())
    }
}

impl CacheRegistry {
    /// Create a registry with the given policies.
    pub fn new<I, S>(policies: I) -> Self
    where
        I: IntoIterator<Item = (S, CachePolicy)>,
        S: Into<String>,
    {
        Self {
            policies: policies.into_iter().map(|(n, p)| (n.into(), p)).collect(),
            caches: Mutex::new(HashMap::new()),
        }
    }

    /// Create a registry from the `[caches]` configuration section.
    pub fn from_config(config: &CachesConfig) -> Self {
        Self::new(config.iter().map(|(name, policy)| (name, policy.policy())))
    }

    /// Add or replace a policy before any cache of that name is handed out.
    pub fn with_policy(mut self, name: &str, policy: CachePolicy) -> Self {
        self.policies.insert(name.to_string(), policy);
        self
    }

    /// Policy registered for `name`.
    pub fn policy(&self, name: &str) -> Option<CachePolicy> {
        self.policies.get(name).copied()
    }

    /// Every registered name, sorted.
    pub fn names(&self) -> Vec<String> {
        self.policies.keys().cloned().collect()
    }

    /// Handle to the cache called `name`, creating it on first use.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownCache`] if no policy exists for `name`;
    /// [`RegistryError::TypeMismatch`] if `name` was first requested with
    /// different key or value types.
    pub fn cache<K, V>(&self, name: &str) -> Result<SharedCache<K, V>, RegistryError>
    where
        K: Hash + Eq + Clone + fmt::Debug + Send + 'static,
        V: Clone + Send + 'static,
    {
        let policy = self
            .policy(name)
            .ok_or_else(|| RegistryError::UnknownCache(name.to_string()))?;

        let mut caches = mutex_lock(&self.caches, "registry", "cache");
        if let Some(existing) = caches.get(name) {
            return existing
                .as_any()
                .downcast_ref::<SharedCache<K, V>>()
                .cloned()
                .ok_or_else(|| RegistryError::TypeMismatch {
                    name: name.to_string(),
                    requested: std::any::type_name::<SharedCache<K, V>>(),
                });
        }

        let cache = SharedCache::new(name, policy.max_size, policy.max_age);
        caches.insert(name.to_string(), Box::new(cache.clone()));
        info!(
            cache = name,
            max_size = policy.max_size.get(),
            max_age_secs = policy.max_age.as_secs(),
            "cache created"
        );
        Ok(cache)
    }

    /// Entry count of every cache created so far.
    pub fn sizes(&self) -> BTreeMap<String, usize> {
        mutex_lock(&self.caches, "registry", "sizes")
            .iter()
            .map(|(name, cache)| (name.clone(), cache.size()))
            .collect()
    }

    /// Empty every cache (for logout).
    pub fn clear_all(&self) {
        let caches = mutex_lock(&self.caches, "registry", "clear_all");
        for cache in caches.values() {
            cache.clear();
        }
        info!(caches = caches.len(), "all caches cleared");
    }
}
