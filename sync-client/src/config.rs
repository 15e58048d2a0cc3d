//! Configuration loading for chatsync.
//!
//! Configuration is loaded from a TOML file (default: `chatsync.toml`).
//! Every section and field is optional.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use crate::registry::CachePolicy;

/// Root configuration for chatsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Named cache policies.
    #[serde(default)]
    pub caches: CachesConfig,
    /// Batch executor configuration.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Realtime naming configuration.
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

/// Cache policies by name.
///
/// The three well-known caches always exist. Any other `[caches.<name>]`
/// table registers an extra cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachesConfig {
    /// Game lookups (default: 100 entries, 5 minutes).
    #[serde(default = "default_games")]
    pub games: CachePolicyConfig,
    /// Profile lookups (default: 50 entries, 10 minutes).
    #[serde(default = "default_profiles")]
    pub profiles: CachePolicyConfig,
    /// Geocoding lookups (default: 200 entries, 1 hour).
    #[serde(default = "default_geocoding")]
    pub geocoding: CachePolicyConfig,
    /// Additional caches.
    #[serde(flatten)]
    pub extra: BTreeMap<String, CachePolicyConfig>,
}

/// Capacity and age bound of one cache.
///
/// A table that sets only one field takes the other from the generic
/// defaults (100 entries, 5 minutes), not from the named cache's defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicyConfig {
    /// Maximum number of entries. Zero is treated as one.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Maximum entry age in seconds.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

/// Batch executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Chunk size of `BatchExecutor::process_all` (default: 10).
    #[serde(default = "default_batch_size")]
    pub default_size: usize,
    /// Pause between chunks in milliseconds (default: 100).
    #[serde(default = "default_batch_delay_ms")]
    pub delay_ms: u64,
}

/// Realtime naming configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Prefix of the per-user change subscription (default: `db-changes`).
    #[serde(default = "default_subscription_prefix")]
    pub subscription_prefix: String,
    /// Prefix of the per-conversation presence channel (default: `typing`).
    #[serde(default = "default_typing_channel_prefix")]
    pub typing_channel_prefix: String,
}

// Default value functions
fn default_max_size() -> usize {
    100
}

fn default_max_age_secs() -> u64 {
    300 // 5 minutes
}

fn default_games() -> CachePolicyConfig {
    CachePolicyConfig {
        max_size: 100,
        max_age_secs: 300,
    }
}

fn default_profiles() -> CachePolicyConfig {
    CachePolicyConfig {
        max_size: 50,
        max_age_secs: 600,
    }
}

fn default_geocoding() -> CachePolicyConfig {
    CachePolicyConfig {
        max_size: 200,
        max_age_secs: 3600,
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_delay_ms() -> u64 {
    100
}

fn default_subscription_prefix() -> String {
    "db-changes".to_string()
}

fn default_typing_channel_prefix() -> String {
    "typing".to_string()
}

impl Default for CachesConfig {
    fn default() -> Self {
        Self {
            games: default_games(),
            profiles: default_profiles(),
            geocoding: default_geocoding(),
            extra: BTreeMap::new(),
        }
    }
}

impl Default for CachePolicyConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_size: default_batch_size(),
            delay_ms: default_batch_delay_ms(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            subscription_prefix: default_subscription_prefix(),
            typing_channel_prefix: default_typing_channel_prefix(),
        }
    }
}

impl CachePolicyConfig {
    /// Convert to a runtime policy, clamping a zero size to one.
    pub fn policy(&self) -> CachePolicy {
        CachePolicy {
            max_size: NonZeroUsize::new(self.max_size).unwrap_or(NonZeroUsize::MIN),
            max_age: Duration::from_secs(self.max_age_secs),
        }
    }
}

impl CachesConfig {
    /// Every configured cache, well-known names first.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CachePolicyConfig)> {
        [
            ("games", &self.games),
            ("profiles", &self.profiles),
            ("geocoding", &self.geocoding),
        ]
        .into_iter()
        .chain(
            self.extra
                .iter()
                .map(|(name, policy)| (name.as_str(), policy)),
        )
    }
}

impl BatchConfig {
    /// Configured chunk size, clamping zero to one.
    pub fn size(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.default_size).unwrap_or(NonZeroUsize::MIN)
    }

    /// Configured inter-chunk delay.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
