//! Cache configuration.
//!
//! Controls the query cache via `polizza.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_ENTRY_LIMIT: usize = 2048;
const DEFAULT_TTL_SECS: u64 = 300;

/// Cache configuration from `polizza.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the query cache. When disabled every read computes fresh.
    pub enabled: bool,
    /// Maximum entries held by the in-memory backend before LRU eviction.
    pub entry_limit: usize,
    /// Fallback TTL (seconds) for entries stored outside the catalogue.
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            entry_limit: DEFAULT_ENTRY_LIMIT,
            default_ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            entry_limit: settings.entry_limit,
            default_ttl_secs: settings.default_ttl_secs,
        }
    }
}

impl CacheConfig {
    /// Returns true if the query cache is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn entry_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.entry_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the fallback TTL as a duration.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}
