//! Cache store: typed, fail-soft access to the backend.
//!
//! The store owns the JSON codec and the hit/miss accounting. Reads and
//! writes absorb backend and codec failures: a broken cache degrades
//! every read to a fresh computation, it never fails a caller.
//! Invalidation is the exception and surfaces its error, because a
//! committed write whose stale views survive is worth more than a
//! warning line (see `InvalidationRouter`).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::backend::{BackendError, CacheBackend};
use super::config::CacheConfig;
use super::keys::PATTERN_ALL;

const METRIC_CACHE_HIT_TOTAL: &str = "polizza_cache_hit_total";
const METRIC_CACHE_MISS_TOTAL: &str = "polizza_cache_miss_total";
const METRIC_CACHE_INVALIDATED_TOTAL: &str = "polizza_cache_invalidated_total";

// ============================================================================
// Cache Store
// ============================================================================

/// Fail-soft cache store over a pluggable backend.
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStore {
    /// Create a store over the given backend.
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self {
            backend,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fetch and decode the value under `key`.
    ///
    /// Returns `None` on a miss, on a disabled cache, on a backend
    /// failure, and on an undecodable payload (which is dropped so the
    /// next write starts clean). Only a decoded hit counts as a hit.
    pub async fn fetch<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.config.is_enabled() {
            return None;
        }

        let payload = match self.backend.get(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                self.record_miss();
                return None;
            }
            Err(err) => {
                warn!(key, error = %err, "Cache read failed; computing fresh");
                self.record_miss();
                return None;
            }
        };

        match serde_json::from_str(&payload) {
            Ok(value) => {
                self.record_hit();
                Some(value)
            }
            Err(err) => {
                warn!(key, error = %err, "Dropping undecodable cache entry");
                if let Err(err) = self.backend.delete(key).await {
                    warn!(key, error = %err, "Failed to drop undecodable cache entry");
                }
                self.record_miss();
                None
            }
        }
    }

    /// Encode and store `value` under `key`; `ttl` falls back to the
    /// configured default when not given.
    ///
    /// Failures are logged and swallowed: the value simply stays
    /// uncached.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        if !self.config.is_enabled() {
            return;
        }

        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(key, error = %err, "Failed to encode value for cache");
                return;
            }
        };

        let ttl = ttl.unwrap_or_else(|| self.config.default_ttl());
        if let Err(err) = self.backend.set(key, payload, ttl).await {
            warn!(key, error = %err, "Cache write failed; value stays uncached");
        }
    }

    /// Drop every entry matching `pattern`, returning how many were
    /// removed.
    ///
    /// Unlike reads and writes this surfaces the backend error, so the
    /// invalidation path can record that stale views survived.
    pub async fn invalidate(&self, pattern: &str) -> Result<u64, BackendError> {
        if !self.config.is_enabled() {
            return Ok(0);
        }

        let removed = self.backend.delete_matching(pattern).await?;
        if removed > 0 {
            counter!(METRIC_CACHE_INVALIDATED_TOTAL).increment(removed);
        }
        debug!(pattern, removed, "Cache entries invalidated");
        Ok(removed)
    }

    /// Live keys matching `pattern`, unordered. Empty on any failure.
    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        if !self.config.is_enabled() {
            return Vec::new();
        }

        match self.backend.keys_matching(pattern).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(pattern, error = %err, "Cache key listing failed");
                Vec::new()
            }
        }
    }

    /// Remaining lifetime of the entry under `key`, if it is live.
    pub async fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        if !self.config.is_enabled() {
            return None;
        }

        match self.backend.remaining_ttl(key).await {
            Ok(remaining) => remaining,
            Err(err) => {
                warn!(key, error = %err, "Cache TTL probe failed");
                None
            }
        }
    }

    /// Snapshot of cache effectiveness since process start.
    pub async fn stats(&self) -> CacheStats {
        let entries = self.keys(PATTERN_ALL).await.len();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats::new(entries, hits, misses)
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_MISS_TOTAL).increment(1);
    }
}

// ============================================================================
// Cache Stats
// ============================================================================

/// Point-in-time cache effectiveness counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Live entries currently stored.
    pub entries: usize,
    /// Decoded hits since process start.
    pub hits: u64,
    /// Misses since process start (including degraded reads).
    pub misses: u64,
    /// `hits / (hits + misses)` as a percentage, two decimals.
    pub hit_rate_percent: f64,
}

impl CacheStats {
    fn new(entries: usize, hits: u64, misses: u64) -> Self {
        Self {
            entries,
            hits,
            misses,
            hit_rate_percent: hit_rate_percent(hits, misses),
        }
    }
}

fn hit_rate_percent(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        return 0.0;
    }
    let rate = hits as f64 * 100.0 / total as f64;
    (rate * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryBackend;

    use async_trait::async_trait;

    /// Backend that fails every operation, for fail-soft coverage.
    struct FailingBackend;

    #[async_trait]
    impl CacheBackend for FailingBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>, BackendError> {
            Err(BackendError::unavailable("backend offline"))
        }

        async fn set(
            &self,
            _key: &str,
            _payload: String,
            _ttl: Duration,
        ) -> Result<(), BackendError> {
            Err(BackendError::unavailable("backend offline"))
        }

        async fn delete(&self, _key: &str) -> Result<u64, BackendError> {
            Err(BackendError::unavailable("backend offline"))
        }

        async fn delete_matching(&self, _pattern: &str) -> Result<u64, BackendError> {
            Err(BackendError::unavailable("backend offline"))
        }

        async fn contains(&self, _key: &str) -> Result<bool, BackendError> {
            Err(BackendError::unavailable("backend offline"))
        }

        async fn remaining_ttl(&self, _key: &str) -> Result<Option<Duration>, BackendError> {
            Err(BackendError::unavailable("backend offline"))
        }

        async fn keys_matching(&self, _pattern: &str) -> Result<Vec<String>, BackendError> {
            Err(BackendError::unavailable("backend offline"))
        }
    }

    const TTL: Duration = Duration::from_secs(60);

    fn memory_store() -> CacheStore {
        let config = CacheConfig::default();
        let backend = Arc::new(MemoryBackend::new(&config));
        CacheStore::new(backend, config)
    }

    #[tokio::test]
    async fn miss_then_put_then_hit() {
        let store = memory_store();

        let cold: Option<Vec<u32>> = store.fetch("query1:active_clients").await;
        assert_eq!(cold, None);

        store
            .put("query1:active_clients", &vec![206u32, 207], Some(TTL))
            .await;

        let warm: Option<Vec<u32>> = store.fetch("query1:active_clients").await;
        assert_eq!(warm, Some(vec![206, 207]));

        let stats = store.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hit_rate_percent, 50.0);
    }

    #[tokio::test]
    async fn failing_backend_degrades_to_fresh_reads() {
        let store = CacheStore::new(Arc::new(FailingBackend), CacheConfig::default());

        store.put("query1:active_clients", &vec![1u32], Some(TTL)).await;
        let read: Option<Vec<u32>> = store.fetch("query1:active_clients").await;
        assert_eq!(read, None);

        let stats = store.stats().await;
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 0);
    }

    #[tokio::test]
    async fn failing_backend_surfaces_invalidation_error() {
        let store = CacheStore::new(Arc::new(FailingBackend), CacheConfig::default());
        assert!(store.invalidate("query1:*").await.is_err());
    }

    #[tokio::test]
    async fn undecodable_payload_is_dropped_and_counted_as_miss() {
        let config = CacheConfig::default();
        let backend = Arc::new(MemoryBackend::new(&config));
        let store = CacheStore::new(backend.clone(), config);

        backend
            .set("query1:active_clients", "not json".to_string(), TTL)
            .await
            .unwrap();

        let read: Option<Vec<u32>> = store.fetch("query1:active_clients").await;
        assert_eq!(read, None);
        assert!(!backend.contains("query1:active_clients").await.unwrap());

        let stats = store.stats().await;
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn disabled_cache_stores_nothing() {
        let config = CacheConfig {
            enabled: false,
            ..Default::default()
        };
        let backend = Arc::new(MemoryBackend::new(&config));
        let store = CacheStore::new(backend, config);

        store.put("query1:active_clients", &vec![1u32], Some(TTL)).await;
        let read: Option<Vec<u32>> = store.fetch("query1:active_clients").await;
        assert_eq!(read, None);

        let stats = store.stats().await;
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn missing_ttl_falls_back_to_the_configured_default() {
        let config = CacheConfig {
            default_ttl_secs: 120,
            ..Default::default()
        };
        let backend = Arc::new(MemoryBackend::new(&config));
        let store = CacheStore::new(backend, config);

        store.put("query1:active_clients", &1u32, None).await;

        let remaining = store
            .remaining_ttl("query1:active_clients")
            .await
            .expect("entry is live");
        assert!(remaining <= Duration::from_secs(120));
        assert!(remaining > Duration::from_secs(118));
    }

    #[tokio::test]
    async fn invalidate_reports_removed_count() {
        let store = memory_store();

        store.put("query1:active_clients", &1u32, Some(TTL)).await;
        store.put("query4:clients_no_active_policies", &2u32, Some(TTL)).await;

        let removed = store.invalidate("query1:*").await.unwrap();
        assert_eq!(removed, 1);

        let keys = store.keys(PATTERN_ALL).await;
        assert_eq!(keys, vec!["query4:clients_no_active_policies".to_string()]);
    }

    #[test]
    fn hit_rate_rounds_to_two_decimals() {
        assert_eq!(hit_rate_percent(0, 0), 0.0);
        assert_eq!(hit_rate_percent(1, 0), 100.0);
        assert_eq!(hit_rate_percent(1, 2), 33.33);
        assert_eq!(hit_rate_percent(2, 1), 66.67);
    }
}
