//! Cache-aside helper for the named-query catalogue.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::keys::QueryKey;
use super::store::CacheStore;

const METRIC_QUERY_COMPUTE_MS: &str = "polizza_query_compute_ms";

/// Cache-aside front for the named queries.
///
/// Every read goes through [`QueryCache::get_or_compute`]: serve the
/// cached result when one is live, otherwise run the computation and
/// store its result under the key's catalogue TTL. Cache trouble never
/// surfaces here; only the computation's own error propagates.
pub struct QueryCache {
    store: Arc<CacheStore>,
}

impl QueryCache {
    /// Create a query cache over the given store.
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    /// Get the underlying store.
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Serve `key` from cache, or compute, cache, and return fresh.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: &QueryKey, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let rendered = key.render();
        if let Some(cached) = self.store.fetch::<T>(&rendered).await {
            return Ok(cached);
        }

        let compute_started_at = Instant::now();
        let value = compute().await?;
        histogram!(METRIC_QUERY_COMPUTE_MS)
            .record(compute_started_at.elapsed().as_secs_f64() * 1000.0);

        self.store
            .put(&rendered, &value, Some(key.ttl().duration()))
            .await;
        debug!(key = %rendered, ttl_secs = key.ttl().secs(), "Query result computed and cached");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::CacheConfig;
    use crate::cache::memory::MemoryBackend;

    use std::convert::Infallible;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn query_cache() -> QueryCache {
        let config = CacheConfig::default();
        let backend = Arc::new(MemoryBackend::new(&config));
        QueryCache::new(Arc::new(CacheStore::new(backend, config)))
    }

    #[tokio::test]
    async fn second_read_skips_the_computation() {
        let cache = query_cache();
        let computations = AtomicU32::new(0);

        for _ in 0..3 {
            let rows: Result<Vec<u32>, Infallible> = cache
                .get_or_compute(&QueryKey::ActiveClients, || async {
                    computations.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![206, 207])
                })
                .await;
            assert_eq!(rows.unwrap(), vec![206, 207]);
        }

        assert_eq!(computations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn computation_errors_propagate_and_cache_nothing() {
        let cache = query_cache();

        let failed: Result<Vec<u32>, &str> = cache
            .get_or_compute(&QueryKey::OpenClaims, || async { Err("repo down") })
            .await;
        assert_eq!(failed, Err("repo down"));

        // Nothing cached: the next read computes again and succeeds.
        let rows: Result<Vec<u32>, &str> = cache
            .get_or_compute(&QueryKey::OpenClaims, || async { Ok(vec![9095]) })
            .await;
        assert_eq!(rows.unwrap(), vec![9095]);
    }

    #[tokio::test]
    async fn year_keys_cache_independently() {
        let cache = query_cache();

        let y2023: Result<Vec<u32>, Infallible> = cache
            .get_or_compute(&QueryKey::AccidentClaimsInYear(2023), || async {
                Ok(vec![1])
            })
            .await;
        let y2024: Result<Vec<u32>, Infallible> = cache
            .get_or_compute(&QueryKey::AccidentClaimsInYear(2024), || async {
                Ok(vec![2])
            })
            .await;

        assert_eq!(y2023.unwrap(), vec![1]);
        assert_eq!(y2024.unwrap(), vec![2]);

        let keys = cache.store().keys("query8:*").await;
        assert_eq!(keys.len(), 2);
    }
}
