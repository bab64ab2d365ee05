//! In-memory cache backend.
//!
//! A capacity-bounded LRU map with per-entry expiry. Expired slots are
//! dropped lazily on access and during scans; nothing sweeps in the
//! background.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;

use crate::util::lock::{rw_read, rw_write};

use super::backend::{BackendError, CacheBackend};
use super::config::CacheConfig;
use super::keys::pattern_matches;

const SOURCE: &str = "cache::memory";

const METRIC_CACHE_EVICT_TOTAL: &str = "polizza_cache_evict_total";

/// A stored payload with its expiry deadline.
#[derive(Debug, Clone)]
struct Slot {
    payload: String,
    expires_at: Instant,
}

impl Slot {
    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }

    fn live_payload(&self) -> Option<String> {
        self.is_live().then(|| self.payload.clone())
    }
}

/// LRU-evicting in-memory backend.
///
/// Lookups and scans take the write lock (LRU bookkeeping mutates on
/// reads, scans drop the expired slots they walk past); liveness probes
/// peek under the read lock.
pub struct MemoryBackend {
    entries: RwLock<LruCache<String, Slot>>,
}

impl MemoryBackend {
    /// Create a backend bounded by the configured entry limit.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.entry_limit_non_zero())),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        // The lookup also promotes recency, which is fine for a slot
        // that turns out expired: it gets popped right away.
        let payload = entries.get(key).map(Slot::live_payload);
        match payload {
            Some(Some(payload)) => Ok(Some(payload)),
            Some(None) => {
                entries.pop(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), BackendError> {
        let slot = Slot {
            payload,
            expires_at: Instant::now() + ttl,
        };
        let mut entries = rw_write(&self.entries, SOURCE, "set");
        if let Some((evicted_key, _)) = entries.push(key.to_string(), slot) {
            // push returns the displaced pair; a different key means the
            // LRU tail fell out for capacity, not a same-key overwrite.
            if evicted_key != key {
                counter!(METRIC_CACHE_EVICT_TOTAL).increment(1);
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<u64, BackendError> {
        let mut entries = rw_write(&self.entries, SOURCE, "delete");
        let removed_live = entries.pop(key).is_some_and(|slot| slot.is_live());
        Ok(u64::from(removed_live))
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, BackendError> {
        let mut entries = rw_write(&self.entries, SOURCE, "delete_matching");
        let matches: Vec<String> = entries
            .iter()
            .filter(|(key, _)| pattern_matches(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = 0;
        for key in matches {
            if let Some(slot) = entries.pop(&key) {
                if slot.is_live() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn contains(&self, key: &str) -> Result<bool, BackendError> {
        let entries = rw_read(&self.entries, SOURCE, "contains");
        Ok(entries.peek(key).is_some_and(Slot::is_live))
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, BackendError> {
        let entries = rw_read(&self.entries, SOURCE, "remaining_ttl");
        let remaining = entries
            .peek(key)
            .and_then(|slot| slot.expires_at.checked_duration_since(Instant::now()));
        Ok(remaining)
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
        let mut entries = rw_write(&self.entries, SOURCE, "keys_matching");
        let mut keys = Vec::new();
        let mut expired = Vec::new();
        for (key, slot) in entries.iter() {
            if !slot.is_live() {
                expired.push(key.clone());
            } else if pattern_matches(pattern, key) {
                keys.push(key.clone());
            }
        }
        // Scans purge every expired slot they see, matching or not.
        for key in expired {
            entries.pop(&key);
        }
        Ok(keys)
    }
}
