//! Operational cache administration: stats, key listing, flushes.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::cache::{CacheStats, CacheStore, PATTERN_ALL};

/// One live key and how long it has left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveKey {
    pub key: String,
    pub remaining_ttl_secs: u64,
}

#[derive(Clone)]
pub struct AdminService {
    store: Arc<CacheStore>,
}

impl AdminService {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.stats().await
    }

    /// Live keys with remaining TTL, sorted by key. Keys expiring
    /// between the scan and the TTL probe are dropped from the
    /// listing.
    pub async fn keys(&self) -> Vec<LiveKey> {
        let mut keys = self.store.keys(PATTERN_ALL).await;
        keys.sort();

        let mut listing = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(remaining) = self.store.remaining_ttl(&key).await {
                listing.push(LiveKey {
                    key,
                    remaining_ttl_secs: remaining.as_secs(),
                });
            }
        }
        listing
    }

    /// Drop every key under a glob, the whole keyspace when none is
    /// given. An unreachable backend degrades to a zero count; the
    /// remaining keys expire by TTL.
    pub async fn flush(&self, pattern: Option<&str>) -> u64 {
        let pattern = pattern.unwrap_or(PATTERN_ALL);
        match self.store.invalidate(pattern).await {
            Ok(removed) => removed,
            Err(err) => {
                warn!(error = %err, pattern, "Flush reached no backend; keys expire by TTL");
                0
            }
        }
    }
}
