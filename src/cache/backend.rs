//! Storage backend abstraction for the query cache.
//!
//! The cache layer talks to its storage through [`CacheBackend`] so the
//! store logic (serialization, counters, fail-soft policy) stays
//! independent of where payloads actually live. The bundled backend is
//! [`super::MemoryBackend`]; a networked key-value server would slot in
//! behind the same trait.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Error raised by a cache storage backend.
///
/// Backend failures never reach callers of the cache layer: the store
/// absorbs them and degrades to pass-through reads. They exist as a
/// typed error so backends can report *why* they were unavailable.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not serve the request.
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Create an unavailability error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Key-value storage with per-entry expiry and glob-style key matching.
///
/// Payloads are opaque strings (the store layer owns the JSON codec).
/// Patterns follow the cache key grammar: a literal key, a namespace
/// prefix ending in `*`, or the bare `*` wildcard matching every key.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch the payload stored under `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Store `payload` under `key`, expiring after `ttl`.
    ///
    /// Overwrites any existing entry and resets its expiry.
    async fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), BackendError>;

    /// Remove the entry under `key`. Returns the number of entries removed.
    async fn delete(&self, key: &str) -> Result<u64, BackendError>;

    /// Remove every entry whose key matches `pattern`.
    ///
    /// Returns the number of live entries removed; expired entries
    /// encountered along the way are dropped but not counted.
    async fn delete_matching(&self, pattern: &str) -> Result<u64, BackendError>;

    /// Check whether a live entry exists under `key`.
    async fn contains(&self, key: &str) -> Result<bool, BackendError>;

    /// Remaining time before the entry under `key` expires.
    ///
    /// `None` when the key is absent or already expired.
    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, BackendError>;

    /// List the live keys matching `pattern`, in no particular order.
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, BackendError>;
}
