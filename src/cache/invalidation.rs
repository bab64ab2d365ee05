//! Write-path invalidation routing.
//!
//! Every committed mutation maps to a fixed set of key patterns that
//! can no longer be trusted. The router drops them after the write
//! lands; it never blocks or fails the mutation itself.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use super::backend::BackendError;
use super::keys::PATTERN_ALL;
use super::store::CacheStore;

/// A committed write, as the cache layer sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// A client document was inserted.
    ClientCreated,
    /// A client's own fields were patched.
    ClientUpdated,
    /// A client was soft-deleted (`active = false`).
    ClientDeactivated,
    /// A client document was removed outright.
    ClientPurged,
    /// A policy was appended to a client.
    PolicyIssued,
    /// A claim was appended to a policy.
    ClaimFiled,
    /// A claim's status fields were rewritten in place.
    ClaimStatusChanged,
    /// An agent's public fields were rebroadcast into its policies.
    AgentProfileUpdated,
}

impl Mutation {
    /// Key patterns this mutation makes stale.
    ///
    /// Purging a client flushes everything: the document takes its
    /// embedded policies, claims, and vehicles with it, which reaches
    /// into every named query.
    pub const fn stale_patterns(self) -> &'static [&'static str] {
        match self {
            Self::ClientCreated | Self::ClientUpdated | Self::ClientDeactivated => {
                &["query1:*", "query4:*"]
            }
            Self::ClientPurged => &[PATTERN_ALL],
            Self::PolicyIssued => &["query4:*", "query5:*", "query7:*", "query9:*"],
            Self::ClaimFiled => &["query2:*", "query8:*", "query12:*"],
            Self::ClaimStatusChanged => &["query2:*", "query8:*"],
            Self::AgentProfileUpdated => &["query5:*", "query12:*"],
        }
    }

    /// Whether this mutation moves coverage totals, requiring a ranking
    /// rebuild.
    pub const fn rebuilds_ranking(self) -> bool {
        matches!(self, Self::PolicyIssued | Self::ClientPurged)
    }
}

/// Raised when a committed write could not drop its stale cached views.
///
/// Never propagated: the write already succeeded, so the router logs
/// the inconsistency and leaves the repair to TTL expiry.
#[derive(Debug, Error)]
#[error("stale entries under {pattern} survive a committed {mutation:?}: {source}")]
pub struct ConsistencyError {
    mutation: Mutation,
    pattern: &'static str,
    #[source]
    source: BackendError,
}

/// Routes committed mutations to the cache entries they invalidate.
pub struct InvalidationRouter {
    store: Arc<CacheStore>,
}

impl InvalidationRouter {
    /// Create a router over the given store.
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    /// Drop every cached view `mutation` made stale.
    ///
    /// Returns the number of entries removed. Backend failures are
    /// logged per pattern and otherwise absorbed.
    pub async fn on_mutation(&self, mutation: Mutation) -> u64 {
        let mut removed = 0;
        for pattern in mutation.stale_patterns() {
            match self.store.invalidate(pattern).await {
                Ok(count) => removed += count,
                Err(source) => {
                    let inconsistency = ConsistencyError {
                        mutation,
                        pattern,
                        source,
                    };
                    error!(error = %inconsistency, "Cache invalidation failed");
                }
            }
        }

        info!(?mutation, removed, "Stale query views dropped");
        removed
    }
}
