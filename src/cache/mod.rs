//! Polizza Query Cache
//!
//! Cache-aside layer between the named queries and the document store:
//!
//! - **Catalogue keys**: every named query caches under a fixed
//!   `queryN:` key with a fixed TTL tier
//! - **Write-path invalidation**: committed mutations drop exactly the
//!   key patterns they made stale
//! - **Fail-soft**: a broken backend degrades reads to fresh
//!   computations, it never fails a caller
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `polizza.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! entry_limit = 2048
//! default_ttl_secs = 300
//! ```

mod backend;
mod config;
mod invalidation;
mod keys;
mod memory;
mod query;
mod store;

pub use backend::{BackendError, CacheBackend};
pub use config::CacheConfig;
pub use invalidation::{ConsistencyError, InvalidationRouter, Mutation};
pub use keys::{PATTERN_ALL, QueryKey, TtlTier, pattern_matches};
pub use memory::MemoryBackend;
pub use query::QueryCache;
pub use store::{CacheStats, CacheStore};
