//! Cache key definitions.
//!
//! Defines `QueryKey` for the named-query catalogue and the glob-style
//! pattern matching used for invalidation. Every key lives under a
//! `queryN:` namespace so a whole query family can be dropped with one
//! `queryN:*` pattern.

use std::fmt;
use std::time::Duration;

/// Pattern matching every key in the cache.
pub const PATTERN_ALL: &str = "*";

/// Expiry tier for cached query results.
///
/// Tiers encode how quickly a view goes stale: claim-driven views churn
/// fastest, reporting views over closed data barely move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlTier {
    /// 120s. Views dominated by open claims.
    Volatile,
    /// 180s. Agent aggregates and policy listings.
    Short,
    /// 300s. Client rosters.
    Standard,
    /// 420s. Suspended-policy reviews.
    Medium,
    /// 480s. Vehicle-backed views.
    Long,
    /// 600s. Expired-policy and ranking views.
    Stable,
}

impl TtlTier {
    /// Tier duration in seconds.
    pub const fn secs(self) -> u64 {
        match self {
            Self::Volatile => 120,
            Self::Short => 180,
            Self::Standard => 300,
            Self::Medium => 420,
            Self::Long => 480,
            Self::Stable => 600,
        }
    }

    /// Tier duration as a [`Duration`].
    pub const fn duration(self) -> Duration {
        Duration::from_secs(self.secs())
    }
}

/// Keys of the named-query catalogue.
///
/// Each variant renders to the exact key its query result is stored
/// under and knows its own TTL tier, so services cannot drift from the
/// catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// `query1:active_clients`
    ActiveClients,
    /// `query2:open_claims`
    OpenClaims,
    /// `query3:insured_vehicles`
    InsuredVehicles,
    /// `query4:clients_no_active_policies`
    ClientsWithoutActivePolicies,
    /// `query5:agent_policy_counts`
    AgentPolicyCounts,
    /// `query6:expired_policies`
    ExpiredPolicies,
    /// `query7:top_clients_coverage`
    TopClientsByCoverage,
    /// `query8:accident_claims_<year>` (one key per requested year)
    AccidentClaimsInYear(i32),
    /// `query9:active_policies_sorted`
    ActivePoliciesSorted,
    /// `query10:suspended_policies`
    SuspendedPolicies,
    /// `query11:multi_vehicle_clients`
    MultiVehicleClients,
    /// `query12:agent_claim_counts`
    AgentClaimCounts,
}

impl QueryKey {
    /// The `queryN` namespace this key lives under.
    pub const fn namespace(&self) -> &'static str {
        match self {
            Self::ActiveClients => "query1",
            Self::OpenClaims => "query2",
            Self::InsuredVehicles => "query3",
            Self::ClientsWithoutActivePolicies => "query4",
            Self::AgentPolicyCounts => "query5",
            Self::ExpiredPolicies => "query6",
            Self::TopClientsByCoverage => "query7",
            Self::AccidentClaimsInYear(_) => "query8",
            Self::ActivePoliciesSorted => "query9",
            Self::SuspendedPolicies => "query10",
            Self::MultiVehicleClients => "query11",
            Self::AgentClaimCounts => "query12",
        }
    }

    /// TTL tier for results stored under this key.
    pub const fn ttl(&self) -> TtlTier {
        match self {
            Self::OpenClaims | Self::AccidentClaimsInYear(_) => TtlTier::Volatile,
            Self::AgentPolicyCounts | Self::ActivePoliciesSorted | Self::AgentClaimCounts => {
                TtlTier::Short
            }
            Self::ActiveClients | Self::ClientsWithoutActivePolicies => TtlTier::Standard,
            Self::SuspendedPolicies => TtlTier::Medium,
            Self::InsuredVehicles | Self::MultiVehicleClients => TtlTier::Long,
            Self::ExpiredPolicies | Self::TopClientsByCoverage => TtlTier::Stable,
        }
    }

    /// Render the storage key.
    pub fn render(&self) -> String {
        match self {
            Self::ActiveClients => "query1:active_clients".to_string(),
            Self::OpenClaims => "query2:open_claims".to_string(),
            Self::InsuredVehicles => "query3:insured_vehicles".to_string(),
            Self::ClientsWithoutActivePolicies => "query4:clients_no_active_policies".to_string(),
            Self::AgentPolicyCounts => "query5:agent_policy_counts".to_string(),
            Self::ExpiredPolicies => "query6:expired_policies".to_string(),
            Self::TopClientsByCoverage => "query7:top_clients_coverage".to_string(),
            Self::AccidentClaimsInYear(year) => format!("query8:accident_claims_{year}"),
            Self::ActivePoliciesSorted => "query9:active_policies_sorted".to_string(),
            Self::SuspendedPolicies => "query10:suspended_policies".to_string(),
            Self::MultiVehicleClients => "query11:multi_vehicle_clients".to_string(),
            Self::AgentClaimCounts => "query12:agent_claim_counts".to_string(),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

// ============================================================================
// Pattern Matching
// ============================================================================

/// Match a key against an invalidation pattern.
///
/// A pattern is either a literal key or a prefix ending in `*`. The
/// bare `*` matches every key. No other glob syntax is supported.
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}
