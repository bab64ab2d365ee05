//! Repository traits describing the document-store boundary.
//!
//! The store holds client documents with their embedded policies,
//! claims, and vehicles. Reads are point lookups, filtered scans, and
//! aggregate scans; writes are inserts, field patches, guarded appends
//! into embedded arrays, and the agent broadcast. Each write call is
//! atomic at the store level; nothing here touches the cache.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use time::Date;

use crate::domain::entities::{AgentProfile, Claim, Client, Policy, Vehicle};
use crate::domain::types::{ClaimStatus, PolicyStatus};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn duplicate(constraint: impl Into<String>) -> Self {
        Self::Duplicate {
            constraint: constraint.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClientQueryFilter {
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyQueryFilter {
    pub status: Option<PolicyStatus>,
}

/// Lookup for an agent's denormalized profile. Unset fields match any
/// copy; the first copy in scan order satisfying every set field wins.
#[derive(Debug, Clone, Default)]
pub struct AgentQueryFilter {
    pub agent_id: Option<u32>,
    pub license: Option<String>,
    pub active: Option<bool>,
}

/// A policy flattened together with its owning client's public fields,
/// the shape produced by unwinding the embedded array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyRecord {
    pub owner_id: u32,
    pub owner_name: String,
    pub owner_active: bool,
    pub policy: Policy,
}

/// One client's summed policy coverage, input to the ranking rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageTotal {
    pub client_id: u32,
    pub display_name: String,
    pub total_coverage: f64,
}

/// Counts reported by the agent broadcast: how many client documents
/// held at least one matching policy, and how many embedded policies
/// had their agent copy rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub documents_touched: u64,
    pub elements_updated: u64,
}

#[derive(Debug, Clone)]
pub struct CreateClientParams {
    pub client_id: u32,
    pub first_name: String,
    pub last_name: String,
    pub dni: String,
    pub email: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateClientParams {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub active: Option<bool>,
}

impl UpdateClientParams {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.city.is_none()
            && self.active.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct UpdateClaimParams {
    pub status: ClaimStatus,
    pub final_amount: Option<f64>,
    pub resolution_date: Option<Date>,
}

#[async_trait]
pub trait ClientsRepo: Send + Sync {
    async fn fetch_client(&self, client_id: u32) -> Result<Option<Client>, RepoError>;

    async fn find_by_dni(&self, dni: &str) -> Result<Option<Client>, RepoError>;

    async fn list_clients(&self, filter: ClientQueryFilter) -> Result<Vec<Client>, RepoError>;

    async fn find_policy(&self, policy_number: &str) -> Result<Option<PolicyRecord>, RepoError>;

    async fn list_policies(
        &self,
        filter: PolicyQueryFilter,
    ) -> Result<Vec<PolicyRecord>, RepoError>;

    async fn find_agent(&self, filter: &AgentQueryFilter)
    -> Result<Option<AgentProfile>, RepoError>;

    /// Sum `total_coverage` across each client's policies. Clients with
    /// no policies report a zero total.
    async fn coverage_totals(&self) -> Result<Vec<CoverageTotal>, RepoError>;

    /// Highest numeric suffix among policy numbers of the form
    /// `POL<digits>`, if any exist.
    async fn highest_policy_number(&self) -> Result<Option<u32>, RepoError>;
}

#[async_trait]
pub trait ClientsWriteRepo: Send + Sync {
    /// Insert a fresh client shell with empty policies and vehicles.
    /// Fails with `Duplicate` when `client_id` or `dni` is already
    /// taken.
    async fn create_client(&self, params: CreateClientParams) -> Result<Client, RepoError>;

    async fn update_client(
        &self,
        client_id: u32,
        params: UpdateClientParams,
    ) -> Result<Client, RepoError>;

    async fn delete_client(&self, client_id: u32) -> Result<(), RepoError>;

    /// Guarded append: the owning client must exist and no policy
    /// anywhere in the store may already carry this policy number.
    async fn append_policy(&self, client_id: u32, policy: Policy) -> Result<(), RepoError>;

    /// Guarded append: the owning policy must exist and must not
    /// already hold a claim with this claim id.
    async fn append_claim(&self, policy_number: &str, claim: Claim) -> Result<(), RepoError>;

    /// Guarded append: the owning client must exist and must not
    /// already hold a vehicle with this plate.
    async fn append_vehicle(&self, client_id: u32, vehicle: Vehicle) -> Result<(), RepoError>;

    /// Patch one claim addressed by its policy number and claim id.
    async fn update_claim(
        &self,
        policy_number: &str,
        claim_id: u32,
        params: UpdateClaimParams,
    ) -> Result<(), RepoError>;

    /// Rewrite the denormalized agent copy inside every policy whose
    /// `agent_id` matches, across all client documents, in one logical
    /// write.
    async fn broadcast_agent(&self, profile: AgentProfile) -> Result<BroadcastOutcome, RepoError>;
}
