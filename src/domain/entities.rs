//! Document entities mirrored from persistent storage.
//!
//! A `Client` is the unit of storage. Policies, claims, and vehicles
//! exist only embedded in their owning client document; an agent exists
//! only as the denormalized [`AgentProfile`] copy carried by each policy
//! that references it.

use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use crate::domain::dates::dmy;
use crate::domain::types::{ClaimKind, ClaimStatus, PolicyKind, PolicyStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    /// Opaque document id assigned by the store on insert.
    pub id: Uuid,
    pub client_id: u32,
    pub first_name: String,
    pub last_name: String,
    pub dni: String,
    pub email: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub active: bool,
    pub policies: Vec<Policy>,
    pub vehicles: Vec<Vehicle>,
}

impl Client {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub policy_number: String,
    pub kind: PolicyKind,
    pub status: PolicyStatus,
    #[serde(with = "dmy")]
    pub start_date: Date,
    #[serde(with = "dmy")]
    pub end_date: Date,
    pub monthly_premium: f64,
    pub total_coverage: f64,
    pub deductible: Option<f64>,
    pub agent_id: u32,
    /// Denormalized copy of the referenced agent's public fields.
    pub agent: AgentProfile,
    pub claims: Vec<Claim>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_id: u32,
    pub kind: ClaimKind,
    pub status: ClaimStatus,
    #[serde(with = "dmy")]
    pub date: Date,
    pub estimated_amount: f64,
    pub description: String,
    pub final_amount: Option<f64>,
    #[serde(default, with = "dmy::option")]
    pub resolution_date: Option<Date>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub plate: String,
    pub brand: String,
    pub model: String,
    pub year: u16,
    pub insured: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub agent_id: u32,
    pub first_name: String,
    pub last_name: String,
    pub license: String,
    pub active: bool,
}

impl AgentProfile {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
