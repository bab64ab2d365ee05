//! Bulk seed loading.
//!
//! The loader consumes already-structured seed records and drives the
//! same guarded primitives as the mutation surface, with one twist:
//! duplicate children are skipped and counted instead of surfaced, so
//! re-loading the same seed is a no-op. A finished load supersedes
//! every cached view, so it ends with a full flush and a ranking
//! rebuild.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::Date;
use time::macros::date;
use tracing::{info, warn};

use crate::application::error::AppError;
use crate::application::mutations::NewClient;
use crate::application::repos::{ClientsRepo, ClientsWriteRepo, CreateClientParams, RepoError};
use crate::cache::{CacheStore, PATTERN_ALL};
use crate::domain::entities::{AgentProfile, Claim, Policy, Vehicle};
use crate::domain::error::DomainError;
use crate::domain::types::{ClaimKind, ClaimStatus, PolicyKind, PolicyStatus};
use crate::ranking::RankingIndex;

// ============================================================================
// Seed Records
// ============================================================================

/// A full seed batch. Every section is optional so partial seed files
/// stay valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub clients: Vec<NewClient>,
    #[serde(default)]
    pub agents: Vec<AgentProfile>,
    #[serde(default)]
    pub policies: Vec<SeedPolicy>,
    #[serde(default)]
    pub claims: Vec<SeedClaim>,
    #[serde(default)]
    pub vehicles: Vec<SeedVehicle>,
}

/// A policy row plus the linkage the flat seed format carries: the
/// owning client and the agent whose public fields get embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedPolicy {
    pub client_id: u32,
    pub policy_number: String,
    pub kind: PolicyKind,
    pub status: PolicyStatus,
    #[serde(with = "crate::domain::dates::dmy")]
    pub start_date: Date,
    #[serde(with = "crate::domain::dates::dmy")]
    pub end_date: Date,
    pub monthly_premium: f64,
    pub total_coverage: f64,
    #[serde(default)]
    pub deductible: Option<f64>,
    pub agent_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedClaim {
    pub policy_number: String,
    pub claim_id: u32,
    pub kind: ClaimKind,
    pub status: ClaimStatus,
    #[serde(with = "crate::domain::dates::dmy")]
    pub date: Date,
    pub estimated_amount: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub final_amount: Option<f64>,
    #[serde(default, with = "crate::domain::dates::dmy::option")]
    pub resolution_date: Option<Date>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedVehicle {
    pub client_id: u32,
    pub plate: String,
    pub brand: String,
    pub model: String,
    pub year: u16,
    pub insured: bool,
}

/// What a load did, by count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub clients_inserted: u64,
    pub policies_appended: u64,
    pub claims_appended: u64,
    pub vehicles_appended: u64,
    pub duplicates_skipped: u64,
    pub agents_broadcast: u64,
    pub ranking_entries: usize,
    pub views_flushed: u64,
}

// ============================================================================
// Loader
// ============================================================================

#[derive(Clone)]
pub struct SeedLoader {
    clients: Arc<dyn ClientsRepo>,
    writer: Arc<dyn ClientsWriteRepo>,
    store: Arc<CacheStore>,
    ranking: Arc<RankingIndex>,
}

impl SeedLoader {
    pub fn new(
        clients: Arc<dyn ClientsRepo>,
        writer: Arc<dyn ClientsWriteRepo>,
        store: Arc<CacheStore>,
        ranking: Arc<RankingIndex>,
    ) -> Self {
        Self {
            clients,
            writer,
            store,
            ranking,
        }
    }

    /// Run the whole load protocol over one seed batch.
    ///
    /// Shells land first so every append has a parent; agents
    /// broadcast after policies so even seed rows carrying stale agent
    /// fields converge on the agents section. Duplicates are counted,
    /// never fatal. A seed row referencing an absent parent is a data
    /// error and fails the load.
    pub async fn load(&self, seed: SeedData) -> Result<LoadReport, AppError> {
        let mut report = LoadReport::default();
        let agents = dedupe_agents(&seed.agents);

        for client in &seed.clients {
            self.upsert_client(client, &mut report).await?;
        }
        for policy in &seed.policies {
            self.append_policy(policy, &agents, &mut report).await?;
        }
        for claim in &seed.claims {
            self.append_claim(claim, &mut report).await?;
        }
        for vehicle in &seed.vehicles {
            self.append_vehicle(vehicle, &mut report).await?;
        }

        for profile in agents.into_values() {
            self.writer
                .broadcast_agent(profile)
                .await
                .map_err(|err| AppError::store("broadcast_agent", err))?;
            report.agents_broadcast += 1;
        }

        let totals = self
            .clients
            .coverage_totals()
            .await
            .map_err(|err| AppError::store("coverage_totals", err))?;
        report.ranking_entries = self.ranking.rebuild_from(&totals);

        report.views_flushed = match self.store.invalidate(PATTERN_ALL).await {
            Ok(flushed) => flushed,
            Err(err) => {
                warn!(error = %err, "Cached views survive the load; they expire by TTL");
                0
            }
        };

        info!(
            clients = report.clients_inserted,
            policies = report.policies_appended,
            claims = report.claims_appended,
            vehicles = report.vehicles_appended,
            skipped = report.duplicates_skipped,
            agents = report.agents_broadcast,
            ranking = report.ranking_entries,
            "Seed data loaded"
        );
        Ok(report)
    }

    async fn upsert_client(
        &self,
        client: &NewClient,
        report: &mut LoadReport,
    ) -> Result<(), AppError> {
        let existing = self
            .clients
            .fetch_client(client.client_id)
            .await
            .map_err(|err| AppError::store("fetch_client", err))?;
        if existing.is_some() {
            report.duplicates_skipped += 1;
            return Ok(());
        }

        let created = self
            .writer
            .create_client(CreateClientParams {
                client_id: client.client_id,
                first_name: client.first_name.clone(),
                last_name: client.last_name.clone(),
                dni: client.dni.clone(),
                email: client.email.clone(),
                phone: client.phone.clone(),
                city: client.city.clone(),
                active: client.active,
            })
            .await;
        match created {
            Ok(_) => report.clients_inserted += 1,
            Err(RepoError::Duplicate { .. }) => report.duplicates_skipped += 1,
            Err(err) => return Err(AppError::store("create_client", err)),
        }
        Ok(())
    }

    async fn append_policy(
        &self,
        seed: &SeedPolicy,
        agents: &BTreeMap<u32, AgentProfile>,
        report: &mut LoadReport,
    ) -> Result<(), AppError> {
        let agent = agents.get(&seed.agent_id).cloned().ok_or_else(|| {
            DomainError::validation(format!(
                "seed policy {} references unknown agent {}",
                seed.policy_number, seed.agent_id
            ))
        })?;

        let policy = Policy {
            policy_number: seed.policy_number.clone(),
            kind: seed.kind,
            status: seed.status,
            start_date: seed.start_date,
            end_date: seed.end_date,
            monthly_premium: seed.monthly_premium,
            total_coverage: seed.total_coverage,
            deductible: seed.deductible,
            agent_id: agent.agent_id,
            agent,
            claims: Vec::new(),
        };
        let appended = self.writer.append_policy(seed.client_id, policy).await;
        match appended {
            Ok(()) => report.policies_appended += 1,
            Err(RepoError::Duplicate { .. }) => report.duplicates_skipped += 1,
            Err(RepoError::NotFound) => {
                return Err(DomainError::not_found("client", seed.client_id.to_string()).into());
            }
            Err(err) => return Err(AppError::store("append_policy", err)),
        }
        Ok(())
    }

    async fn append_claim(&self, seed: &SeedClaim, report: &mut LoadReport) -> Result<(), AppError> {
        let claim = Claim {
            claim_id: seed.claim_id,
            kind: seed.kind,
            status: seed.status,
            date: seed.date,
            estimated_amount: seed.estimated_amount,
            description: seed.description.clone(),
            final_amount: seed.final_amount,
            resolution_date: seed.resolution_date,
        };
        let appended = self.writer.append_claim(&seed.policy_number, claim).await;
        match appended {
            Ok(()) => report.claims_appended += 1,
            Err(RepoError::Duplicate { .. }) => report.duplicates_skipped += 1,
            Err(RepoError::NotFound) => {
                return Err(DomainError::not_found("policy", seed.policy_number.clone()).into());
            }
            Err(err) => return Err(AppError::store("append_claim", err)),
        }
        Ok(())
    }

    async fn append_vehicle(
        &self,
        seed: &SeedVehicle,
        report: &mut LoadReport,
    ) -> Result<(), AppError> {
        let vehicle = Vehicle {
            plate: seed.plate.clone(),
            brand: seed.brand.clone(),
            model: seed.model.clone(),
            year: seed.year,
            insured: seed.insured,
        };
        let appended = self.writer.append_vehicle(seed.client_id, vehicle).await;
        match appended {
            Ok(()) => report.vehicles_appended += 1,
            Err(RepoError::Duplicate { .. }) => report.duplicates_skipped += 1,
            Err(RepoError::NotFound) => {
                return Err(DomainError::not_found("client", seed.client_id.to_string()).into());
            }
            Err(err) => return Err(AppError::store("append_vehicle", err)),
        }
        Ok(())
    }
}

/// Last entry per agent id wins, in ascending id order.
fn dedupe_agents(agents: &[AgentProfile]) -> BTreeMap<u32, AgentProfile> {
    agents
        .iter()
        .map(|agent| (agent.agent_id, agent.clone()))
        .collect()
}

// ============================================================================
// Demo Dataset
// ============================================================================

/// The built-in demo portfolio: six clients, three agents, eight
/// policies ending at POL1160, a handful of claims and vehicles.
/// Small enough to read, rich enough to light up every catalogued
/// query.
pub fn demo_seed() -> SeedData {
    let client = |client_id, first: &str, last: &str, dni: &str, city: &str, active| NewClient {
        client_id,
        first_name: first.to_string(),
        last_name: last.to_string(),
        dni: dni.to_string(),
        email: format!(
            "{}.{}@example.com",
            first.to_lowercase().replace(' ', ""),
            last.to_lowercase()
        ),
        phone: None,
        city: Some(city.to_string()),
        active,
    };
    let agent = |agent_id, first: &str, last: &str, license: &str, active| AgentProfile {
        agent_id,
        first_name: first.to_string(),
        last_name: last.to_string(),
        license: license.to_string(),
        active,
    };
    let vehicle = |client_id, plate: &str, brand: &str, model: &str, year, insured| SeedVehicle {
        client_id,
        plate: plate.to_string(),
        brand: brand.to_string(),
        model: model.to_string(),
        year,
        insured,
    };

    SeedData {
        clients: vec![
            client(201, "Ana", "Suarez", "30111222", "Cordoba", true),
            client(202, "Bruno", "Vidal", "28444555", "Mendoza", false),
            client(203, "Carmen", "Ruiz", "31555666", "Rosario", true),
            client(204, "Nora", "Klein", "33222111", "Cordoba", true),
            client(205, "Pablo", "Ortiz", "29888777", "Salta", true),
            client(206, "Lucia", "Ferrari", "27999888", "Buenos Aires", true),
        ],
        agents: vec![
            agent(5, "Carla", "Gomez", "MAT-005", true),
            agent(6, "Diego", "Paz", "MAT-006", false),
            agent(7, "Laura", "Mendez", "MAT-007", true),
        ],
        policies: vec![
            SeedPolicy {
                client_id: 201,
                policy_number: "POL1153".to_string(),
                kind: PolicyKind::Auto,
                status: PolicyStatus::Active,
                start_date: date!(2024 - 02 - 01),
                end_date: date!(2025 - 02 - 01),
                monthly_premium: 95.0,
                total_coverage: 80_000.0,
                deductible: Some(500.0),
                agent_id: 5,
            },
            SeedPolicy {
                client_id: 201,
                policy_number: "POL1154".to_string(),
                kind: PolicyKind::Home,
                status: PolicyStatus::Expired,
                start_date: date!(2020 - 03 - 01),
                end_date: date!(2021 - 03 - 01),
                monthly_premium: 60.0,
                total_coverage: 50_000.0,
                deductible: None,
                agent_id: 6,
            },
            SeedPolicy {
                client_id: 202,
                policy_number: "POL1155".to_string(),
                kind: PolicyKind::Commerce,
                status: PolicyStatus::Suspended,
                start_date: date!(2023 - 05 - 05),
                end_date: date!(2024 - 05 - 05),
                monthly_premium: 150.0,
                total_coverage: 30_000.0,
                deductible: Some(1_000.0),
                agent_id: 6,
            },
            SeedPolicy {
                client_id: 203,
                policy_number: "POL1156".to_string(),
                kind: PolicyKind::Auto,
                status: PolicyStatus::Active,
                start_date: date!(2024 - 06 - 10),
                end_date: date!(2025 - 06 - 10),
                monthly_premium: 110.0,
                total_coverage: 95_000.0,
                deductible: Some(800.0),
                agent_id: 5,
            },
            SeedPolicy {
                client_id: 203,
                policy_number: "POL1157".to_string(),
                kind: PolicyKind::Health,
                status: PolicyStatus::Active,
                start_date: date!(2024 - 01 - 01),
                end_date: date!(2025 - 01 - 01),
                monthly_premium: 75.0,
                total_coverage: 40_000.0,
                deductible: None,
                agent_id: 7,
            },
            SeedPolicy {
                client_id: 204,
                policy_number: "POL1158".to_string(),
                kind: PolicyKind::Auto,
                status: PolicyStatus::Suspended,
                start_date: date!(2023 - 09 - 20),
                end_date: date!(2024 - 09 - 20),
                monthly_premium: 90.0,
                total_coverage: 70_000.0,
                deductible: Some(600.0),
                agent_id: 5,
            },
            SeedPolicy {
                client_id: 205,
                policy_number: "POL1159".to_string(),
                kind: PolicyKind::Home,
                status: PolicyStatus::Expired,
                start_date: date!(2019 - 08 - 15),
                end_date: date!(2020 - 08 - 15),
                monthly_premium: 55.0,
                total_coverage: 45_000.0,
                deductible: None,
                agent_id: 6,
            },
            SeedPolicy {
                client_id: 206,
                policy_number: "POL1160".to_string(),
                kind: PolicyKind::Life,
                status: PolicyStatus::Active,
                start_date: date!(2024 - 01 - 15),
                end_date: date!(2025 - 01 - 15),
                monthly_premium: 250.0,
                total_coverage: 250_000.0,
                deductible: None,
                agent_id: 7,
            },
        ],
        claims: vec![
            SeedClaim {
                policy_number: "POL1153".to_string(),
                claim_id: 9001,
                kind: ClaimKind::Accident,
                status: ClaimStatus::Open,
                date: date!(2024 - 03 - 10),
                estimated_amount: 5_000.0,
                description: "Rear-end collision at a toll booth".to_string(),
                final_amount: None,
                resolution_date: None,
            },
            SeedClaim {
                policy_number: "POL1153".to_string(),
                claim_id: 9002,
                kind: ClaimKind::Fire,
                status: ClaimStatus::Closed,
                date: date!(2024 - 04 - 12),
                estimated_amount: 3_000.0,
                description: "Engine bay fire, parked".to_string(),
                final_amount: Some(2_800.0),
                resolution_date: Some(date!(2024 - 05 - 30)),
            },
            SeedClaim {
                policy_number: "POL1156".to_string(),
                claim_id: 9004,
                kind: ClaimKind::Accident,
                status: ClaimStatus::InProgress,
                date: date!(2024 - 02 - 05),
                estimated_amount: 7_500.0,
                description: "Side impact on an avenue crossing".to_string(),
                final_amount: None,
                resolution_date: None,
            },
            SeedClaim {
                policy_number: "POL1158".to_string(),
                claim_id: 9005,
                kind: ClaimKind::Hail,
                status: ClaimStatus::Open,
                date: date!(2024 - 01 - 18),
                estimated_amount: 1_500.0,
                description: "Hail dents across roof and hood".to_string(),
                final_amount: None,
                resolution_date: None,
            },
            SeedClaim {
                policy_number: "POL1160".to_string(),
                claim_id: 9003,
                kind: ClaimKind::Accident,
                status: ClaimStatus::Closed,
                date: date!(2023 - 07 - 20),
                estimated_amount: 12_000.0,
                description: "Highway pileup, total loss avoided".to_string(),
                final_amount: Some(11_000.0),
                resolution_date: Some(date!(2023 - 09 - 15)),
            },
        ],
        vehicles: vec![
            vehicle(201, "AB123CD", "Toyota", "Corolla", 2020, true),
            vehicle(201, "XY987ZT", "Ford", "Ka", 2016, true),
            vehicle(203, "CD456EF", "Peugeot", "208", 2021, true),
            vehicle(204, "GH789IJ", "Volkswagen", "Gol", 2015, true),
            vehicle(204, "JK012LM", "Fiat", "Cronos", 2019, true),
            vehicle(204, "MN345OP", "Renault", "Clio", 2012, false),
            vehicle(206, "LF555GG", "Honda", "Fit", 2018, false),
        ],
    }
}
