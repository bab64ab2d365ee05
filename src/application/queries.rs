//! Named query services.
//!
//! The twelve read views of the document store, each served cache-aside
//! under its catalogue key. Row structs are the stable shapes the views
//! serialize to, both into the cache and onto the CLI.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::Date;
use tracing::warn;

use crate::application::error::AppError;
use crate::application::repos::{
    ClientQueryFilter, ClientsRepo, PolicyQueryFilter, PolicyRecord,
};
use crate::cache::{QueryCache, QueryKey};
use crate::domain::entities::Client;
use crate::domain::types::{ClaimKind, ClaimStatus, PolicyKind, PolicyStatus};
use crate::ranking::RankingIndex;

/// How many ranked clients the coverage view reports.
const TOP_CLIENTS_LIMIT: usize = 10;

// ============================================================================
// Row Shapes
// ============================================================================

/// query1 row: an active client roster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveClientRow {
    pub client_id: u32,
    pub display_name: String,
    pub dni: String,
    pub email: String,
    pub city: Option<String>,
}

/// query2 row: an open claim joined with its policy and owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenClaimRow {
    pub claim_id: u32,
    pub kind: ClaimKind,
    #[serde(with = "crate::domain::dates::dmy")]
    pub date: Date,
    pub estimated_amount: f64,
    pub policy_number: String,
    pub client_id: u32,
    pub client_name: String,
}

/// The owner's first Auto policy, when one exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoPolicyRef {
    pub policy_number: String,
    pub status: PolicyStatus,
}

/// query3 row: an insured vehicle with its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsuredVehicleRow {
    pub plate: String,
    pub brand: String,
    pub model: String,
    pub year: u16,
    pub client_id: u32,
    pub client_name: String,
    pub auto_policy: Option<AutoPolicyRef>,
}

/// query4 row: a client owning no policy in Active status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncoveredClientRow {
    pub client_id: u32,
    pub display_name: String,
    pub dni: String,
    pub policy_count: usize,
}

/// query5 row: an active agent with its assigned-policy count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPolicyCountRow {
    pub agent_id: u32,
    pub agent_name: String,
    pub policies: u64,
}

/// query6 row: an expired policy with its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpiredPolicyRow {
    pub policy_number: String,
    pub kind: PolicyKind,
    #[serde(with = "crate::domain::dates::dmy")]
    pub start_date: Date,
    #[serde(with = "crate::domain::dates::dmy")]
    pub end_date: Date,
    pub monthly_premium: f64,
    pub owner_id: u32,
    pub owner_name: String,
}

/// query7 row: one ranked client by total coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopClientRow {
    pub rank: usize,
    pub client_id: u32,
    pub display_name: String,
    pub total_coverage: f64,
}

/// query8 row: an Accident claim falling in the requested year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccidentClaimRow {
    pub claim_id: u32,
    pub status: ClaimStatus,
    #[serde(with = "crate::domain::dates::dmy")]
    pub date: Date,
    pub estimated_amount: f64,
    pub policy_number: String,
    pub client_id: u32,
    pub client_name: String,
}

/// query9 row: an active policy flattened with its owner id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePolicyRow {
    pub client_id: u32,
    pub policy_number: String,
    pub kind: PolicyKind,
    #[serde(with = "crate::domain::dates::dmy")]
    pub start_date: Date,
    #[serde(with = "crate::domain::dates::dmy")]
    pub end_date: Date,
    pub monthly_premium: f64,
    pub total_coverage: f64,
    pub agent_id: u32,
    pub status: PolicyStatus,
}

/// query10 row: a suspended policy with its owner's standing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspendedPolicyRow {
    pub policy_number: String,
    pub kind: PolicyKind,
    #[serde(with = "crate::domain::dates::dmy")]
    pub start_date: Date,
    #[serde(with = "crate::domain::dates::dmy")]
    pub end_date: Date,
    pub monthly_premium: f64,
    pub owner_id: u32,
    pub owner_name: String,
    pub owner_active: bool,
}

/// query11 row: a client owning more than one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiVehicleClientRow {
    pub client_id: u32,
    pub display_name: String,
    pub vehicles: usize,
    pub plates: Vec<String>,
}

/// query12 row: an agent with its total claims across assigned
/// policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentClaimCountRow {
    pub agent_id: u32,
    pub agent_name: String,
    pub claims: u64,
}

// ============================================================================
// Query Service
// ============================================================================

/// The named queries, served cache-aside.
#[derive(Clone)]
pub struct QueryService {
    clients: Arc<dyn ClientsRepo>,
    cache: Arc<QueryCache>,
    ranking: Arc<RankingIndex>,
}

impl QueryService {
    pub fn new(
        clients: Arc<dyn ClientsRepo>,
        cache: Arc<QueryCache>,
        ranking: Arc<RankingIndex>,
    ) -> Self {
        Self {
            clients,
            cache,
            ranking,
        }
    }

    /// query1: active clients.
    pub async fn active_clients(&self) -> Result<Vec<ActiveClientRow>, AppError> {
        let clients = Arc::clone(&self.clients);
        self.cache
            .get_or_compute(&QueryKey::ActiveClients, || async move {
                let records = clients
                    .list_clients(ClientQueryFilter { active: Some(true) })
                    .await
                    .map_err(|err| AppError::store("list_clients", err))?;
                Ok(records
                    .into_iter()
                    .map(|client| ActiveClientRow {
                        client_id: client.client_id,
                        display_name: client.display_name(),
                        dni: client.dni,
                        email: client.email,
                        city: client.city,
                    })
                    .collect())
            })
            .await
    }

    /// query2: open claims with their policy and owner.
    pub async fn open_claims(&self) -> Result<Vec<OpenClaimRow>, AppError> {
        let clients = Arc::clone(&self.clients);
        self.cache
            .get_or_compute(&QueryKey::OpenClaims, || async move {
                let records = list_all_policies(&clients).await?;
                let mut rows = Vec::new();
                for record in &records {
                    for claim in &record.policy.claims {
                        if claim.status != ClaimStatus::Open {
                            continue;
                        }
                        rows.push(OpenClaimRow {
                            claim_id: claim.claim_id,
                            kind: claim.kind,
                            date: claim.date,
                            estimated_amount: claim.estimated_amount,
                            policy_number: record.policy.policy_number.clone(),
                            client_id: record.owner_id,
                            client_name: record.owner_name.clone(),
                        });
                    }
                }
                Ok(rows)
            })
            .await
    }

    /// query3: insured vehicles with owner and first Auto policy.
    pub async fn insured_vehicles(&self) -> Result<Vec<InsuredVehicleRow>, AppError> {
        let clients = Arc::clone(&self.clients);
        self.cache
            .get_or_compute(&QueryKey::InsuredVehicles, || async move {
                let records = list_all_clients(&clients).await?;
                let mut rows = Vec::new();
                for client in &records {
                    let auto_policy = client
                        .policies
                        .iter()
                        .find(|policy| policy.kind == PolicyKind::Auto)
                        .map(|policy| AutoPolicyRef {
                            policy_number: policy.policy_number.clone(),
                            status: policy.status,
                        });
                    for vehicle in client.vehicles.iter().filter(|vehicle| vehicle.insured) {
                        rows.push(InsuredVehicleRow {
                            plate: vehicle.plate.clone(),
                            brand: vehicle.brand.clone(),
                            model: vehicle.model.clone(),
                            year: vehicle.year,
                            client_id: client.client_id,
                            client_name: client.display_name(),
                            auto_policy: auto_policy.clone(),
                        });
                    }
                }
                Ok(rows)
            })
            .await
    }

    /// query4: clients owning no policy in Active status.
    pub async fn clients_without_active_policies(
        &self,
    ) -> Result<Vec<UncoveredClientRow>, AppError> {
        let clients = Arc::clone(&self.clients);
        self.cache
            .get_or_compute(&QueryKey::ClientsWithoutActivePolicies, || async move {
                let records = list_all_clients(&clients).await?;
                Ok(records
                    .into_iter()
                    .filter(|client| {
                        !client
                            .policies
                            .iter()
                            .any(|policy| policy.status == PolicyStatus::Active)
                    })
                    .map(|client| UncoveredClientRow {
                        client_id: client.client_id,
                        display_name: client.display_name(),
                        dni: client.dni,
                        policy_count: client.policies.len(),
                    })
                    .collect())
            })
            .await
    }

    /// query5: active agents with assigned-policy counts.
    pub async fn agent_policy_counts(&self) -> Result<Vec<AgentPolicyCountRow>, AppError> {
        let clients = Arc::clone(&self.clients);
        self.cache
            .get_or_compute(&QueryKey::AgentPolicyCounts, || async move {
                let records = list_all_policies(&clients).await?;
                // Group on the denormalized copies; inactive copies are
                // skipped, the first live copy names the agent.
                let mut counts: BTreeMap<u32, (String, u64)> = BTreeMap::new();
                for record in &records {
                    let agent = &record.policy.agent;
                    if !agent.active {
                        continue;
                    }
                    let entry = counts
                        .entry(record.policy.agent_id)
                        .or_insert_with(|| (agent.display_name(), 0));
                    entry.1 += 1;
                }
                Ok(counts
                    .into_iter()
                    .map(|(agent_id, (agent_name, policies))| AgentPolicyCountRow {
                        agent_id,
                        agent_name,
                        policies,
                    })
                    .collect())
            })
            .await
    }

    /// query6: expired policies with owner name.
    pub async fn expired_policies(&self) -> Result<Vec<ExpiredPolicyRow>, AppError> {
        let clients = Arc::clone(&self.clients);
        self.cache
            .get_or_compute(&QueryKey::ExpiredPolicies, || async move {
                let records = clients
                    .list_policies(PolicyQueryFilter {
                        status: Some(PolicyStatus::Expired),
                    })
                    .await
                    .map_err(|err| AppError::store("list_policies", err))?;
                Ok(records
                    .into_iter()
                    .map(|record| ExpiredPolicyRow {
                        policy_number: record.policy.policy_number,
                        kind: record.policy.kind,
                        start_date: record.policy.start_date,
                        end_date: record.policy.end_date,
                        monthly_premium: record.policy.monthly_premium,
                        owner_id: record.owner_id,
                        owner_name: record.owner_name,
                    })
                    .collect())
            })
            .await
    }

    /// query7: top clients by total coverage, from the ranking index.
    ///
    /// Reads the prebuilt ranking rather than recomputing totals; a
    /// stale index is the accepted trade until the next rebuild.
    pub async fn top_clients_by_coverage(&self) -> Result<Vec<TopClientRow>, AppError> {
        let ranking = Arc::clone(&self.ranking);
        self.cache
            .get_or_compute(&QueryKey::TopClientsByCoverage, || async move {
                let rows = ranking
                    .top_n(TOP_CLIENTS_LIMIT)
                    .into_iter()
                    .enumerate()
                    .filter_map(|(position, entry)| {
                        let Some((client_id, display_name)) = entry.split() else {
                            warn!(member = %entry.member, "Skipping malformed ranking member");
                            return None;
                        };
                        Some(TopClientRow {
                            rank: position + 1,
                            client_id,
                            display_name: display_name.to_string(),
                            total_coverage: entry.score,
                        })
                    })
                    .collect();
                Ok::<_, AppError>(rows)
            })
            .await
    }

    /// query8: Accident claims whose date falls in `year`.
    pub async fn accident_claims_in_year(
        &self,
        year: i32,
    ) -> Result<Vec<AccidentClaimRow>, AppError> {
        let clients = Arc::clone(&self.clients);
        self.cache
            .get_or_compute(&QueryKey::AccidentClaimsInYear(year), || async move {
                let records = list_all_policies(&clients).await?;
                let mut rows = Vec::new();
                for record in &records {
                    for claim in &record.policy.claims {
                        if claim.kind != ClaimKind::Accident || claim.date.year() != year {
                            continue;
                        }
                        rows.push(AccidentClaimRow {
                            claim_id: claim.claim_id,
                            status: claim.status,
                            date: claim.date,
                            estimated_amount: claim.estimated_amount,
                            policy_number: record.policy.policy_number.clone(),
                            client_id: record.owner_id,
                            client_name: record.owner_name.clone(),
                        });
                    }
                }
                Ok(rows)
            })
            .await
    }

    /// query9: active policies sorted by ascending start date.
    pub async fn active_policies_sorted(&self) -> Result<Vec<ActivePolicyRow>, AppError> {
        let clients = Arc::clone(&self.clients);
        self.cache
            .get_or_compute(&QueryKey::ActivePoliciesSorted, || async move {
                let records = clients
                    .list_policies(PolicyQueryFilter {
                        status: Some(PolicyStatus::Active),
                    })
                    .await
                    .map_err(|err| AppError::store("list_policies", err))?;
                let mut rows: Vec<ActivePolicyRow> = records
                    .into_iter()
                    .map(|record| ActivePolicyRow {
                        client_id: record.owner_id,
                        policy_number: record.policy.policy_number,
                        kind: record.policy.kind,
                        start_date: record.policy.start_date,
                        end_date: record.policy.end_date,
                        monthly_premium: record.policy.monthly_premium,
                        total_coverage: record.policy.total_coverage,
                        agent_id: record.policy.agent_id,
                        status: record.policy.status,
                    })
                    .collect();
                rows.sort_by_key(|row| row.start_date);
                Ok(rows)
            })
            .await
    }

    /// query10: suspended policies with the owner's standing.
    pub async fn suspended_policies(&self) -> Result<Vec<SuspendedPolicyRow>, AppError> {
        let clients = Arc::clone(&self.clients);
        self.cache
            .get_or_compute(&QueryKey::SuspendedPolicies, || async move {
                let records = clients
                    .list_policies(PolicyQueryFilter {
                        status: Some(PolicyStatus::Suspended),
                    })
                    .await
                    .map_err(|err| AppError::store("list_policies", err))?;
                Ok(records
                    .into_iter()
                    .map(|record| SuspendedPolicyRow {
                        policy_number: record.policy.policy_number,
                        kind: record.policy.kind,
                        start_date: record.policy.start_date,
                        end_date: record.policy.end_date,
                        monthly_premium: record.policy.monthly_premium,
                        owner_id: record.owner_id,
                        owner_name: record.owner_name,
                        owner_active: record.owner_active,
                    })
                    .collect())
            })
            .await
    }

    /// query11: clients owning more than one vehicle.
    pub async fn multi_vehicle_clients(&self) -> Result<Vec<MultiVehicleClientRow>, AppError> {
        let clients = Arc::clone(&self.clients);
        self.cache
            .get_or_compute(&QueryKey::MultiVehicleClients, || async move {
                let records = list_all_clients(&clients).await?;
                Ok(records
                    .into_iter()
                    .filter(|client| client.vehicles.len() > 1)
                    .map(|client| MultiVehicleClientRow {
                        client_id: client.client_id,
                        display_name: client.display_name(),
                        vehicles: client.vehicles.len(),
                        plates: client
                            .vehicles
                            .iter()
                            .map(|vehicle| vehicle.plate.clone())
                            .collect(),
                    })
                    .collect())
            })
            .await
    }

    /// query12: agents with total claims across assigned policies.
    pub async fn agent_claim_counts(&self) -> Result<Vec<AgentClaimCountRow>, AppError> {
        let clients = Arc::clone(&self.clients);
        self.cache
            .get_or_compute(&QueryKey::AgentClaimCounts, || async move {
                let records = list_all_policies(&clients).await?;
                // Policies with no claims contribute nothing and are
                // skipped outright.
                let mut counts: BTreeMap<u32, (String, u64)> = BTreeMap::new();
                for record in &records {
                    let claims = record.policy.claims.len() as u64;
                    if claims == 0 {
                        continue;
                    }
                    let entry = counts
                        .entry(record.policy.agent_id)
                        .or_insert_with(|| (record.policy.agent.display_name(), 0));
                    entry.1 += claims;
                }
                Ok(counts
                    .into_iter()
                    .map(|(agent_id, (agent_name, claims))| AgentClaimCountRow {
                        agent_id,
                        agent_name,
                        claims,
                    })
                    .collect())
            })
            .await
    }
}

async fn list_all_clients(clients: &Arc<dyn ClientsRepo>) -> Result<Vec<Client>, AppError> {
    clients
        .list_clients(ClientQueryFilter::default())
        .await
        .map_err(|err| AppError::store("list_clients", err))
}

async fn list_all_policies(clients: &Arc<dyn ClientsRepo>) -> Result<Vec<PolicyRecord>, AppError> {
    clients
        .list_policies(PolicyQueryFilter::default())
        .await
        .map_err(|err| AppError::store("list_policies", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::{
        AgentQueryFilter, ClientsWriteRepo, CoverageTotal, CreateClientParams, RepoError,
    };
    use crate::cache::{CacheConfig, CacheStore, MemoryBackend};
    use crate::domain::entities::{AgentProfile, Claim, Policy, Vehicle};
    use crate::infra::memory::MemoryRepositories;

    use async_trait::async_trait;
    use time::macros::date;

    /// A store whose every read fails, for exercising error passthrough.
    struct FailingRepo;

    #[async_trait]
    impl ClientsRepo for FailingRepo {
        async fn fetch_client(&self, _client_id: u32) -> Result<Option<Client>, RepoError> {
            Err(RepoError::from_persistence("store offline"))
        }

        async fn find_by_dni(&self, _dni: &str) -> Result<Option<Client>, RepoError> {
            Err(RepoError::from_persistence("store offline"))
        }

        async fn list_clients(
            &self,
            _filter: ClientQueryFilter,
        ) -> Result<Vec<Client>, RepoError> {
            Err(RepoError::from_persistence("store offline"))
        }

        async fn find_policy(
            &self,
            _policy_number: &str,
        ) -> Result<Option<PolicyRecord>, RepoError> {
            Err(RepoError::from_persistence("store offline"))
        }

        async fn list_policies(
            &self,
            _filter: PolicyQueryFilter,
        ) -> Result<Vec<PolicyRecord>, RepoError> {
            Err(RepoError::from_persistence("store offline"))
        }

        async fn find_agent(
            &self,
            _filter: &AgentQueryFilter,
        ) -> Result<Option<AgentProfile>, RepoError> {
            Err(RepoError::from_persistence("store offline"))
        }

        async fn coverage_totals(&self) -> Result<Vec<CoverageTotal>, RepoError> {
            Err(RepoError::from_persistence("store offline"))
        }

        async fn highest_policy_number(&self) -> Result<Option<u32>, RepoError> {
            Err(RepoError::from_persistence("store offline"))
        }
    }

    fn agent(agent_id: u32, first: &str, last: &str, license: &str, active: bool) -> AgentProfile {
        AgentProfile {
            agent_id,
            first_name: first.to_string(),
            last_name: last.to_string(),
            license: license.to_string(),
            active,
        }
    }

    fn policy(
        number: &str,
        kind: PolicyKind,
        status: PolicyStatus,
        start: Date,
        end: Date,
        coverage: f64,
        agent: AgentProfile,
    ) -> Policy {
        Policy {
            policy_number: number.to_string(),
            kind,
            status,
            start_date: start,
            end_date: end,
            monthly_premium: coverage / 1000.0,
            total_coverage: coverage,
            deductible: None,
            agent_id: agent.agent_id,
            agent,
            claims: Vec::new(),
        }
    }

    fn claim(claim_id: u32, kind: ClaimKind, status: ClaimStatus, date: Date) -> Claim {
        Claim {
            claim_id,
            kind,
            status,
            date,
            estimated_amount: 5_000.0,
            description: String::new(),
            final_amount: None,
            resolution_date: None,
        }
    }

    fn vehicle(plate: &str, insured: bool) -> Vehicle {
        Vehicle {
            plate: plate.to_string(),
            brand: "Fiat".to_string(),
            model: "Cronos".to_string(),
            year: 2021,
            insured,
        }
    }

    fn client_params(client_id: u32, first: &str, last: &str, dni: &str, active: bool) -> CreateClientParams {
        CreateClientParams {
            client_id,
            first_name: first.to_string(),
            last_name: last.to_string(),
            dni: dni.to_string(),
            email: format!("{}@example.com", first.to_lowercase()),
            phone: None,
            city: Some("Cordoba".to_string()),
            active,
        }
    }

    /// Four clients, four policies, three claims, three vehicles:
    /// enough shape to exercise every view.
    async fn seeded() -> (QueryService, Arc<MemoryRepositories>, Arc<RankingIndex>) {
        let repo = Arc::new(MemoryRepositories::new());
        let carla = agent(5, "Carla", "Gomez", "MAT-005", true);
        let diego = agent(6, "Diego", "Paz", "MAT-006", false);
        let laura = agent(7, "Laura", "Mendez", "MAT-007", true);

        repo.create_client(client_params(201, "Ana", "Suarez", "30111222", true))
            .await
            .unwrap();
        repo.create_client(client_params(202, "Bruno", "Vidal", "28444555", false))
            .await
            .unwrap();
        repo.create_client(client_params(204, "Nora", "Klein", "33222111", true))
            .await
            .unwrap();
        repo.create_client(client_params(206, "Lucia", "Ferrari", "27999888", true))
            .await
            .unwrap();

        repo.append_policy(
            201,
            policy(
                "POL1153",
                PolicyKind::Auto,
                PolicyStatus::Active,
                date!(2024 - 02 - 01),
                date!(2025 - 02 - 01),
                80_000.0,
                carla.clone(),
            ),
        )
        .await
        .unwrap();
        repo.append_policy(
            202,
            policy(
                "POL1154",
                PolicyKind::Home,
                PolicyStatus::Expired,
                date!(2020 - 01 - 01),
                date!(2021 - 01 - 01),
                50_000.0,
                diego.clone(),
            ),
        )
        .await
        .unwrap();
        repo.append_policy(
            202,
            policy(
                "POL1155",
                PolicyKind::Commerce,
                PolicyStatus::Suspended,
                date!(2023 - 05 - 05),
                date!(2024 - 05 - 05),
                30_000.0,
                diego.clone(),
            ),
        )
        .await
        .unwrap();
        repo.append_policy(
            206,
            policy(
                "POL1160",
                PolicyKind::Life,
                PolicyStatus::Active,
                date!(2024 - 01 - 15),
                date!(2025 - 01 - 15),
                250_000.0,
                laura.clone(),
            ),
        )
        .await
        .unwrap();

        repo.append_claim(
            "POL1153",
            claim(
                9001,
                ClaimKind::Accident,
                ClaimStatus::Open,
                date!(2024 - 03 - 10),
            ),
        )
        .await
        .unwrap();
        repo.append_claim(
            "POL1153",
            claim(
                9002,
                ClaimKind::Fire,
                ClaimStatus::Closed,
                date!(2024 - 04 - 12),
            ),
        )
        .await
        .unwrap();
        repo.append_claim(
            "POL1160",
            claim(
                9003,
                ClaimKind::Accident,
                ClaimStatus::Closed,
                date!(2023 - 07 - 20),
            ),
        )
        .await
        .unwrap();

        repo.append_vehicle(201, vehicle("AB123CD", true)).await.unwrap();
        repo.append_vehicle(201, vehicle("XY987ZT", true)).await.unwrap();
        repo.append_vehicle(206, vehicle("LF555GG", false)).await.unwrap();

        let config = CacheConfig::default();
        let backend = Arc::new(MemoryBackend::new(&config));
        let cache = Arc::new(QueryCache::new(Arc::new(CacheStore::new(backend, config))));
        let ranking = Arc::new(RankingIndex::new());

        let service = QueryService::new(repo.clone(), cache, ranking.clone());
        (service, repo, ranking)
    }

    #[tokio::test]
    async fn active_clients_excludes_the_inactive() {
        let (service, _repo, _ranking) = seeded().await;

        let rows = service.active_clients().await.unwrap();

        let ids: Vec<u32> = rows.iter().map(|row| row.client_id).collect();
        assert_eq!(ids, vec![201, 204, 206]);
        assert_eq!(rows[0].display_name, "Ana Suarez");
        assert_eq!(rows[0].city.as_deref(), Some("Cordoba"));
    }

    #[tokio::test]
    async fn open_claims_join_policy_and_owner() {
        let (service, _repo, _ranking) = seeded().await;

        let rows = service.open_claims().await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].claim_id, 9001);
        assert_eq!(rows[0].kind, ClaimKind::Accident);
        assert_eq!(rows[0].policy_number, "POL1153");
        assert_eq!(rows[0].client_id, 201);
        assert_eq!(rows[0].client_name, "Ana Suarez");
    }

    #[tokio::test]
    async fn insured_vehicles_carry_the_first_auto_policy() {
        let (service, _repo, _ranking) = seeded().await;

        let rows = service.insured_vehicles().await.unwrap();

        // Lucia's vehicle is not insured, only Ana's two qualify.
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.client_id == 201));
        let auto = rows[0].auto_policy.as_ref().unwrap();
        assert_eq!(auto.policy_number, "POL1153");
        assert_eq!(auto.status, PolicyStatus::Active);
    }

    #[tokio::test]
    async fn uncovered_clients_include_the_policyless() {
        let (service, _repo, _ranking) = seeded().await;

        let rows = service.clients_without_active_policies().await.unwrap();

        let ids: Vec<u32> = rows.iter().map(|row| row.client_id).collect();
        // Bruno holds only Expired/Suspended policies; Nora holds none.
        assert_eq!(ids, vec![202, 204]);
        assert_eq!(rows[0].policy_count, 2);
        assert_eq!(rows[1].policy_count, 0);
    }

    #[tokio::test]
    async fn agent_policy_counts_skip_inactive_copies() {
        let (service, _repo, _ranking) = seeded().await;

        let rows = service.agent_policy_counts().await.unwrap();

        // Diego's copies are inactive; Carla and Laura carry one each.
        assert_eq!(
            rows,
            vec![
                AgentPolicyCountRow {
                    agent_id: 5,
                    agent_name: "Carla Gomez".to_string(),
                    policies: 1,
                },
                AgentPolicyCountRow {
                    agent_id: 7,
                    agent_name: "Laura Mendez".to_string(),
                    policies: 1,
                },
            ]
        );
    }

    #[tokio::test]
    async fn expired_policies_carry_owner_name() {
        let (service, _repo, _ranking) = seeded().await;

        let rows = service.expired_policies().await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].policy_number, "POL1154");
        assert_eq!(rows[0].owner_id, 202);
        assert_eq!(rows[0].owner_name, "Bruno Vidal");
    }

    #[tokio::test]
    async fn top_clients_read_the_ranking_index() {
        let (service, repo, ranking) = seeded().await;

        let totals = repo.coverage_totals().await.unwrap();
        ranking.rebuild_from(&totals);

        let rows = service.top_clients_by_coverage().await.unwrap();

        // Lucia leads; Ana and Bruno tie at 80k, ascending id wins.
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[0].client_id, 206);
        assert_eq!(rows[0].total_coverage, 250_000.0);
        assert_eq!(rows[1].client_id, 201);
        assert_eq!(rows[2].client_id, 202);
    }

    #[tokio::test]
    async fn accident_claims_partition_by_year() {
        let (service, _repo, _ranking) = seeded().await;

        let y2024 = service.accident_claims_in_year(2024).await.unwrap();
        let y2023 = service.accident_claims_in_year(2023).await.unwrap();

        assert_eq!(y2024.len(), 1);
        assert_eq!(y2024[0].claim_id, 9001);
        assert_eq!(y2023.len(), 1);
        assert_eq!(y2023[0].claim_id, 9003);
        assert_eq!(y2023[0].client_name, "Lucia Ferrari");
    }

    #[tokio::test]
    async fn active_policies_sort_by_start_date() {
        let (service, _repo, _ranking) = seeded().await;

        let rows = service.active_policies_sorted().await.unwrap();

        let numbers: Vec<&str> = rows.iter().map(|row| row.policy_number.as_str()).collect();
        // POL1160 started 15/01/2024, before POL1153's 01/02/2024.
        assert_eq!(numbers, vec!["POL1160", "POL1153"]);
    }

    #[tokio::test]
    async fn suspended_policies_carry_owner_standing() {
        let (service, _repo, _ranking) = seeded().await;

        let rows = service.suspended_policies().await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].policy_number, "POL1155");
        assert_eq!(rows[0].owner_name, "Bruno Vidal");
        assert!(!rows[0].owner_active);
    }

    #[tokio::test]
    async fn multi_vehicle_clients_require_more_than_one() {
        let (service, _repo, _ranking) = seeded().await;

        let rows = service.multi_vehicle_clients().await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].client_id, 201);
        assert_eq!(rows[0].vehicles, 2);
        assert_eq!(rows[0].plates, vec!["AB123CD", "XY987ZT"]);
    }

    #[tokio::test]
    async fn agent_claim_counts_skip_claimless_policies() {
        let (service, _repo, _ranking) = seeded().await;

        let rows = service.agent_claim_counts().await.unwrap();

        // Diego's policies carry no claims and disappear; claim counts
        // ignore the agent's active flag.
        assert_eq!(
            rows,
            vec![
                AgentClaimCountRow {
                    agent_id: 5,
                    agent_name: "Carla Gomez".to_string(),
                    claims: 2,
                },
                AgentClaimCountRow {
                    agent_id: 7,
                    agent_name: "Laura Mendez".to_string(),
                    claims: 1,
                },
            ]
        );
    }

    #[tokio::test]
    async fn cached_views_survive_store_writes_until_invalidated() {
        let (service, repo, _ranking) = seeded().await;

        let before = service.active_clients().await.unwrap();
        assert_eq!(before.len(), 3);

        // A write that bypasses the mutation surface leaves the cached
        // roster untouched; staleness is bounded by the TTL.
        repo.create_client(client_params(207, "Pedro", "Costa", "31555666", true))
            .await
            .unwrap();

        let after = service.active_clients().await.unwrap();
        assert_eq!(after.len(), 3);
    }

    #[tokio::test]
    async fn store_failures_surface_through_the_cache_aside_path() {
        let config = CacheConfig::default();
        let backend = Arc::new(MemoryBackend::new(&config));
        let cache = Arc::new(QueryCache::new(Arc::new(CacheStore::new(backend, config))));
        let service = QueryService::new(
            Arc::new(FailingRepo),
            cache.clone(),
            Arc::new(RankingIndex::new()),
        );

        let err = service.active_clients().await.unwrap_err();
        assert!(matches!(err, AppError::Store { op: "list_clients", .. }));

        let err = service.open_claims().await.unwrap_err();
        assert!(matches!(err, AppError::Store { op: "list_policies", .. }));

        // Failures cache nothing.
        assert!(cache.store().keys("*").await.is_empty());
    }
}
