//! Mutation services.
//!
//! Every write validates fully before touching the store, commits
//! through the repository, and only then routes its mutation kind
//! through the invalidation router. A failed validation performs no
//! mutation and no invalidation; a failed invalidation never undoes a
//! committed write.

use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::application::error::AppError;
use crate::application::repos::{
    BroadcastOutcome, ClientsRepo, ClientsWriteRepo, CreateClientParams, RepoError,
    UpdateClaimParams, UpdateClientParams,
};
use crate::cache::{InvalidationRouter, Mutation};
use crate::domain::dates;
use crate::domain::entities::{AgentProfile, Claim, Client, Policy};
use crate::domain::error::DomainError;
use crate::domain::types::{
    parse_claim_kind, parse_claim_status, parse_policy_kind, parse_policy_status,
};
use crate::ranking::RankingIndex;

const METRIC_MUTATION_TOTAL: &str = "polizza_mutation_total";

/// First policy number handed out on a store with no `POL<n>` numbers.
const POLICY_NUMBER_SEED: u32 = 1161;

// ============================================================================
// Request Payloads
// ============================================================================

/// Payload for `create_client`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClient {
    pub client_id: u32,
    pub first_name: String,
    pub last_name: String,
    pub dni: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Patch for `update_client`. Unset fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientPatch {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

/// How `delete_client` removes a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Flip `active` off; the document and its arrays survive.
    Soft,
    /// Remove the document and, by ownership, everything embedded.
    Hard,
}

/// What `delete_client` did.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    Deactivated(Client),
    Purged,
}

/// Payload for `create_claim`. Dates and vocabularies arrive as raw
/// strings and are validated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClaim {
    pub policy_number: String,
    pub claim_id: u32,
    pub kind: String,
    pub date: String,
    pub estimated_amount: f64,
    pub status: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub final_amount: Option<f64>,
    #[serde(default)]
    pub resolution_date: Option<String>,
}

/// Payload for `update_claim_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimStatusUpdate {
    pub status: String,
    #[serde(default)]
    pub final_amount: Option<f64>,
    #[serde(default)]
    pub resolution_date: Option<String>,
}

/// Payload for `issue_policy`. The client is addressed by dni, the
/// agent by license; the policy number is generated when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPolicy {
    pub client_dni: String,
    pub kind: String,
    pub start_date: String,
    pub end_date: String,
    pub monthly_premium: f64,
    pub total_coverage: f64,
    pub agent_license: String,
    pub status: String,
    #[serde(default)]
    pub deductible: Option<f64>,
    #[serde(default)]
    pub policy_number: Option<String>,
}

/// An issued policy together with the owning client id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssuedPolicy {
    pub client_id: u32,
    pub policy: Policy,
}

/// Payload for `update_agent`: the replacement public fields broadcast
/// into every policy referencing the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentUpdate {
    pub agent_id: u32,
    pub first_name: String,
    pub last_name: String,
    pub license: String,
    pub active: bool,
}

// ============================================================================
// Mutation Service
// ============================================================================

/// The write surface of the store, with invalidation wired in.
#[derive(Clone)]
pub struct MutationService {
    clients: Arc<dyn ClientsRepo>,
    writer: Arc<dyn ClientsWriteRepo>,
    router: Arc<InvalidationRouter>,
    ranking: Arc<RankingIndex>,
}

impl MutationService {
    pub fn new(
        clients: Arc<dyn ClientsRepo>,
        writer: Arc<dyn ClientsWriteRepo>,
        router: Arc<InvalidationRouter>,
        ranking: Arc<RankingIndex>,
    ) -> Self {
        Self {
            clients,
            writer,
            router,
            ranking,
        }
    }

    /// Insert a new client shell.
    pub async fn create_client(&self, request: NewClient) -> Result<Client, AppError> {
        require("first_name", &request.first_name)?;
        require("last_name", &request.last_name)?;
        require("dni", &request.dni)?;
        require("email", &request.email)?;

        let created = self
            .writer
            .create_client(CreateClientParams {
                client_id: request.client_id,
                first_name: request.first_name,
                last_name: request.last_name,
                dni: request.dni,
                email: request.email,
                phone: request.phone,
                city: request.city,
                active: request.active,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { ref constraint } if constraint == "clients.dni" => {
                    DomainError::duplicate("dni already registered").into()
                }
                RepoError::Duplicate { .. } => {
                    DomainError::duplicate("client id already taken").into()
                }
                other => AppError::store("create_client", other),
            })?;

        self.after_commit("create_client", Mutation::ClientCreated)
            .await;
        Ok(created)
    }

    /// Patch a client's own fields.
    pub async fn update_client(
        &self,
        client_id: u32,
        patch: ClientPatch,
    ) -> Result<Client, AppError> {
        let params = UpdateClientParams {
            first_name: patch.first_name,
            last_name: patch.last_name,
            email: patch.email,
            phone: patch.phone,
            city: patch.city,
            active: patch.active,
        };
        if params.is_empty() {
            return Err(DomainError::validation("patch must name at least one field").into());
        }
        for (field, value) in [
            ("first_name", &params.first_name),
            ("last_name", &params.last_name),
            ("email", &params.email),
        ] {
            if let Some(value) = value {
                require(field, value)?;
            }
        }

        let updated = self
            .writer
            .update_client(client_id, params)
            .await
            .map_err(|err| match err {
                RepoError::NotFound => DomainError::not_found("client", client_id.to_string()).into(),
                other => AppError::store("update_client", other),
            })?;

        self.after_commit("update_client", Mutation::ClientUpdated)
            .await;
        Ok(updated)
    }

    /// Remove a client, softly or for good.
    pub async fn delete_client(
        &self,
        client_id: u32,
        mode: DeleteMode,
    ) -> Result<DeleteOutcome, AppError> {
        match mode {
            DeleteMode::Soft => {
                let deactivated = self
                    .writer
                    .update_client(
                        client_id,
                        UpdateClientParams {
                            active: Some(false),
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(|err| match err {
                        RepoError::NotFound => {
                            DomainError::not_found("client", client_id.to_string()).into()
                        }
                        other => AppError::store("update_client", other),
                    })?;

                self.after_commit("delete_client_soft", Mutation::ClientDeactivated)
                    .await;
                Ok(DeleteOutcome::Deactivated(deactivated))
            }
            DeleteMode::Hard => {
                self.writer
                    .delete_client(client_id)
                    .await
                    .map_err(|err| match err {
                        RepoError::NotFound => {
                            DomainError::not_found("client", client_id.to_string()).into()
                        }
                        other => AppError::store("delete_client", other),
                    })?;

                self.after_commit("delete_client_hard", Mutation::ClientPurged)
                    .await;
                Ok(DeleteOutcome::Purged)
            }
        }
    }

    /// File a claim against a policy (guarded append).
    pub async fn create_claim(&self, request: NewClaim) -> Result<Claim, AppError> {
        require("policy_number", &request.policy_number)?;
        let kind = parse_claim_kind(&request.kind)?;
        let status = parse_claim_status(&request.status)?;
        let date = dates::parse(&request.date)?;
        if request.estimated_amount <= 0.0 {
            return Err(DomainError::validation("estimated_amount must be positive").into());
        }
        let resolution_date = match &request.resolution_date {
            Some(raw) => Some(dates::parse(raw)?),
            None => None,
        };

        let claim = Claim {
            claim_id: request.claim_id,
            kind,
            status,
            date,
            estimated_amount: request.estimated_amount,
            description: request.description.unwrap_or_default(),
            final_amount: request.final_amount,
            resolution_date,
        };

        self.writer
            .append_claim(&request.policy_number, claim.clone())
            .await
            .map_err(|err| match err {
                RepoError::NotFound => {
                    DomainError::not_found("policy", request.policy_number.clone()).into()
                }
                RepoError::Duplicate { .. } => DomainError::duplicate(format!(
                    "claim {} already filed on {}",
                    request.claim_id, request.policy_number
                ))
                .into(),
                other => AppError::store("append_claim", other),
            })?;

        self.after_commit("create_claim", Mutation::ClaimFiled).await;
        Ok(claim)
    }

    /// Rewrite one claim's status fields in place.
    pub async fn update_claim_status(
        &self,
        policy_number: &str,
        claim_id: u32,
        update: ClaimStatusUpdate,
    ) -> Result<(), AppError> {
        let status = parse_claim_status(&update.status)?;
        let resolution_date = match &update.resolution_date {
            Some(raw) => Some(dates::parse(raw)?),
            None => None,
        };

        self.writer
            .update_claim(
                policy_number,
                claim_id,
                UpdateClaimParams {
                    status,
                    final_amount: update.final_amount,
                    resolution_date,
                },
            )
            .await
            .map_err(|err| match err {
                RepoError::NotFound => {
                    DomainError::not_found("claim", format!("{policy_number}/{claim_id}")).into()
                }
                other => AppError::store("update_claim", other),
            })?;

        self.after_commit("update_claim_status", Mutation::ClaimStatusChanged)
            .await;
        Ok(())
    }

    /// Issue a policy to a client (guarded append with lookups).
    pub async fn issue_policy(&self, request: NewPolicy) -> Result<IssuedPolicy, AppError> {
        let kind = parse_policy_kind(&request.kind)?;
        let status = parse_policy_status(&request.status)?;
        let start_date = dates::parse(&request.start_date)?;
        let end_date = dates::parse(&request.end_date)?;
        if end_date <= start_date {
            return Err(DomainError::validation("end_date must fall after start_date").into());
        }
        if request.monthly_premium <= 0.0 {
            return Err(DomainError::validation("monthly_premium must be positive").into());
        }
        if request.total_coverage <= 0.0 {
            return Err(DomainError::validation("total_coverage must be positive").into());
        }
        if request.deductible.is_some_and(|deductible| deductible < 0.0) {
            return Err(DomainError::validation("deductible must not be negative").into());
        }

        let client = self
            .clients
            .find_by_dni(&request.client_dni)
            .await
            .map_err(|err| AppError::store("find_by_dni", err))?
            .ok_or_else(|| DomainError::not_found("client", request.client_dni.clone()))?;
        if !client.active {
            return Err(DomainError::validation(format!(
                "client {} is inactive and cannot take new policies",
                client.client_id
            ))
            .into());
        }

        let agent = self
            .clients
            .find_agent(&crate::application::repos::AgentQueryFilter {
                license: Some(request.agent_license.clone()),
                ..Default::default()
            })
            .await
            .map_err(|err| AppError::store("find_agent", err))?
            .ok_or_else(|| DomainError::not_found("agent", request.agent_license.clone()))?;
        if !agent.active {
            return Err(DomainError::validation(format!(
                "agent {} is inactive and cannot take new policies",
                agent.license
            ))
            .into());
        }

        let policy_number = match request.policy_number {
            Some(number) => {
                require("policy_number", &number)?;
                number
            }
            None => self.next_policy_number().await?,
        };

        let policy = Policy {
            policy_number: policy_number.clone(),
            kind,
            status,
            start_date,
            end_date,
            monthly_premium: request.monthly_premium,
            total_coverage: request.total_coverage,
            deductible: request.deductible,
            agent_id: agent.agent_id,
            agent,
            claims: Vec::new(),
        };

        self.writer
            .append_policy(client.client_id, policy.clone())
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => {
                    DomainError::duplicate(format!("policy {policy_number} already issued")).into()
                }
                RepoError::NotFound => {
                    DomainError::not_found("client", client.client_id.to_string()).into()
                }
                other => AppError::store("append_policy", other),
            })?;

        self.after_commit("issue_policy", Mutation::PolicyIssued)
            .await;
        Ok(IssuedPolicy {
            client_id: client.client_id,
            policy,
        })
    }

    /// Broadcast an agent's public fields into every referencing
    /// policy.
    pub async fn update_agent(&self, update: AgentUpdate) -> Result<BroadcastOutcome, AppError> {
        require("first_name", &update.first_name)?;
        require("last_name", &update.last_name)?;
        require("license", &update.license)?;

        let outcome = self
            .writer
            .broadcast_agent(AgentProfile {
                agent_id: update.agent_id,
                first_name: update.first_name,
                last_name: update.last_name,
                license: update.license,
                active: update.active,
            })
            .await
            .map_err(|err| AppError::store("broadcast_agent", err))?;

        self.after_commit("update_agent", Mutation::AgentProfileUpdated)
            .await;
        Ok(outcome)
    }

    /// Recompute the coverage ranking from the store.
    ///
    /// Exposed for the loader and the operational CLI; mutations that
    /// move totals call it themselves.
    pub async fn rebuild_ranking(&self) -> Result<usize, AppError> {
        let totals = self
            .clients
            .coverage_totals()
            .await
            .map_err(|err| AppError::store("coverage_totals", err))?;
        Ok(self.ranking.rebuild_from(&totals))
    }

    async fn next_policy_number(&self) -> Result<String, AppError> {
        let highest = self
            .clients
            .highest_policy_number()
            .await
            .map_err(|err| AppError::store("highest_policy_number", err))?;
        let next = highest.map_or(POLICY_NUMBER_SEED, |n| n + 1);
        Ok(format!("POL{next}"))
    }

    /// Post-commit bookkeeping: count the write, drop stale views,
    /// rebuild the ranking when totals moved. Never fails the caller.
    async fn after_commit(&self, op: &'static str, mutation: Mutation) {
        counter!(METRIC_MUTATION_TOTAL, "op" => op).increment(1);
        self.router.on_mutation(mutation).await;
        if mutation.rebuilds_ranking() {
            if let Err(err) = self.rebuild_ranking().await {
                error!(error = %err, "Ranking rebuild failed after committed write; ranking stays stale");
            }
        }
    }
}

fn require(field: &'static str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} must not be blank")));
    }
    Ok(())
}
