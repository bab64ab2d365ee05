//! In-memory reference implementation of the clients repository.
//!
//! Documents live in an insertion-ordered vector behind one RwLock, so
//! every write call (insert, patch, guarded append, broadcast) is
//! atomic with respect to every other store call, matching the
//! per-document atomicity a remote document store would provide.

use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::application::repos::{
    AgentQueryFilter, BroadcastOutcome, ClientQueryFilter, ClientsRepo, ClientsWriteRepo,
    CoverageTotal, CreateClientParams, PolicyQueryFilter, PolicyRecord, RepoError,
    UpdateClaimParams, UpdateClientParams,
};
use crate::domain::entities::{AgentProfile, Claim, Client, Policy, Vehicle};
use crate::util::lock::{rw_read, rw_write};

const SOURCE: &str = "infra::memory";

/// Insertion-ordered client collection.
#[derive(Default)]
pub struct MemoryRepositories {
    clients: RwLock<Vec<Client>>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientsRepo for MemoryRepositories {
    async fn fetch_client(&self, client_id: u32) -> Result<Option<Client>, RepoError> {
        let clients = rw_read(&self.clients, SOURCE, "fetch_client");
        Ok(clients.iter().find(|c| c.client_id == client_id).cloned())
    }

    async fn find_by_dni(&self, dni: &str) -> Result<Option<Client>, RepoError> {
        let clients = rw_read(&self.clients, SOURCE, "find_by_dni");
        Ok(clients.iter().find(|c| c.dni == dni).cloned())
    }

    async fn list_clients(&self, filter: ClientQueryFilter) -> Result<Vec<Client>, RepoError> {
        let clients = rw_read(&self.clients, SOURCE, "list_clients");
        Ok(clients
            .iter()
            .filter(|c| filter.active.is_none_or(|active| c.active == active))
            .cloned()
            .collect())
    }

    async fn find_policy(&self, policy_number: &str) -> Result<Option<PolicyRecord>, RepoError> {
        let clients = rw_read(&self.clients, SOURCE, "find_policy");
        for client in clients.iter() {
            if let Some(policy) = client
                .policies
                .iter()
                .find(|p| p.policy_number == policy_number)
            {
                return Ok(Some(flatten(client, policy)));
            }
        }
        Ok(None)
    }

    async fn list_policies(
        &self,
        filter: PolicyQueryFilter,
    ) -> Result<Vec<PolicyRecord>, RepoError> {
        let clients = rw_read(&self.clients, SOURCE, "list_policies");
        let mut records = Vec::new();
        for client in clients.iter() {
            for policy in &client.policies {
                if filter.status.is_none_or(|status| policy.status == status) {
                    records.push(flatten(client, policy));
                }
            }
        }
        Ok(records)
    }

    async fn find_agent(
        &self,
        filter: &AgentQueryFilter,
    ) -> Result<Option<AgentProfile>, RepoError> {
        let clients = rw_read(&self.clients, SOURCE, "find_agent");
        for client in clients.iter() {
            for policy in &client.policies {
                let agent = &policy.agent;
                let id_ok = filter.agent_id.is_none_or(|id| agent.agent_id == id);
                let license_ok = filter
                    .license
                    .as_deref()
                    .is_none_or(|license| agent.license == license);
                let active_ok = filter.active.is_none_or(|active| agent.active == active);
                if id_ok && license_ok && active_ok {
                    return Ok(Some(agent.clone()));
                }
            }
        }
        Ok(None)
    }

    async fn coverage_totals(&self) -> Result<Vec<CoverageTotal>, RepoError> {
        let clients = rw_read(&self.clients, SOURCE, "coverage_totals");
        Ok(clients
            .iter()
            .map(|client| CoverageTotal {
                client_id: client.client_id,
                display_name: client.display_name(),
                total_coverage: client.policies.iter().map(|p| p.total_coverage).sum(),
            })
            .collect())
    }

    async fn highest_policy_number(&self) -> Result<Option<u32>, RepoError> {
        let clients = rw_read(&self.clients, SOURCE, "highest_policy_number");
        Ok(clients
            .iter()
            .flat_map(|c| &c.policies)
            .filter_map(|p| p.policy_number.strip_prefix("POL"))
            .filter_map(|suffix| suffix.parse::<u32>().ok())
            .max())
    }
}

#[async_trait]
impl ClientsWriteRepo for MemoryRepositories {
    async fn create_client(&self, params: CreateClientParams) -> Result<Client, RepoError> {
        let mut clients = rw_write(&self.clients, SOURCE, "create_client");
        if clients.iter().any(|c| c.client_id == params.client_id) {
            return Err(RepoError::duplicate("clients.client_id"));
        }
        if clients.iter().any(|c| c.dni == params.dni) {
            return Err(RepoError::duplicate("clients.dni"));
        }
        let client = Client {
            id: Uuid::new_v4(),
            client_id: params.client_id,
            first_name: params.first_name,
            last_name: params.last_name,
            dni: params.dni,
            email: params.email,
            phone: params.phone,
            city: params.city,
            active: params.active,
            policies: Vec::new(),
            vehicles: Vec::new(),
        };
        clients.push(client.clone());
        Ok(client)
    }

    async fn update_client(
        &self,
        client_id: u32,
        params: UpdateClientParams,
    ) -> Result<Client, RepoError> {
        let mut clients = rw_write(&self.clients, SOURCE, "update_client");
        let client = clients
            .iter_mut()
            .find(|c| c.client_id == client_id)
            .ok_or(RepoError::NotFound)?;
        if let Some(first_name) = params.first_name {
            client.first_name = first_name;
        }
        if let Some(last_name) = params.last_name {
            client.last_name = last_name;
        }
        if let Some(email) = params.email {
            client.email = email;
        }
        if let Some(phone) = params.phone {
            client.phone = Some(phone);
        }
        if let Some(city) = params.city {
            client.city = Some(city);
        }
        if let Some(active) = params.active {
            client.active = active;
        }
        Ok(client.clone())
    }

    async fn delete_client(&self, client_id: u32) -> Result<(), RepoError> {
        let mut clients = rw_write(&self.clients, SOURCE, "delete_client");
        let position = clients
            .iter()
            .position(|c| c.client_id == client_id)
            .ok_or(RepoError::NotFound)?;
        clients.remove(position);
        Ok(())
    }

    async fn append_policy(&self, client_id: u32, policy: Policy) -> Result<(), RepoError> {
        let mut clients = rw_write(&self.clients, SOURCE, "append_policy");
        if clients
            .iter()
            .flat_map(|c| &c.policies)
            .any(|p| p.policy_number == policy.policy_number)
        {
            return Err(RepoError::duplicate("policies.policy_number"));
        }
        let client = clients
            .iter_mut()
            .find(|c| c.client_id == client_id)
            .ok_or(RepoError::NotFound)?;
        client.policies.push(policy);
        Ok(())
    }

    async fn append_claim(&self, policy_number: &str, claim: Claim) -> Result<(), RepoError> {
        let mut clients = rw_write(&self.clients, SOURCE, "append_claim");
        let policy = clients
            .iter_mut()
            .flat_map(|c| c.policies.iter_mut())
            .find(|p| p.policy_number == policy_number)
            .ok_or(RepoError::NotFound)?;
        if policy.claims.iter().any(|c| c.claim_id == claim.claim_id) {
            return Err(RepoError::duplicate("claims.claim_id"));
        }
        policy.claims.push(claim);
        Ok(())
    }

    async fn append_vehicle(&self, client_id: u32, vehicle: Vehicle) -> Result<(), RepoError> {
        let mut clients = rw_write(&self.clients, SOURCE, "append_vehicle");
        let client = clients
            .iter_mut()
            .find(|c| c.client_id == client_id)
            .ok_or(RepoError::NotFound)?;
        if client.vehicles.iter().any(|v| v.plate == vehicle.plate) {
            return Err(RepoError::duplicate("vehicles.plate"));
        }
        client.vehicles.push(vehicle);
        Ok(())
    }

    async fn update_claim(
        &self,
        policy_number: &str,
        claim_id: u32,
        params: UpdateClaimParams,
    ) -> Result<(), RepoError> {
        let mut clients = rw_write(&self.clients, SOURCE, "update_claim");
        let policy = clients
            .iter_mut()
            .flat_map(|c| c.policies.iter_mut())
            .find(|p| p.policy_number == policy_number)
            .ok_or(RepoError::NotFound)?;
        let claim = policy
            .claims
            .iter_mut()
            .find(|c| c.claim_id == claim_id)
            .ok_or(RepoError::NotFound)?;
        claim.status = params.status;
        if let Some(final_amount) = params.final_amount {
            claim.final_amount = Some(final_amount);
        }
        if let Some(resolution_date) = params.resolution_date {
            claim.resolution_date = Some(resolution_date);
        }
        Ok(())
    }

    async fn broadcast_agent(&self, profile: AgentProfile) -> Result<BroadcastOutcome, RepoError> {
        let mut clients = rw_write(&self.clients, SOURCE, "broadcast_agent");
        let mut outcome = BroadcastOutcome {
            documents_touched: 0,
            elements_updated: 0,
        };
        for client in clients.iter_mut() {
            let mut touched = false;
            for policy in &mut client.policies {
                if policy.agent_id == profile.agent_id {
                    policy.agent = profile.clone();
                    outcome.elements_updated += 1;
                    touched = true;
                }
            }
            if touched {
                outcome.documents_touched += 1;
            }
        }
        Ok(outcome)
    }
}

fn flatten(client: &Client, policy: &Policy) -> PolicyRecord {
    PolicyRecord {
        owner_id: client.client_id,
        owner_name: client.display_name(),
        owner_active: client.active,
        policy: policy.clone(),
    }
}
