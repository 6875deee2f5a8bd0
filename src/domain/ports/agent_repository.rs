//! Agent repository port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::Agent;

/// Repository interface for Agent persistence.
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Persist a newly registered agent. Fails with `AgentConflict` when the
    /// id is already registered and not dead.
    async fn create(&self, agent: &Agent) -> DomainResult<()>;

    /// Get an agent by id.
    async fn get(&self, id: &str) -> DomainResult<Option<Agent>>;

    /// Update an existing agent.
    async fn update(&self, agent: &Agent) -> DomainResult<()>;

    /// List all registered agents.
    async fn list(&self) -> DomainResult<Vec<Agent>>;

    /// Record a heartbeat. Returns false when the agent is unknown.
    async fn heartbeat(&self, id: &str) -> DomainResult<bool>;
}
