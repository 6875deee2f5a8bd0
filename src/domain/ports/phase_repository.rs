//! Phase repository port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::Phase;

/// Repository interface for Phase persistence.
#[async_trait]
pub trait PhaseRepository: Send + Sync {
    /// Persist a phase definition.
    async fn create(&self, phase: &Phase) -> DomainResult<()>;

    /// Get a phase by index.
    async fn get(&self, index: u32) -> DomainResult<Option<Phase>>;

    /// Update an existing phase.
    async fn update(&self, phase: &Phase) -> DomainResult<()>;

    /// List all phases ordered by index.
    async fn list(&self) -> DomainResult<Vec<Phase>>;

    /// The currently active phase, if any.
    async fn active(&self) -> DomainResult<Option<Phase>>;
}
