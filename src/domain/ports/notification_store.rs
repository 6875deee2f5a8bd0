//! Durable notification store port.
//!
//! Backs the pub/sub bus with a bounded per-agent pending list so that late
//! subscribers do not miss events. Consumers drain on startup and may trim
//! after processing.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::Notification;

/// Cap on pending notifications retained per agent.
pub const PENDING_CAP: u64 = 200;

/// Durable store interface for per-agent pending notifications.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Append to the agent's pending list, trimming the oldest entries past
    /// [`PENDING_CAP`].
    async fn push(&self, notification: &Notification) -> DomainResult<()>;

    /// Fetch and delete all pending notifications for an agent (including
    /// broadcasts), oldest first.
    async fn drain(&self, agent_id: &str) -> DomainResult<Vec<Notification>>;

    /// Pending count for an agent.
    async fn pending_len(&self, agent_id: &str) -> DomainResult<u64>;
}
