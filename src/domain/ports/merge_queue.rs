//! Merge queue port.
//!
//! A durable FIFO of merge requests consumed by the single sequential merge
//! worker. Enqueue order is preserved across restarts.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::errors::DomainResult;
use crate::domain::models::MergeRequest;

/// Durable FIFO interface for merge requests, plus the active-merge record
/// that lets a restarted worker recover the request it was processing.
#[async_trait]
pub trait MergeQueue: Send + Sync {
    /// Append a request at the tail.
    async fn enqueue(&self, request: &MergeRequest) -> DomainResult<()>;

    /// Pop the head, or None when empty.
    async fn pop(&self) -> DomainResult<Option<MergeRequest>>;

    /// Pop the head, waiting up to `timeout` for an enqueue when empty.
    async fn pop_blocking(&self, timeout: Duration) -> DomainResult<Option<MergeRequest>>;

    /// Current queue depth.
    async fn len(&self) -> DomainResult<u64>;

    /// Record the request currently being integrated.
    async fn mark_active(&self, request: &MergeRequest) -> DomainResult<()>;

    /// Clear the active record once the request reached a disposition.
    async fn clear_active(&self, task_id: &str) -> DomainResult<()>;

    /// Take any active records left behind by a crashed worker.
    async fn take_stale_active(&self) -> DomainResult<Vec<MergeRequest>>;
}
