//! Claim lock port.
//!
//! A claim lock is an expiring exclusive lease on a task. Acquisition is
//! set-if-absent: the first acquirer wins until the lease expires or is
//! released. Expiration alone never resets a task; only the reaper does.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::errors::DomainResult;

/// Lease store interface for claim locks.
#[async_trait]
pub trait LockRepository: Send + Sync {
    /// Atomically acquire the lock for a task unless a live lease exists.
    /// Returns true when this holder now owns the lease.
    async fn acquire(&self, task_id: &str, holder: &str, ttl: Duration) -> DomainResult<bool>;

    /// Current non-expired holder, if any.
    async fn holder(&self, task_id: &str) -> DomainResult<Option<String>>;

    /// Release the lock if held by `holder`. Returns true when released.
    async fn release(&self, task_id: &str, holder: &str) -> DomainResult<bool>;

    /// Unconditionally delete the lock (reaper authority). Returns true when
    /// a lock row existed.
    async fn force_release(&self, task_id: &str) -> DomainResult<bool>;
}
