//! Coordinator context.
//!
//! Explicit dependency bundle passed through handlers and background
//! workers: state-store ports, config, and the notification bus. No
//! process-wide singletons; atomicity relies on the store's primitives,
//! not on in-process locks.

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::adapters::sqlite::{
    SqliteAgentRepository, SqliteAuditLog, SqliteLockRepository, SqliteMergeQueue,
    SqliteNotificationStore, SqlitePhaseRepository, SqliteTaskRepository,
};
use crate::domain::models::Config;
use crate::domain::ports::{
    AgentRepository, AuditLog, LockRepository, MergeQueue, PhaseRepository, TaskRepository,
};
use crate::services::notifier::NotificationBus;

/// Shared dependencies of the coordinator process.
pub struct CoordinatorContext {
    pub config: Config,
    pub tasks: Arc<dyn TaskRepository>,
    pub agents: Arc<dyn AgentRepository>,
    pub phases: Arc<dyn PhaseRepository>,
    pub locks: Arc<dyn LockRepository>,
    pub merge_queue: Arc<dyn MergeQueue>,
    pub audit: Arc<dyn AuditLog>,
    pub bus: NotificationBus,
}

impl CoordinatorContext {
    /// Wire every port to its sqlite adapter over one pool. The atomic
    /// primitives (claim leases, the merge FIFO) carry the transient-retry
    /// policy; everything else surfaces transient errors to its supervised
    /// caller.
    pub fn sqlite(pool: SqlitePool, config: Config) -> Arc<Self> {
        let retry = config.retry.clone();
        let store = Arc::new(SqliteNotificationStore::new(pool.clone()));
        Arc::new(Self {
            tasks: Arc::new(SqliteTaskRepository::new(pool.clone())),
            agents: Arc::new(SqliteAgentRepository::new(pool.clone())),
            phases: Arc::new(SqlitePhaseRepository::new(pool.clone())),
            locks: Arc::new(SqliteLockRepository::new(pool.clone(), retry.clone())),
            merge_queue: Arc::new(SqliteMergeQueue::new(pool.clone(), retry)),
            audit: Arc::new(SqliteAuditLog::new(pool)),
            bus: NotificationBus::new(store),
            config,
        })
    }
}
