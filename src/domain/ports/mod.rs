//! Ports: trait seams between the domain and its adapters.

pub mod agent_repository;
pub mod audit_log;
pub mod lock_repository;
pub mod merge_queue;
pub mod notification_store;
pub mod phase_repository;
pub mod task_repository;

pub use agent_repository::AgentRepository;
pub use audit_log::{AuditEntry, AuditLog};
pub use lock_repository::LockRepository;
pub use merge_queue::MergeQueue;
pub use notification_store::{NotificationStore, PENDING_CAP};
pub use phase_repository::PhaseRepository;
pub use task_repository::TaskRepository;
