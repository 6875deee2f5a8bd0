//! SQLite adapters: the durable state store behind the domain ports.

pub mod agent_repository;
pub mod audit_log;
pub mod connection;
pub mod lock_repository;
pub mod merge_queue;
pub mod migrations;
pub mod notification_repository;
pub mod phase_repository;
pub mod retry;
pub mod task_repository;
mod util;

pub use agent_repository::SqliteAgentRepository;
pub use audit_log::SqliteAuditLog;
pub use connection::{create_pool, create_test_pool, verify_connection, ConnectionError};
pub use lock_repository::SqliteLockRepository;
pub use merge_queue::SqliteMergeQueue;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use notification_repository::SqliteNotificationStore;
pub use phase_repository::SqlitePhaseRepository;
pub use retry::with_backoff;
pub use task_repository::SqliteTaskRepository;
