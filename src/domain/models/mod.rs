//! Domain models for the drover orchestration core.

pub mod agent;
pub mod backlog;
pub mod config;
pub mod merge;
pub mod notification;
pub mod phase;
pub mod task;

pub use agent::{Agent, AgentState};
pub use backlog::{Backlog, BacklogRecord};
pub use config::{
    AdvancedConfig, AgentAssignmentConfig, Config, CoordinatorConfig, DatabaseConfig, GitConfig,
    KindGate, LoggingConfig, QualityCheck, QualityGatesConfig, RetryConfig, TimeoutsConfig,
};
pub use merge::{MergeOutcome, MergeRequest};
pub use notification::{
    Notification, NotificationKind, BROADCAST_AGENT, NOTIFICATION_SCHEMA_VERSION,
};
pub use phase::{Phase, PhaseStatus};
pub use task::{Task, TaskKind, TaskPriority, TaskStatus};
