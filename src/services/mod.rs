//! Services: the orchestration core.

pub mod backlog_loader;
pub mod context;
pub mod coordinator;
pub mod merge_worker;
pub mod notifier;
pub mod phase_scheduler;
pub mod quality_gates;
pub mod reaper;

pub use backlog_loader::BacklogLoader;
pub use context::CoordinatorContext;
pub use coordinator::{CompletionOutcome, CoordinatorService, StatusReport};
pub use merge_worker::MergeWorker;
pub use notifier::NotificationBus;
pub use phase_scheduler::PhaseScheduler;
pub use quality_gates::{detect_project_kind, GateReport, ProjectKind, QualityGates};
pub use reaper::Reaper;
