//! Notification domain model.
//!
//! Notifications are addressed to a single agent and delivered twice: over
//! the in-process broadcast channel for prompt wakeups, and appended to a
//! durable per-agent pending list so late subscribers do not miss events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version stamped on every event envelope.
pub const NOTIFICATION_SCHEMA_VERSION: u32 = 1;

/// Pseudo agent id addressing every subscriber (phase activation, backlog
/// completion).
pub const BROADCAST_AGENT: &str = "*";

/// Kind of event carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// The merge probe found textual conflicts on the agent's branch.
    ConflictDetected,
    /// A required quality check failed during integration.
    TestsFailed,
    /// Integration failed terminally; manual intervention required.
    MergeFailed,
    /// The agent's branch was integrated into the mainline.
    MergeSuccess,
    /// A new phase activated; idle agents should claim promptly.
    PhaseActivated,
    /// Every phase completed; the backlog is done.
    BacklogComplete,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConflictDetected => "conflict_detected",
            Self::TestsFailed => "tests_failed",
            Self::MergeFailed => "merge_failed",
            Self::MergeSuccess => "merge_success",
            Self::PhaseActivated => "phase_activated",
            Self::BacklogComplete => "backlog_complete",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "conflict_detected" => Some(Self::ConflictDetected),
            "tests_failed" => Some(Self::TestsFailed),
            "merge_failed" => Some(Self::MergeFailed),
            "merge_success" => Some(Self::MergeSuccess),
            "phase_activated" => Some(Self::PhaseActivated),
            "backlog_complete" => Some(Self::BacklogComplete),
            _ => None,
        }
    }
}

/// Versioned event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique event id
    pub id: Uuid,
    /// Envelope schema version
    pub version: u32,
    /// Addressee; [`BROADCAST_AGENT`] for phase-level events
    pub agent_id: String,
    /// Task the event concerns, when applicable
    pub task_id: Option<String>,
    /// Event kind
    pub kind: NotificationKind,
    /// Opaque payload (conflict file lists, captured check output, ...)
    pub data: serde_json::Value,
    /// When published
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        agent_id: impl Into<String>,
        task_id: Option<String>,
        kind: NotificationKind,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            version: NOTIFICATION_SCHEMA_VERSION,
            agent_id: agent_id.into(),
            task_id,
            kind,
            data,
            timestamp: Utc::now(),
        }
    }

    /// Event addressed to every subscriber.
    pub fn broadcast(kind: NotificationKind, data: serde_json::Value) -> Self {
        Self::new(BROADCAST_AGENT, None, kind, data)
    }
}
