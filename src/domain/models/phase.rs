//! Phase domain model.
//!
//! A phase is a maximal set of tasks that may run in parallel per the
//! topological order computed by the backlog compiler. Phase k activates
//! only after phase k-1 completed, and a phase completes only when every
//! task in it reached a terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Active,
    Completed,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// One topological layer of the backlog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// 1-based phase index
    pub index: u32,
    /// Ordered task ids in this phase (no ordering relation among them)
    pub task_ids: Vec<String>,
    /// Current status
    pub status: PhaseStatus,
    /// When activated
    pub started_at: Option<DateTime<Utc>>,
    /// When completed
    pub completed_at: Option<DateTime<Utc>>,
}

impl Phase {
    pub fn new(index: u32, task_ids: Vec<String>) -> Self {
        Self {
            index,
            task_ids,
            status: PhaseStatus::Pending,
            started_at: None,
            completed_at: None,
        }
    }

    /// Activate this phase.
    pub fn activate(&mut self) {
        self.status = PhaseStatus::Active;
        self.started_at = Some(Utc::now());
    }

    /// Mark this phase completed.
    pub fn complete(&mut self) {
        self.status = PhaseStatus::Completed;
        self.completed_at = Some(Utc::now());
    }
}
