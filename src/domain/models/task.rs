//! Task domain model.
//!
//! Tasks are discrete units of work claimed and executed by agents.
//! They form a DAG under the `depends_on` relation; ids are opaque strings
//! supplied by the backlog author.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a task in the orchestration pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Defined, waiting to be claimed
    Pending,
    /// Claimed by an agent under an exclusive lease
    InProgress,
    /// Implementation finished, awaiting integration
    Done,
    /// Integration probe hit a textual conflict; owning agent must resolve
    Conflict,
    /// A required quality check failed during integration
    TestFailed,
    /// Integration itself failed; retried up to the configured bound
    MergeFailed,
    /// Integrated into the mainline
    Merged,
    /// Failed terminally (execution failure or exhausted merge retries)
    Failed,
    /// A dependency failed; this task will never run
    Blocked,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Conflict => "conflict",
            Self::TestFailed => "test_failed",
            Self::MergeFailed => "merge_failed",
            Self::Merged => "merged",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            "conflict" => Some(Self::Conflict),
            "test_failed" => Some(Self::TestFailed),
            "merge_failed" => Some(Self::MergeFailed),
            "merged" => Some(Self::Merged),
            "failed" => Some(Self::Failed),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }

    /// Terminal states for phase accounting.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Merged | Self::Failed | Self::Blocked)
    }

    /// Valid transitions from this status. Reaper resets bypass this table
    /// through [`Task::force_status`].
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::InProgress, Self::Blocked],
            Self::InProgress => &[Self::Done, Self::Failed],
            Self::Done => &[Self::Merged, Self::Conflict, Self::TestFailed, Self::MergeFailed],
            Self::Conflict => &[Self::Done],
            Self::TestFailed => &[Self::Done],
            Self::MergeFailed => &[
                Self::Merged,
                Self::Conflict,
                Self::TestFailed,
                Self::Failed,
                Self::Done,
            ],
            Self::Merged | Self::Failed | Self::Blocked => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Closed set of work kinds. The kind determines the role an agent assumes
/// when executing the task and can be gated off for auto-claim per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Setup,
    Development,
    Testing,
    Security,
    Documentation,
    Review,
}

impl Default for TaskKind {
    fn default() -> Self {
        Self::Development
    }
}

impl TaskKind {
    pub const ALL: [TaskKind; 6] = [
        Self::Setup,
        Self::Development,
        Self::Testing,
        Self::Security,
        Self::Documentation,
        Self::Review,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Security => "security",
            Self::Documentation => "documentation",
            Self::Review => "review",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "setup" => Some(Self::Setup),
            "development" => Some(Self::Development),
            "testing" => Some(Self::Testing),
            "security" => Some(Self::Security),
            "documentation" => Some(Self::Documentation),
            "review" => Some(Self::Review),
            _ => None,
        }
    }

    /// Role an agent assumes while executing a task of this kind.
    pub fn role(&self) -> &'static str {
        match self {
            Self::Setup => "devops",
            Self::Development => "developer",
            Self::Testing => "tester",
            Self::Security => "security-reviewer",
            Self::Documentation => "technical-writer",
            Self::Review => "code-reviewer",
        }
    }
}

/// Priority level for claim ordering. High before Medium before Low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Accepts both single-letter backlog shorthand (H/M/L) and full names.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "h" | "high" => Some(Self::High),
            "m" | "medium" => Some(Self::Medium),
            "l" | "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Sort key for claim ordering: lower sorts first.
    pub fn sort_key(&self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

/// A discrete unit of work claimed and executed by one agent at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Opaque id, unique within a backlog
    pub id: String,
    /// Human-readable title
    pub title: String,
    /// Kind of work
    pub kind: TaskKind,
    /// Priority for claim ordering
    pub priority: TaskPriority,
    /// Detailed description
    pub description: String,
    /// Free-text acceptance criteria
    pub acceptance_criteria: Vec<String>,
    /// Task ids this depends on
    pub depends_on: Vec<String>,
    /// Current status
    pub status: TaskStatus,
    /// Agent currently (or last) holding the task
    pub assigned_agent: Option<String>,
    /// Branch carrying the implementation
    pub branch: Option<String>,
    /// Pull-request handle, when remote mode created one
    pub pull_request: Option<String>,
    /// Merge retry count (owned by the merge worker)
    pub retry_count: u32,
    /// Diagnostic set when the task became blocked
    pub blocked_reason: Option<String>,
    /// Unknown backlog fields, preserved but not interpreted
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When claimed
    pub claimed_at: Option<DateTime<Utc>>,
    /// When the implementation completed
    pub completed_at: Option<DateTime<Utc>>,
    /// When merged into the mainline
    pub merged_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(id: impl Into<String>, title: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind,
            priority: TaskPriority::default(),
            description: String::new(),
            acceptance_criteria: Vec::new(),
            depends_on: Vec::new(),
            status: TaskStatus::default(),
            assigned_agent: None,
            branch: None,
            pull_request: None,
            retry_count: 0,
            blocked_reason: None,
            extra: serde_json::Map::new(),
            created_at: Utc::now(),
            claimed_at: None,
            completed_at: None,
            merged_at: None,
        }
    }

    /// Set priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Add a dependency.
    pub fn with_dependency(mut self, task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        if task_id != self.id && !self.depends_on.contains(&task_id) {
            self.depends_on.push(task_id);
        }
        self
    }

    /// Set description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Check if can transition to given status.
    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to new status, updating timestamps.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }

        self.status = new_status;
        match new_status {
            TaskStatus::InProgress => self.claimed_at = Some(Utc::now()),
            TaskStatus::Done => self.completed_at = Some(Utc::now()),
            TaskStatus::Merged => self.merged_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }

    /// Force a status transition, bypassing the state machine.
    ///
    /// Reserved for the reaper's `in_progress -> pending` reset and crash
    /// recovery. A tracing warning is emitted every time this is called so
    /// that bypass sites are visible in logs.
    pub fn force_status(&mut self, new_status: TaskStatus, reason: &str) {
        tracing::warn!(
            task_id = %self.id,
            from = %self.status.as_str(),
            to = %new_status.as_str(),
            reason = reason,
            "Forcing task status transition (bypassing state machine)"
        );
        self.status = new_status;
    }

    /// Check if task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Mark as blocked with a diagnostic naming the failed dependency.
    pub fn block(&mut self, failed_dep: &str) -> Result<(), String> {
        self.transition_to(TaskStatus::Blocked)?;
        self.blocked_reason = Some(format!("dependency {failed_dep} failed"));
        Ok(())
    }
}
