//! Agent domain model.
//!
//! An agent is a long-lived worker process that claims and executes tasks
//! one at a time. Registration assigns the id; the coordinator tracks the
//! heartbeat and the reaper reclaims work from agents that stop beating.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Registered, no current task
    Idle,
    /// Holding an in-progress task
    Working,
    /// Heartbeat expired; reaped
    Dead,
}

impl Default for AgentState {
    fn default() -> Self {
        Self::Idle
    }
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Dead => "dead",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "working" => Some(Self::Working),
            "dead" => Some(Self::Dead),
            _ => None,
        }
    }
}

/// A registered agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Registration id
    pub id: String,
    /// Declared capabilities (informational)
    pub capabilities: Vec<String>,
    /// Current state
    pub state: AgentState,
    /// Task currently held, when working
    pub current_task: Option<String>,
    /// Last heartbeat received
    pub last_heartbeat: DateTime<Utc>,
    /// When registered
    pub registered_at: DateTime<Utc>,
}

impl Agent {
    /// Register a new agent. A preferred id is honored as-is; otherwise a
    /// fresh `agent-<uuid>` id is generated.
    pub fn register(preferred_id: Option<String>, capabilities: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: preferred_id.unwrap_or_else(|| format!("agent-{}", Uuid::new_v4())),
            capabilities,
            state: AgentState::Idle,
            current_task: None,
            last_heartbeat: now,
            registered_at: now,
        }
    }

    /// Record a heartbeat.
    pub fn beat(&mut self) {
        self.last_heartbeat = Utc::now();
    }

    /// Assign a claimed task.
    pub fn assign(&mut self, task_id: impl Into<String>) {
        self.current_task = Some(task_id.into());
        self.state = AgentState::Working;
    }

    /// Release the current task and return to idle.
    pub fn release(&mut self) {
        self.current_task = None;
        if self.state == AgentState::Working {
            self.state = AgentState::Idle;
        }
    }

    /// Whether the last heartbeat is older than `timeout` as of `now`.
    pub fn is_stale(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_heartbeat > timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_generates_id() {
        let agent = Agent::register(None, vec![]);
        assert!(agent.id.starts_with("agent-"));
        assert_eq!(agent.state, AgentState::Idle);
    }

    #[test]
    fn test_register_honors_preferred_id() {
        let agent = Agent::register(Some("worker-7".into()), vec!["rust".into()]);
        assert_eq!(agent.id, "worker-7");
    }

    #[test]
    fn test_assign_release() {
        let mut agent = Agent::register(None, vec![]);
        agent.assign("t1");
        assert_eq!(agent.state, AgentState::Working);
        assert_eq!(agent.current_task.as_deref(), Some("t1"));

        agent.release();
        assert_eq!(agent.state, AgentState::Idle);
        assert!(agent.current_task.is_none());
    }

    #[test]
    fn test_staleness() {
        let mut agent = Agent::register(None, vec![]);
        agent.last_heartbeat = Utc::now() - Duration::seconds(400);
        assert!(agent.is_stale(Duration::seconds(300), Utc::now()));
        assert!(!agent.is_stale(Duration::seconds(500), Utc::now()));
    }
}
