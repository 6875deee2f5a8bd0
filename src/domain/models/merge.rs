//! Merge queue domain model.
//!
//! Completed tasks enqueue a merge request; a single sequential worker
//! consumes the FIFO and integrates branches into the mainline one at a
//! time, so that phase advancement only ever observes fully merged work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A request to integrate a completed branch, consumed in FIFO order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRequest {
    /// Unique id for this request
    pub id: Uuid,
    /// Task whose branch is being integrated
    pub task_id: String,
    /// Source branch
    pub branch: String,
    /// Pull-request handle, when remote mode created one
    pub pull_request: Option<String>,
    /// Agent that completed the task
    pub agent_id: String,
    /// Retry count for the integrate step
    pub retry_count: u32,
    /// When enqueued
    pub enqueued_at: DateTime<Utc>,
}

impl MergeRequest {
    pub fn new(
        task_id: impl Into<String>,
        branch: impl Into<String>,
        pull_request: Option<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: task_id.into(),
            branch: branch.into(),
            pull_request,
            agent_id: agent_id.into(),
            retry_count: 0,
            enqueued_at: Utc::now(),
        }
    }

    /// Copy for a tail requeue after an integrate failure.
    pub fn requeued(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            enqueued_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// How the worker disposed of one merge request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// Integrated; commit is the new mainline tip.
    Merged { commit: String },
    /// The dry-run probe reported textual conflicts; merge dropped.
    Conflict { files: Vec<String> },
    /// A required quality check failed; merge dropped.
    TestsFailed { check: String, output: String },
    /// Integrate failed with retries left; requeued at the tail.
    Requeued { retry_count: u32 },
    /// Integrate failed with retries exhausted; manual intervention needed.
    Failed { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requeue_increments_retry() {
        let req = MergeRequest::new("t1", "agent-1/task-t1", None, "agent-1");
        assert_eq!(req.retry_count, 0);
        let again = req.requeued();
        assert_eq!(again.retry_count, 1);
        assert_eq!(again.task_id, req.task_id);
        assert_eq!(again.id, req.id);
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = MergeOutcome::Conflict { files: vec!["src/lib.rs".into()] };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"outcome\":\"conflict\""));
        assert!(json.contains("src/lib.rs"));
    }
}
