//! Coordinator service: registration, heartbeats, the atomic claim
//! algorithm, completion handling, and the status snapshot.
//!
//! Claims are serialized by the lock primitive, not by in-process mutexes:
//! candidates are ordered (priority, then id), and the first successful
//! set-if-absent lease wins. The coordinator is the only writer for
//! transitions into `in_progress`, `done`, `failed`-on-complete and
//! `blocked`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Agent, AgentState, MergeRequest, Task, TaskStatus,
};
use crate::domain::ports::AuditEntry;
use crate::services::context::CoordinatorContext;
use crate::services::phase_scheduler::PhaseScheduler;

const WRITER: &str = "coordinator";

/// Reported outcome of a task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionOutcome {
    Success,
    Failure,
}

/// Snapshot served by `GET /status` and the status CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    /// Active phase index, if any
    pub active_phase: Option<u32>,
    /// Total number of phases
    pub phase_count: usize,
    /// Task counts by status name
    pub task_counts: HashMap<String, u64>,
    /// Registered agents
    pub agents: Vec<Agent>,
    /// Merge queue depth
    pub queue_depth: u64,
    /// Whether every phase completed
    pub backlog_complete: bool,
}

/// Registration, heartbeat, claim, complete, and status.
#[derive(Clone)]
pub struct CoordinatorService {
    ctx: Arc<CoordinatorContext>,
    scheduler: PhaseScheduler,
}

impl CoordinatorService {
    pub fn new(ctx: Arc<CoordinatorContext>) -> Self {
        let scheduler = PhaseScheduler::new(ctx.clone());
        Self { ctx, scheduler }
    }

    /// Register a new agent. Reusing a live id is a conflict.
    pub async fn register(
        &self,
        preferred_id: Option<String>,
        capabilities: Vec<String>,
    ) -> DomainResult<Agent> {
        let agent = Agent::register(preferred_id, capabilities);
        self.ctx.agents.create(&agent).await?;
        info!(agent_id = %agent.id, "agent registered");
        Ok(agent)
    }

    /// Record a heartbeat.
    pub async fn heartbeat(&self, agent_id: &str) -> DomainResult<()> {
        if !self.ctx.agents.heartbeat(agent_id).await? {
            return Err(DomainError::AgentNotFound(agent_id.to_string()));
        }
        Ok(())
    }

    /// Claim the best available task from the active phase, or None when
    /// nothing is claimable.
    pub async fn claim(&self, agent_id: &str) -> DomainResult<Option<Task>> {
        let mut agent = self
            .ctx
            .agents
            .get(agent_id)
            .await?
            .ok_or_else(|| DomainError::AgentNotFound(agent_id.to_string()))?;

        let Some(phase) = self.ctx.phases.active().await? else {
            return Ok(None);
        };

        let tasks = self.ctx.tasks.get_many(&phase.task_ids).await?;
        let mut candidates: Vec<&Task> = Vec::new();
        let mut blocked_any = false;

        for task in &tasks {
            if task.status != TaskStatus::Pending {
                continue;
            }
            if !self.ctx.config.agent_assignment.enabled_for(task.kind) {
                continue;
            }

            let deps = self.ctx.tasks.get_many(&task.depends_on).await?;
            if let Some(failed) = deps.iter().find(|d| d.status == TaskStatus::Failed) {
                let mut blocked = task.clone();
                if blocked.block(&failed.id).is_ok() {
                    self.ctx.tasks.update(&blocked).await?;
                    self.ctx
                        .audit
                        .record(
                            &AuditEntry::task(&blocked.id, "pending -> blocked", WRITER)
                                .with_detail(format!("dependency {} failed", failed.id)),
                        )
                        .await?;
                    warn!(task_id = %blocked.id, dep = %failed.id, "task blocked by failed dependency");
                    blocked_any = true;
                }
                continue;
            }
            if !deps.iter().all(|d| d.status == TaskStatus::Merged) {
                continue;
            }
            candidates.push(task);
        }

        // Blocking a task may have completed the phase.
        if blocked_any {
            self.scheduler.on_task_terminal().await?;
        }

        candidates.sort_by_key(|t| (t.priority.sort_key(), t.id.clone()));

        let ttl = self.ctx.config.timeouts.task_lock_ttl();
        for candidate in candidates {
            if !self.ctx.locks.acquire(&candidate.id, agent_id, ttl).await? {
                continue; // contested; not an error
            }

            // Re-read under the lease; the listing above was a snapshot.
            let Some(mut task) = self.ctx.tasks.get(&candidate.id).await? else {
                let _ = self.ctx.locks.release(&candidate.id, agent_id).await;
                continue;
            };
            if task.status != TaskStatus::Pending {
                let _ = self.ctx.locks.release(&candidate.id, agent_id).await;
                continue;
            }

            task.transition_to(TaskStatus::InProgress)
                .map_err(DomainError::ValidationFailed)?;
            task.assigned_agent = Some(agent_id.to_string());
            self.ctx.tasks.update(&task).await?;

            agent.assign(&task.id);
            agent.beat();
            self.ctx.agents.update(&agent).await?;

            self.ctx
                .audit
                .record(
                    &AuditEntry::task(&task.id, "pending -> in_progress", WRITER)
                        .with_detail(format!("claimed by {agent_id}")),
                )
                .await?;
            info!(task_id = %task.id, agent_id, "task claimed");
            return Ok(Some(task));
        }

        Ok(None)
    }

    /// Handle a completion signal.
    ///
    /// A success enqueues a merge request; a failure is terminal for the
    /// task. The caller is validated against the task's assigned agent:
    /// the claim lease only serializes claim-time contention, and its
    /// expiry alone never disowns a live agent's work — only the reaper
    /// resets a task, clearing `assigned_agent` as it does.
    pub async fn complete(
        &self,
        agent_id: &str,
        task_id: &str,
        outcome: CompletionOutcome,
        branch: Option<String>,
        pull_request: Option<String>,
        reason: Option<String>,
    ) -> DomainResult<()> {
        let mut task = self
            .ctx
            .tasks
            .get(task_id)
            .await?
            .ok_or_else(|| DomainError::TaskNotFound(task_id.to_string()))?;

        match task.status {
            // An in-progress task may outlive its claim lease on long
            // implementations; the assignment is the authoritative signal,
            // exactly as the reaper's reset gate treats it.
            TaskStatus::InProgress => {
                if task.assigned_agent.as_deref() != Some(agent_id) {
                    return Err(DomainError::WrongAgent {
                        task: task_id.to_string(),
                        agent: agent_id.to_string(),
                    });
                }
            }
            TaskStatus::Conflict | TaskStatus::TestFailed => {
                if task.assigned_agent.as_deref() != Some(agent_id) {
                    return Err(DomainError::WrongAgent {
                        task: task_id.to_string(),
                        agent: agent_id.to_string(),
                    });
                }
            }
            other => {
                // Not completable: no live claim, or already terminal.
                return match self.ctx.locks.holder(task_id).await? {
                    Some(holder) if holder != agent_id => Err(DomainError::WrongAgent {
                        task: task_id.to_string(),
                        agent: agent_id.to_string(),
                    }),
                    Some(_) => Err(DomainError::InvalidStateTransition {
                        from: other.as_str().to_string(),
                        to: "done/failed".to_string(),
                    }),
                    None => Err(DomainError::LockNotHeld {
                        task: task_id.to_string(),
                        agent: agent_id.to_string(),
                    }),
                };
            }
        }

        let from = task.status;
        match outcome {
            CompletionOutcome::Success => {
                if let Some(branch) = branch.clone() {
                    task.branch = Some(branch);
                }
                if pull_request.is_some() {
                    task.pull_request = pull_request.clone();
                }
                let branch = task.branch.clone().ok_or_else(|| {
                    DomainError::ValidationFailed(format!(
                        "completion of task {task_id} carries no branch"
                    ))
                })?;

                task.transition_to(TaskStatus::Done)
                    .map_err(DomainError::ValidationFailed)?;
                self.ctx.tasks.update(&task).await?;
                self.ctx.locks.release(task_id, agent_id).await?;
                self.release_agent(agent_id).await?;

                let request =
                    MergeRequest::new(task_id, branch, task.pull_request.clone(), agent_id);
                self.ctx.merge_queue.enqueue(&request).await?;

                self.ctx
                    .audit
                    .record(
                        &AuditEntry::task(
                            task_id,
                            format!("{} -> done", from.as_str()),
                            WRITER,
                        )
                        .with_detail("merge enqueued"),
                    )
                    .await?;
                info!(task_id, agent_id, "task done; merge enqueued");
            }
            CompletionOutcome::Failure => {
                // A failure from conflict/test_failed means the fix loop
                // exhausted; that path is not in the transition table.
                if from == TaskStatus::InProgress {
                    task.transition_to(TaskStatus::Failed)
                        .map_err(DomainError::ValidationFailed)?;
                } else {
                    task.force_status(TaskStatus::Failed, "fix loop exhausted");
                }
                self.ctx.tasks.update(&task).await?;
                self.ctx.locks.release(task_id, agent_id).await?;
                self.release_agent(agent_id).await?;

                self.ctx
                    .audit
                    .record(
                        &AuditEntry::task(task_id, format!("{} -> failed", from.as_str()), WRITER)
                            .with_detail(reason.unwrap_or_else(|| "execution failed".to_string())),
                    )
                    .await?;
                warn!(task_id, agent_id, "task failed");
                self.scheduler.on_task_terminal().await?;
            }
        }

        Ok(())
    }

    /// Status snapshot for operators and agents.
    pub async fn status(&self) -> DomainResult<StatusReport> {
        let phases = self.ctx.phases.list().await?;
        let active_phase = self.ctx.phases.active().await?.map(|p| p.index);
        let counts = self.ctx.tasks.count_by_status().await?;
        let agents = self.ctx.agents.list().await?;
        let queue_depth = self.ctx.merge_queue.len().await?;
        let backlog_complete = self.scheduler.backlog_complete().await?;

        Ok(StatusReport {
            active_phase,
            phase_count: phases.len(),
            task_counts: counts
                .into_iter()
                .map(|(status, count)| (status.as_str().to_string(), count))
                .collect(),
            agents,
            queue_depth,
            backlog_complete,
        })
    }

    async fn release_agent(&self, agent_id: &str) -> DomainResult<()> {
        if let Some(mut agent) = self.ctx.agents.get(agent_id).await? {
            if agent.state != AgentState::Dead {
                agent.release();
                agent.beat();
                self.ctx.agents.update(&agent).await?;
            }
        }
        Ok(())
    }
}
