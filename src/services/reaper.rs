//! Dead-agent reaper.
//!
//! Sweeps heartbeats at a fixed interval. Agents whose last heartbeat is
//! older than `agent_timeout` are marked dead; their claim locks are
//! force-released and their in-progress tasks reset to pending. The reaper
//! is the only writer authorized to unlock and reset a task, and the only
//! cancellation authority for claims.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AgentState, TaskStatus};
use crate::domain::ports::AuditEntry;
use crate::services::context::CoordinatorContext;
use crate::services::phase_scheduler::PhaseScheduler;

const WRITER: &str = "reaper";

/// Heartbeat sweeper and orphan-lock reclaimer.
pub struct Reaper {
    ctx: Arc<CoordinatorContext>,
    scheduler: PhaseScheduler,
}

impl Reaper {
    pub fn new(ctx: Arc<CoordinatorContext>) -> Self {
        let scheduler = PhaseScheduler::new(ctx.clone());
        Self { ctx, scheduler }
    }

    /// Sweep until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.ctx.config.timeouts.reaper_interval();
        info!(interval_secs = interval.as_secs(), "reaper started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                () = tokio::time::sleep(interval) => {
                    if let Err(e) = self.sweep().await {
                        warn!(error = %e, "reaper sweep failed");
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }
        }
        info!("reaper stopped");
    }

    /// One sweep. Returns the number of tasks reset to pending.
    pub async fn sweep(&self) -> DomainResult<u32> {
        let timeout = ChronoDuration::from_std(self.ctx.config.timeouts.agent_timeout())
            .map_err(|e| DomainError::ValidationFailed(format!("invalid agent timeout: {e}")))?;
        let now = Utc::now();

        let mut reset = 0;
        for mut agent in self.ctx.agents.list().await? {
            if agent.state == AgentState::Dead || !agent.is_stale(timeout, now) {
                continue;
            }

            warn!(
                agent_id = %agent.id,
                last_heartbeat = %agent.last_heartbeat,
                "agent heartbeat expired; marking dead"
            );

            if let Some(task_id) = agent.current_task.clone() {
                self.ctx.locks.force_release(&task_id).await?;

                if let Some(mut task) = self.ctx.tasks.get(&task_id).await? {
                    if task.status == TaskStatus::InProgress
                        && task.assigned_agent.as_deref() == Some(agent.id.as_str())
                    {
                        task.force_status(TaskStatus::Pending, "agent heartbeat expired");
                        task.assigned_agent = None;
                        task.claimed_at = None;
                        self.ctx.tasks.update(&task).await?;
                        self.ctx
                            .audit
                            .record(
                                &AuditEntry::task(&task.id, "in_progress -> pending", WRITER)
                                    .with_detail(format!("reclaimed from dead agent {}", agent.id)),
                            )
                            .await?;
                        info!(task_id = %task.id, agent_id = %agent.id, "task reclaimed");
                        reset += 1;
                    }
                }
            }

            agent.state = AgentState::Dead;
            agent.current_task = None;
            self.ctx.agents.update(&agent).await?;
        }

        // A reset task cannot complete a phase, but the re-evaluation keeps
        // the scheduler live after failures that raced the sweep.
        if reset > 0 {
            self.scheduler.on_task_terminal().await?;
        }
        Ok(reset)
    }
}
