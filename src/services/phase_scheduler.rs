//! Phase scheduler.
//!
//! Runs after every task reaches a terminal status. Completes the active
//! phase once all of its tasks are terminal ({merged, failed, blocked}),
//! activates the next one, and broadcasts a wakeup so idle agents claim
//! without waiting out a poll interval. When no phases remain, the backlog
//! is complete and a terminal event is published.

use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Notification, NotificationKind, PhaseStatus};
use crate::domain::ports::AuditEntry;
use crate::services::context::CoordinatorContext;

/// Terminal-state detection and phase advancement.
#[derive(Clone)]
pub struct PhaseScheduler {
    ctx: Arc<CoordinatorContext>,
}

impl PhaseScheduler {
    pub fn new(ctx: Arc<CoordinatorContext>) -> Self {
        Self { ctx }
    }

    /// Re-evaluate the active phase. Idempotent; safe to call after any
    /// status write.
    pub async fn on_task_terminal(&self) -> DomainResult<()> {
        let Some(mut phase) = self.ctx.phases.active().await? else {
            return Ok(());
        };

        let tasks = self.ctx.tasks.get_many(&phase.task_ids).await?;
        if tasks.len() < phase.task_ids.len() || !tasks.iter().all(|t| t.is_terminal()) {
            return Ok(());
        }

        phase.complete();
        self.ctx.phases.update(&phase).await?;
        self.ctx
            .audit
            .record(&AuditEntry::phase(phase.index, "completed", "coordinator"))
            .await?;
        info!(phase = phase.index, "phase completed");

        match self.ctx.phases.get(phase.index + 1).await? {
            Some(mut next) => {
                next.activate();
                self.ctx.phases.update(&next).await?;
                self.ctx
                    .audit
                    .record(&AuditEntry::phase(next.index, "activated", "coordinator"))
                    .await?;
                self.ctx
                    .bus
                    .publish(Notification::broadcast(
                        NotificationKind::PhaseActivated,
                        json!({ "phase": next.index, "tasks": next.task_ids.clone() }),
                    ))
                    .await?;
                info!(phase = next.index, "phase activated");
            }
            None => {
                self.ctx
                    .audit
                    .record(&AuditEntry::phase(phase.index, "backlog_complete", "coordinator"))
                    .await?;
                self.ctx
                    .bus
                    .publish(Notification::broadcast(
                        NotificationKind::BacklogComplete,
                        json!({ "final_phase": phase.index }),
                    ))
                    .await?;
                info!("backlog complete");
            }
        }

        Ok(())
    }

    /// Whether every phase has completed.
    pub async fn backlog_complete(&self) -> DomainResult<bool> {
        let phases = self.ctx.phases.list().await?;
        Ok(!phases.is_empty() && phases.iter().all(|p| p.status == PhaseStatus::Completed))
    }
}
