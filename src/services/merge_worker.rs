//! Sequential merge worker.
//!
//! A single consumer of the merge FIFO. At most one merge is in flight;
//! enqueue order is preserved; phase advancement only observes a task
//! after this worker writes `merged`. Per request:
//!
//! 1. refresh the mainline, 2. dry-run conflict probe, 3. quality gate on
//! the candidate branch, 4. integrate (hosted PR squash-merge in remote
//! mode, local squash-merge otherwise), 5. branch cleanup, 6. terminal
//! status commit and notifications.
//!
//! Conflicts and test failures drop the merge without consuming a retry;
//! the owning agent is notified and a later completion re-enqueues.
//! Integrate failures retry up to the configured bound, then fail the
//! task. A failing step drops only that merge; the worker never panics.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    MergeOutcome, MergeRequest, Notification, NotificationKind, Task, TaskStatus,
};
use crate::domain::ports::AuditEntry;
use crate::infrastructure::git::{GitRepo, ProbeResult};
use crate::infrastructure::process::run_with_timeout;
use crate::services::context::CoordinatorContext;
use crate::services::phase_scheduler::PhaseScheduler;
use crate::services::quality_gates::QualityGates;

const WRITER: &str = "merge_worker";

/// Blocking-pop bound; enqueues are observed promptly via the queue's
/// notify, this is the fallback poll.
const POP_TIMEOUT: Duration = Duration::from_secs(5);

/// The single sequential merge consumer.
pub struct MergeWorker {
    ctx: Arc<CoordinatorContext>,
    scheduler: PhaseScheduler,
    git: GitRepo,
}

impl MergeWorker {
    pub fn new(ctx: Arc<CoordinatorContext>) -> Self {
        let scheduler = PhaseScheduler::new(ctx.clone());
        let git = GitRepo::new(
            ctx.config.repo_path.clone(),
            ctx.config.timeouts.merge_step_timeout(),
        );
        Self { ctx, scheduler, git }
    }

    /// Consume the FIFO until shutdown. Every failure is contained to the
    /// request that caused it.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("merge worker started");
        if let Err(e) = self.recover().await {
            warn!(error = %e, "active-merge recovery failed");
        }
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                popped = self.ctx.merge_queue.pop_blocking(POP_TIMEOUT) => match popped {
                    Ok(Some(request)) => {
                        let task_id = request.task_id.clone();
                        if let Err(e) = self.process(request).await {
                            error!(task_id, error = %e, "merge processing failed; request dropped");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "merge queue pop failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                },
            }
        }
        info!("merge worker stopped");
    }

    /// Re-enqueue any request a previous worker left mid-integration.
    pub async fn recover(&self) -> DomainResult<u32> {
        let stale = self.ctx.merge_queue.take_stale_active().await?;
        let count = stale.len() as u32;
        for request in stale {
            warn!(task_id = %request.task_id, "recovering merge left in flight by a previous worker");
            self.ctx.merge_queue.enqueue(&request).await?;
        }
        Ok(count)
    }

    /// Process one request through the step table. The active-merge record
    /// brackets the work so a crash mid-merge is recoverable.
    pub async fn process(&self, request: MergeRequest) -> DomainResult<MergeOutcome> {
        self.ctx.merge_queue.mark_active(&request).await?;
        let result = self.process_inner(&request).await;
        self.ctx.merge_queue.clear_active(&request.task_id).await?;
        result
    }

    async fn process_inner(&self, request: &MergeRequest) -> DomainResult<MergeOutcome> {
        let Some(task) = self.ctx.tasks.get(&request.task_id).await? else {
            warn!(task_id = %request.task_id, "merge request for unknown task dropped");
            return Ok(MergeOutcome::Failed { reason: "unknown task".to_string() });
        };
        if !matches!(task.status, TaskStatus::Done | TaskStatus::MergeFailed) {
            warn!(
                task_id = %task.id,
                status = task.status.as_str(),
                "merge request for task not awaiting integration dropped"
            );
            return Ok(MergeOutcome::Failed { reason: "task not awaiting integration".to_string() });
        }

        // Step 1: refresh mainline.
        let main = self.ctx.config.git.main_branch.clone();
        self.git.checkout(&main).await?;
        if self.ctx.config.git.push_to_remote {
            self.git.pull_ff("origin", &main).await?;
        }
        let mainline_tip = self.git.rev_parse("HEAD").await?;
        info!(task_id = %task.id, branch = %request.branch, mainline_tip, "merge started");

        // Step 2: conflict probe.
        if let ProbeResult::Conflicts(files) = self.git.merge_probe(&request.branch).await? {
            return self.handle_conflict(task, request, files).await;
        }

        // Step 3: quality gate on the candidate branch.
        self.git.checkout(&request.branch).await?;
        let gates = QualityGates::resolve(&self.ctx.config, self.git.root());
        let gate_result = gates.run(self.git.root()).await;
        self.git.checkout(&main).await?;
        let report = gate_result?;
        if let Some(failure) = report.first_required_failure() {
            let check = failure.name.clone();
            let output = failure.output.diagnostic();
            return self.handle_test_failure(task, request, check, output).await;
        }

        // Step 4: integrate.
        let commit = match self.integrate(request, &main).await {
            Ok(commit) => commit,
            Err(e) => return self.handle_integrate_failure(task, request, &e.to_string()).await,
        };

        // Step 5: cleanup, best-effort.
        self.git.delete_branch(&request.branch).await?;
        if self.ctx.config.git.push_to_remote {
            self.git.push_delete("origin", &request.branch).await?;
        }

        // Step 6: terminal status, notification, phase re-check.
        self.finish_merged(task, request, commit).await
    }

    async fn integrate(&self, request: &MergeRequest, main: &str) -> DomainResult<String> {
        if self.ctx.config.git.push_to_remote {
            if let Some(pr) = &request.pull_request {
                let argv: Vec<String> =
                    ["gh", "pr", "merge", pr.as_str(), "--squash", "--delete-branch"]
                        .iter()
                        .map(|s| (*s).to_string())
                        .collect();
                let output = run_with_timeout(
                    &argv,
                    self.git.root(),
                    self.ctx.config.timeouts.merge_step_timeout(),
                )
                .await?;
                if !output.success() {
                    return Err(DomainError::Git(format!(
                        "pull-request merge failed: {}",
                        output.diagnostic()
                    )));
                }
                self.git.pull_ff("origin", main).await?;
                return self.git.rev_parse("HEAD").await;
            }
        }
        self.git.squash_merge(&request.branch).await
    }

    async fn handle_conflict(
        &self,
        mut task: Task,
        request: &MergeRequest,
        files: Vec<String>,
    ) -> DomainResult<MergeOutcome> {
        let from = task.status;
        task.transition_to(TaskStatus::Conflict)
            .map_err(DomainError::ValidationFailed)?;
        self.ctx.tasks.update(&task).await?;

        self.ctx
            .bus
            .publish(Notification::new(
                &request.agent_id,
                Some(task.id.clone()),
                NotificationKind::ConflictDetected,
                json!({ "branch": request.branch.clone(), "files": files.clone() }),
            ))
            .await?;
        self.ctx
            .audit
            .record(
                &AuditEntry::task(&task.id, format!("{} -> conflict", from.as_str()), WRITER)
                    .with_detail(format!("conflicts in {}", files.join(", "))),
            )
            .await?;
        warn!(task_id = %task.id, ?files, "merge conflict; agent notified");
        Ok(MergeOutcome::Conflict { files })
    }

    async fn handle_test_failure(
        &self,
        mut task: Task,
        request: &MergeRequest,
        check: String,
        output: String,
    ) -> DomainResult<MergeOutcome> {
        let from = task.status;
        task.transition_to(TaskStatus::TestFailed)
            .map_err(DomainError::ValidationFailed)?;
        self.ctx.tasks.update(&task).await?;

        self.ctx
            .bus
            .publish(Notification::new(
                &request.agent_id,
                Some(task.id.clone()),
                NotificationKind::TestsFailed,
                json!({
                    "branch": request.branch.clone(),
                    "check": check.clone(),
                    "output": output.clone(),
                }),
            ))
            .await?;
        self.ctx
            .audit
            .record(
                &AuditEntry::task(&task.id, format!("{} -> test_failed", from.as_str()), WRITER)
                    .with_detail(format!("check '{check}' failed")),
            )
            .await?;
        warn!(task_id = %task.id, check, "quality gate failed; agent notified");
        Ok(MergeOutcome::TestsFailed { check, output })
    }

    async fn handle_integrate_failure(
        &self,
        mut task: Task,
        request: &MergeRequest,
        reason: &str,
    ) -> DomainResult<MergeOutcome> {
        let retry_count = request.retry_count + 1;
        let max_retries = self.ctx.config.advanced.max_retries;
        let from = task.status;

        task.retry_count = retry_count;
        if from == TaskStatus::Done {
            task.transition_to(TaskStatus::MergeFailed)
                .map_err(DomainError::ValidationFailed)?;
        }

        if retry_count < max_retries {
            self.ctx.tasks.update(&task).await?;
            self.ctx.merge_queue.enqueue(&request.requeued()).await?;
            self.ctx
                .audit
                .record(
                    &AuditEntry::task(&task.id, format!("{} -> merge_failed", from.as_str()), WRITER)
                        .with_detail(format!("retry {retry_count}/{max_retries}: {reason}")),
                )
                .await?;
            warn!(task_id = %task.id, retry_count, "merge failed; requeued at tail");
            return Ok(MergeOutcome::Requeued { retry_count });
        }

        task.transition_to(TaskStatus::Failed)
            .map_err(DomainError::ValidationFailed)?;
        self.ctx.tasks.update(&task).await?;

        self.ctx
            .bus
            .publish(Notification::new(
                &request.agent_id,
                Some(task.id.clone()),
                NotificationKind::MergeFailed,
                json!({ "branch": request.branch.clone(), "reason": reason, "retries": retry_count }),
            ))
            .await?;
        self.ctx
            .audit
            .record(
                &AuditEntry::task(&task.id, "merge_failed -> failed", WRITER)
                    .with_detail(format!("retries exhausted: {reason}")),
            )
            .await?;
        error!(task_id = %task.id, reason, "merge retries exhausted; manual intervention required");
        self.scheduler.on_task_terminal().await?;
        Ok(MergeOutcome::Failed { reason: reason.to_string() })
    }

    async fn finish_merged(
        &self,
        mut task: Task,
        request: &MergeRequest,
        commit: String,
    ) -> DomainResult<MergeOutcome> {
        let from = task.status;
        task.transition_to(TaskStatus::Merged)
            .map_err(DomainError::ValidationFailed)?;
        self.ctx.tasks.update(&task).await?;

        self.ctx
            .bus
            .publish(Notification::new(
                &request.agent_id,
                Some(task.id.clone()),
                NotificationKind::MergeSuccess,
                json!({ "branch": request.branch.clone(), "commit": commit.clone() }),
            ))
            .await?;
        self.ctx
            .audit
            .record(
                &AuditEntry::task(&task.id, format!("{} -> merged", from.as_str()), WRITER)
                    .with_detail(format!("commit {commit}")),
            )
            .await?;
        info!(task_id = %task.id, commit, "merged");

        self.scheduler.on_task_terminal().await?;
        Ok(MergeOutcome::Merged { commit })
    }
}
