//! Agent runtime.
//!
//! A long-lived process owning exactly one logical agent id. Registers
//! once, heartbeats in the background, and loops: drain notifications,
//! run fix workflows for owned tasks, claim, execute. Execution prepares a
//! per-task branch and workspace briefs, waits for the external
//! implementer's commit, runs the local quality gates, publishes the
//! branch, and signals completion. The runtime never writes task state
//! directly; everything goes through the coordinator API.

use console::style;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::agent::client::{ClientError, ClientResult, CoordinatorClient};
use crate::agent::workspace;
use crate::domain::models::{Config, Notification, NotificationKind, Task};
use crate::infrastructure::git::{GitRepo, ProbeResult};
use crate::infrastructure::process::run_with_timeout;
use crate::services::coordinator::CompletionOutcome;
use crate::services::quality_gates::QualityGates;

/// One logical agent.
pub struct AgentRuntime {
    client: CoordinatorClient,
    config: Config,
    workdir: PathBuf,
    git: GitRepo,
    agent_id: String,
}

/// Why the fix loop was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FixReason {
    Conflict,
    TestsFailed,
}

impl AgentRuntime {
    /// Register with the coordinator and build the runtime.
    pub async fn register(
        config: Config,
        workdir: PathBuf,
        preferred_id: Option<String>,
    ) -> ClientResult<Self> {
        let client = CoordinatorClient::new(config.coordinator.base_url());
        let agent_id = client
            .register(preferred_id, vec!["git".to_string()])
            .await?;
        let git = GitRepo::new(workdir.clone(), config.timeouts.merge_step_timeout());
        println!(
            "{} registered as {}",
            style("drover agent").bold().cyan(),
            style(&agent_id).bold()
        );
        Ok(Self { client, config, workdir, git, agent_id })
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Claim loop. Returns once the backlog completes.
    pub async fn run(&self) -> anyhow::Result<()> {
        let heartbeat = self.spawn_heartbeat();

        // Late-subscriber drain: events published before this process
        // started are still in the pending queue.
        let result = self.main_loop().await;

        heartbeat.abort();
        result
    }

    fn spawn_heartbeat(&self) -> tokio::task::JoinHandle<()> {
        let client = self.client.clone();
        let agent_id = self.agent_id.clone();
        let interval = self.config.timeouts.heartbeat_interval();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(e) = client.heartbeat(&agent_id).await {
                    warn!(error = %e, "heartbeat failed");
                }
            }
        })
    }

    async fn main_loop(&self) -> anyhow::Result<()> {
        loop {
            // A coordinator restart or a transient state-store failure
            // (503) is survivable: back off one claim_wait and retry.
            let pending = match self.client.notifications(&self.agent_id).await {
                Ok(pending) => pending,
                Err(e) if recoverable(&e) => {
                    warn!(error = %e, "coordinator unavailable; backing off");
                    tokio::time::sleep(self.config.timeouts.claim_wait()).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            for notification in pending {
                match notification.kind {
                    NotificationKind::ConflictDetected => {
                        self.fix_workflow(&notification, FixReason::Conflict).await?;
                    }
                    NotificationKind::TestsFailed => {
                        self.fix_workflow(&notification, FixReason::TestsFailed).await?;
                    }
                    NotificationKind::MergeSuccess => {
                        if let Some(task_id) = &notification.task_id {
                            self.banner(&format!("task {task_id} merged"));
                        }
                    }
                    NotificationKind::MergeFailed => {
                        if let Some(task_id) = &notification.task_id {
                            self.banner(&format!(
                                "task {task_id} failed to merge; manual intervention required"
                            ));
                        }
                    }
                    NotificationKind::PhaseActivated | NotificationKind::BacklogComplete => {}
                }
            }

            match self.client.status().await {
                Ok(report) if report.backlog_complete => {
                    self.banner("backlog complete; agent exiting");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) if recoverable(&e) => {
                    warn!(error = %e, "status check failed; backing off");
                    tokio::time::sleep(self.config.timeouts.claim_wait()).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            match self.client.claim(&self.agent_id).await {
                Ok(Some(task)) => self.execute_task(task).await?,
                Ok(None) => tokio::time::sleep(self.config.timeouts.claim_wait()).await,
                Err(e) if recoverable(&e) => {
                    warn!(error = %e, "claim failed; backing off");
                    tokio::time::sleep(self.config.timeouts.claim_wait()).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Execute one claimed task end to end.
    async fn execute_task(&self, task: Task) -> anyhow::Result<()> {
        let role = task.kind.role();
        let branch = self.config.git.branch_for(&self.agent_id, &task.id);
        self.banner(&format!("claimed {} [{}] as {role}", task.id, task.title));

        if let Err(reason) = self.check_preconditions().await {
            warn!(task_id = %task.id, reason, "precondition failed");
            self.report(&task.id, CompletionOutcome::Failure, None, None, Some(reason)).await?;
            return Ok(());
        }

        // Branch off the refreshed mainline.
        let main = &self.config.git.main_branch;
        self.git.checkout(main).await?;
        if self.config.git.push_to_remote {
            self.git.pull_ff("origin", main).await?;
        }
        self.git.checkout_new(&branch).await?;

        workspace::write_task_files(&self.workdir, &task, role, &branch)?;
        let baseline = self.git.rev_parse("HEAD").await?;
        self.banner(&format!("waiting for implementation on {branch}"));

        let tip = self
            .wait_for_commit(&branch, &baseline, self.config.timeouts.impl_timeout())
            .await?;
        workspace::remove_task_files(&self.workdir);

        let Some(tip) = tip else {
            self.banner(&format!("implementation timed out on {branch}"));
            self.report(
                &task.id,
                CompletionOutcome::Failure,
                Some(branch),
                None,
                Some("implementation wait timed out".to_string()),
            )
            .await?;
            return Ok(());
        };
        info!(task_id = %task.id, tip, "implementation commit observed");

        // Local quality gates before publishing.
        let gates = QualityGates::resolve(&self.config, &self.workdir);
        let report = gates.run(&self.workdir).await?;
        if let Some(failure) = report.first_required_failure() {
            let check_name = failure.name.clone();
            let synthetic = Notification::new(
                &self.agent_id,
                Some(task.id.clone()),
                NotificationKind::TestsFailed,
                serde_json::json!({
                    "branch": branch.clone(),
                    "check": check_name.clone(),
                    "output": failure.output.diagnostic(),
                }),
            );
            // Same workflow as a post-completion test failure, before the
            // task was ever signalled done.
            if !self.run_fix_iterations(&synthetic, FixReason::TestsFailed, &branch).await? {
                self.report(
                    &task.id,
                    CompletionOutcome::Failure,
                    Some(branch),
                    None,
                    Some(format!("required check '{check_name}' kept failing")),
                )
                .await?;
                return Ok(());
            }
        }

        let pull_request = match self.publish(&task, &branch).await {
            Ok(pr) => pr,
            Err(reason) => {
                self.report(
                    &task.id,
                    CompletionOutcome::Failure,
                    Some(branch),
                    None,
                    Some(reason),
                )
                .await?;
                return Ok(());
            }
        };

        self.banner(&format!("completed {}; signalling coordinator", task.id));
        self.report(&task.id, CompletionOutcome::Success, Some(branch), pull_request, None)
            .await?;
        Ok(())
    }

    /// Verify the environment supports the configured modes. Returns a
    /// structured reason on failure.
    async fn check_preconditions(&self) -> Result<(), String> {
        if self.config.git.push_to_remote {
            match self.git.remote_exists("origin").await {
                Ok(true) => {}
                Ok(false) => return Err("push_to_remote is set but remote 'origin' does not resolve".to_string()),
                Err(e) => return Err(format!("git remote check failed: {e}")),
            }
        }
        if self.config.git.auto_pr {
            let argv: Vec<String> =
                ["gh", "auth", "status"].iter().map(|s| (*s).to_string()).collect();
            match run_with_timeout(&argv, &self.workdir, Duration::from_secs(30)).await {
                Ok(output) if output.success() => {}
                Ok(output) => {
                    return Err(format!(
                        "auto_pr is set but the PR CLI is not authenticated: {}",
                        output.diagnostic()
                    ))
                }
                Err(e) => return Err(format!("auto_pr is set but the PR CLI is unavailable: {e}")),
            }
        }
        Ok(())
    }

    /// Poll the branch head until it advances past `baseline` or the
    /// timeout fires. Heartbeats ride on every tick.
    async fn wait_for_commit(
        &self,
        branch: &str,
        baseline: &str,
        timeout: Duration,
    ) -> anyhow::Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        let poll = self.config.timeouts.impl_poll();

        loop {
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(poll).await;

            if let Err(e) = self.client.heartbeat(&self.agent_id).await {
                warn!(error = %e, "heartbeat failed during implementation wait");
            }

            match self.git.branch_tip(branch).await? {
                Some(tip) if tip != baseline => return Ok(Some(tip)),
                _ => {}
            }
        }
    }

    /// Push and optionally open a PR. Returns the PR handle, if created.
    async fn publish(&self, task: &Task, branch: &str) -> Result<Option<String>, String> {
        if !self.config.git.push_to_remote {
            return Ok(None);
        }

        self.git
            .push("origin", branch, false)
            .await
            .map_err(|e| format!("push failed: {e}"))?;

        if !self.config.git.auto_pr {
            return Ok(None);
        }

        let argv: Vec<String> = [
            "gh",
            "pr",
            "create",
            "--title",
            &task.title,
            "--body",
            &format!("Automated implementation of task {}", task.id),
            "--head",
            branch,
            "--base",
            &self.config.git.main_branch,
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect();

        let output = run_with_timeout(&argv, &self.workdir, Duration::from_secs(120))
            .await
            .map_err(|e| format!("PR creation failed: {e}"))?;
        if !output.success() {
            return Err(format!("PR creation failed: {}", output.diagnostic()));
        }
        Ok(Some(output.stdout.trim().to_string()))
    }

    /// Fix workflow entry for a coordinator notification about an owned
    /// task. Exhausting iterations reports a terminal failure.
    async fn fix_workflow(
        &self,
        notification: &Notification,
        reason: FixReason,
    ) -> anyhow::Result<()> {
        let Some(task_id) = notification.task_id.clone() else {
            return Ok(());
        };
        let branch = notification.data["branch"]
            .as_str()
            .map(String::from)
            .unwrap_or_else(|| self.config.git.branch_for(&self.agent_id, &task_id));

        self.banner(&format!(
            "fix required for {task_id}: {}",
            notification.kind.as_str()
        ));

        if self.run_fix_iterations(notification, reason, &branch).await? {
            self.report(&task_id, CompletionOutcome::Success, Some(branch), None, None).await?;
        } else {
            self.report(
                &task_id,
                CompletionOutcome::Failure,
                Some(branch),
                None,
                Some("fix iterations exhausted".to_string()),
            )
            .await?;
        }
        Ok(())
    }

    /// Bounded fix iterations: write the brief, wait for a fix commit,
    /// verify (re-run checks, or rebase for conflicts), push. True when the
    /// branch is good again.
    async fn run_fix_iterations(
        &self,
        notification: &Notification,
        reason: FixReason,
        branch: &str,
    ) -> anyhow::Result<bool> {
        let max_iterations = self.config.advanced.max_fix_iterations;
        let mut current = notification.clone();

        self.git.checkout(branch).await?;

        for iteration in 1..=max_iterations {
            workspace::write_fix_brief(&self.workdir, &current, branch, iteration, max_iterations)?;
            let baseline = self.git.rev_parse("HEAD").await?;

            let tip = self
                .wait_for_commit(branch, &baseline, self.config.timeouts.fix_timeout())
                .await?;
            workspace::remove_fix_files(&self.workdir);

            if tip.is_none() {
                warn!(branch, iteration, "fix wait timed out");
                continue;
            }

            match reason {
                FixReason::TestsFailed => {
                    let gates = QualityGates::resolve(&self.config, &self.workdir);
                    let report = gates.run(&self.workdir).await?;
                    match report.first_required_failure() {
                        None => {
                            if self.config.git.push_to_remote {
                                if let Err(e) = self.git.push("origin", branch, true).await {
                                    warn!(error = %e, "re-push failed");
                                    continue;
                                }
                            }
                            self.banner(&format!("checks pass again on {branch}"));
                            return Ok(true);
                        }
                        Some(failure) => {
                            current = Notification::new(
                                &current.agent_id,
                                current.task_id.clone(),
                                NotificationKind::TestsFailed,
                                serde_json::json!({
                                    "branch": branch,
                                    "check": failure.name.clone(),
                                    "output": failure.output.diagnostic(),
                                }),
                            );
                        }
                    }
                }
                FixReason::Conflict => {
                    match self.rebase_on_mainline(branch).await? {
                        ProbeResult::Clean => {
                            if self.config.git.push_to_remote {
                                if let Err(e) = self.git.push("origin", branch, true).await {
                                    warn!(error = %e, "force-with-lease push failed");
                                    continue;
                                }
                            }
                            self.banner(&format!("{branch} rebased cleanly on mainline"));
                            return Ok(true);
                        }
                        ProbeResult::Conflicts(files) => {
                            current = Notification::new(
                                &current.agent_id,
                                current.task_id.clone(),
                                NotificationKind::ConflictDetected,
                                serde_json::json!({ "branch": branch, "files": files }),
                            );
                        }
                    }
                }
            }
        }

        Ok(false)
    }

    async fn rebase_on_mainline(&self, branch: &str) -> anyhow::Result<ProbeResult> {
        let main = &self.config.git.main_branch;
        if self.config.git.push_to_remote {
            self.git.checkout(main).await?;
            self.git.pull_ff("origin", main).await?;
            self.git.checkout(branch).await?;
        }
        Ok(self.git.rebase(main).await?)
    }

    /// Signal completion. A rejection (stale notification, lock already
    /// released) is logged, not fatal; the coordinator's view wins.
    async fn report(
        &self,
        task_id: &str,
        outcome: CompletionOutcome,
        branch: Option<String>,
        pull_request: Option<String>,
        reason: Option<String>,
    ) -> anyhow::Result<()> {
        match self
            .client
            .complete(&self.agent_id, task_id, outcome, branch, pull_request, reason)
            .await
        {
            Ok(()) => Ok(()),
            Err(e @ ClientError::Api { .. }) => {
                warn!(task_id, error = %e, "coordinator rejected completion signal");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn banner(&self, message: &str) {
        println!(
            "{} {} {}",
            style("drover").dim(),
            style(&self.agent_id).cyan(),
            message
        );
    }
}

/// Coordinator hiccups an agent should ride out rather than die on.
fn recoverable(error: &ClientError) -> bool {
    matches!(error, ClientError::Http(_)) || error.is_transient()
}
