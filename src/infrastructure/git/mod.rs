//! Git subprocess wrapper.
//!
//! All repository operations the coordinator and agents need, as explicit
//! argv invocations bounded by a per-step timeout. Branch names are
//! validated against git ref rules before they reach a command line.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::infrastructure::process::{run_with_timeout, CommandOutput};

/// Result of a dry-run merge probe or a rebase attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// Applies cleanly.
    Clean,
    /// Textual conflicts in the listed files.
    Conflicts(Vec<String>),
}

/// Handle on one working tree.
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
    step_timeout: Duration,
}

impl GitRepo {
    pub fn new(root: impl Into<PathBuf>, step_timeout: Duration) -> Self {
        Self { root: root.into(), step_timeout }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn run(&self, args: &[&str]) -> DomainResult<CommandOutput> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push("git".to_string());
        argv.extend(args.iter().map(|s| (*s).to_string()));
        debug!(workdir = %self.root.display(), command = ?args, "git");
        run_with_timeout(&argv, &self.root, self.step_timeout).await
    }

    /// Run and require exit 0.
    async fn run_ok(&self, args: &[&str]) -> DomainResult<CommandOutput> {
        let output = self.run(args).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(DomainError::Git(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or(""),
                output.diagnostic()
            )))
        }
    }

    /// Whether `root` is inside a git work tree.
    pub async fn is_work_tree(&self) -> DomainResult<bool> {
        Ok(self.run(&["rev-parse", "--is-inside-work-tree"]).await?.success())
    }

    /// Whether the named remote resolves.
    pub async fn remote_exists(&self, name: &str) -> DomainResult<bool> {
        Ok(self.run(&["remote", "get-url", name]).await?.success())
    }

    pub async fn checkout(&self, branch: &str) -> DomainResult<()> {
        validate_branch_name(branch)?;
        self.run_ok(&["checkout", branch]).await?;
        Ok(())
    }

    /// Create and check out a branch; falls back to plain checkout when the
    /// branch already exists (the fix loop reuses branch names).
    pub async fn checkout_new(&self, branch: &str) -> DomainResult<()> {
        validate_branch_name(branch)?;
        let created = self.run(&["checkout", "-b", branch]).await?;
        if created.success() {
            return Ok(());
        }
        self.run_ok(&["checkout", branch]).await?;
        Ok(())
    }

    /// Fast-forward pull of `branch` from `remote`.
    pub async fn pull_ff(&self, remote: &str, branch: &str) -> DomainResult<()> {
        validate_branch_name(branch)?;
        self.run_ok(&["pull", "--ff-only", remote, branch]).await?;
        Ok(())
    }

    /// Resolve a ref to a commit id.
    pub async fn rev_parse(&self, reference: &str) -> DomainResult<String> {
        let output = self.run_ok(&["rev-parse", reference]).await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Tip of a branch, or None when the branch does not exist.
    pub async fn branch_tip(&self, branch: &str) -> DomainResult<Option<String>> {
        validate_branch_name(branch)?;
        let output = self
            .run(&["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")])
            .await?;
        if output.success() {
            Ok(Some(output.stdout.trim().to_string()))
        } else {
            Ok(None)
        }
    }

    /// Dry-run merge of `branch` into the current branch: merge without
    /// committing, inspect unmerged paths, then abort (ignoring "no merge
    /// to abort").
    pub async fn merge_probe(&self, branch: &str) -> DomainResult<ProbeResult> {
        validate_branch_name(branch)?;
        let merge = self.run(&["merge", "--no-commit", "--no-ff", "--", branch]).await?;

        let conflicts = if merge.success() {
            Vec::new()
        } else {
            let unmerged = self.run(&["diff", "--name-only", "--diff-filter=U"]).await?;
            unmerged
                .stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect()
        };

        let abort = self.run(&["merge", "--abort"]).await?;
        if !abort.success() {
            debug!(output = %abort.diagnostic(), "merge --abort (no merge to abort)");
        }

        if merge.success() {
            Ok(ProbeResult::Clean)
        } else if conflicts.is_empty() {
            Err(DomainError::Git(format!("merge probe failed: {}", merge.diagnostic())))
        } else {
            Ok(ProbeResult::Conflicts(conflicts))
        }
    }

    /// Squash-merge `branch` into the current branch and commit with the
    /// deterministic message "Merge {branch}".
    pub async fn squash_merge(&self, branch: &str) -> DomainResult<String> {
        validate_branch_name(branch)?;
        let merge = self.run(&["merge", "--squash", "--", branch]).await?;
        if !merge.success() {
            let _ = self.run(&["merge", "--abort"]).await;
            let _ = self.run(&["reset", "--merge"]).await;
            return Err(DomainError::Git(format!(
                "squash merge of {branch} failed: {}",
                merge.diagnostic()
            )));
        }

        let message = format!("Merge {branch}");
        let commit = self.run(&["commit", "--no-verify", "-m", &message]).await?;
        if !commit.success() {
            let _ = self.run(&["reset", "--merge"]).await;
            return Err(DomainError::Git(format!(
                "merge commit failed: {}",
                commit.diagnostic()
            )));
        }

        self.rev_parse("HEAD").await
    }

    /// Delete a local branch. Idempotent: a missing branch is not an error.
    pub async fn delete_branch(&self, branch: &str) -> DomainResult<()> {
        validate_branch_name(branch)?;
        let output = self.run(&["branch", "-D", branch]).await?;
        if !output.success() {
            debug!(branch, output = %output.diagnostic(), "local branch delete skipped");
        }
        Ok(())
    }

    /// Push a branch; `force_with_lease` is used after fix-loop rebases.
    pub async fn push(&self, remote: &str, branch: &str, force_with_lease: bool) -> DomainResult<()> {
        validate_branch_name(branch)?;
        if force_with_lease {
            self.run_ok(&["push", "--force-with-lease", remote, branch]).await?;
        } else {
            self.run_ok(&["push", "--set-upstream", remote, branch]).await?;
        }
        Ok(())
    }

    /// Delete a remote branch, best-effort.
    pub async fn push_delete(&self, remote: &str, branch: &str) -> DomainResult<()> {
        validate_branch_name(branch)?;
        let output = self.run(&["push", remote, "--delete", branch]).await?;
        if !output.success() {
            warn!(branch, output = %output.diagnostic(), "remote branch delete skipped");
        }
        Ok(())
    }

    /// Rebase the current branch onto `onto`. Conflicts abort the rebase
    /// and are reported as a probe result.
    pub async fn rebase(&self, onto: &str) -> DomainResult<ProbeResult> {
        validate_branch_name(onto)?;
        let rebase = self.run(&["rebase", onto]).await?;
        if rebase.success() {
            return Ok(ProbeResult::Clean);
        }

        let unmerged = self.run(&["diff", "--name-only", "--diff-filter=U"]).await?;
        let files: Vec<String> = unmerged
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();

        let abort = self.run(&["rebase", "--abort"]).await?;
        if !abort.success() {
            debug!(output = %abort.diagnostic(), "rebase --abort (no rebase in progress)");
        }

        if files.is_empty() {
            Err(DomainError::Git(format!("rebase onto {onto} failed: {}", rebase.diagnostic())))
        } else {
            Ok(ProbeResult::Conflicts(files))
        }
    }
}

/// Validates a git branch name to prevent command injection.
///
/// Rejects names that could be interpreted as git flags or otherwise
/// subvert git command execution. Follows `git check-ref-format` rules.
pub fn validate_branch_name(name: &str) -> DomainResult<()> {
    if name.is_empty() {
        return Err(DomainError::ValidationFailed(
            "Branch name cannot be empty".to_string(),
        ));
    }
    if name.starts_with('-') {
        return Err(DomainError::ValidationFailed(format!(
            "Invalid branch name '{name}': must not start with '-'"
        )));
    }
    if name.contains("..") {
        return Err(DomainError::ValidationFailed(format!(
            "Invalid branch name '{name}': must not contain '..'"
        )));
    }
    for ch in name.chars() {
        if ch.is_ascii_control() || matches!(ch, ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\') {
            return Err(DomainError::ValidationFailed(format!(
                "Invalid branch name '{name}': contains disallowed character '{ch}'"
            )));
        }
    }
    if name.ends_with(".lock") {
        return Err(DomainError::ValidationFailed(format!(
            "Invalid branch name '{name}': must not end with '.lock'"
        )));
    }
    Ok(())
}
