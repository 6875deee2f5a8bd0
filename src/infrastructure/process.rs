//! Bounded subprocess execution.
//!
//! Every external command (git, quality checks, the PR CLI) runs through
//! here: argv arrays only, never a shell, with a wall-clock bound. Outcomes
//! are explicit values the callers dispatch on, not exceptions.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::domain::errors::{DomainError, DomainResult};

/// Outcome of one subprocess invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; None when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// The wall-clock bound fired; treated as a nonzero exit
    pub timed_out: bool,
}

impl CommandOutput {
    /// Whether the command completed with exit code 0 inside its bound.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// stderr, falling back to stdout, trimmed for diagnostics.
    pub fn diagnostic(&self) -> String {
        if self.timed_out {
            return "timed out".to_string();
        }
        let err = self.stderr.trim();
        if err.is_empty() { self.stdout.trim().to_string() } else { err.to_string() }
    }
}

/// Run an argv list in `dir`, bounded by `timeout`.
///
/// A spawn failure (binary missing, permission denied) is an error; a
/// nonzero exit or an expired bound is a normal [`CommandOutput`].
pub async fn run_with_timeout(
    argv: &[String],
    dir: &Path,
    timeout: Duration,
) -> DomainResult<CommandOutput> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| DomainError::ValidationFailed("empty command".to_string()))?;

    let child = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: false,
        }),
        Ok(Err(e)) => Err(DomainError::PreconditionFailed(format!(
            "failed to run {program}: {e}"
        ))),
        Err(_) => Ok(CommandOutput {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: true,
        }),
    }
}
