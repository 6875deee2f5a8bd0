//! Workspace brief files.
//!
//! Before handing a task to the external implementer, the agent
//! materializes a human-readable brief and a machine-readable context file
//! inside the working tree. Both are removed once an implementation commit
//! is observed; a commit that included them anyway is accepted. The fix
//! loop writes a symmetric pair describing the failure.

use serde_json::json;
use std::fmt::Write as _;
use std::io;
use std::path::Path;

use crate::domain::models::{Notification, NotificationKind, Task};

/// Human-readable task brief.
pub const TASK_BRIEF_FILE: &str = "TASK_BRIEF.md";
/// Machine-readable task context.
pub const CONTEXT_FILE: &str = ".drover-task.json";
/// Human-readable fix brief written by the fix loop.
pub const FIX_BRIEF_FILE: &str = "FIX_BRIEF.md";

/// Write the task brief and context file into the working tree.
pub fn write_task_files(dir: &Path, task: &Task, role: &str, branch: &str) -> io::Result<()> {
    let mut brief = String::new();
    let _ = writeln!(brief, "# {}", task.title);
    let _ = writeln!(brief);
    let _ = writeln!(brief, "- **Task id**: {}", task.id);
    let _ = writeln!(brief, "- **Kind**: {}", task.kind.as_str());
    let _ = writeln!(brief, "- **Role**: {role}");
    let _ = writeln!(brief, "- **Branch**: {branch}");
    if !task.description.is_empty() {
        let _ = writeln!(brief, "\n## Description\n\n{}", task.description);
    }
    if !task.acceptance_criteria.is_empty() {
        let _ = writeln!(brief, "\n## Acceptance criteria\n");
        for criterion in &task.acceptance_criteria {
            let _ = writeln!(brief, "- {criterion}");
        }
    }
    let _ = writeln!(
        brief,
        "\n## When done\n\nCommit your work to this branch. The orchestrator watches the \
         branch head and takes over once a new commit lands. Do not switch branches."
    );
    std::fs::write(dir.join(TASK_BRIEF_FILE), brief)?;

    let context = json!({
        "version": 1,
        "role": role,
        "branch": branch,
        "task": task,
    });
    std::fs::write(
        dir.join(CONTEXT_FILE),
        serde_json::to_string_pretty(&context).unwrap_or_default(),
    )
}

/// Write a fix brief describing a conflict or test failure.
pub fn write_fix_brief(
    dir: &Path,
    notification: &Notification,
    branch: &str,
    iteration: u32,
    max_iterations: u32,
) -> io::Result<()> {
    let mut brief = String::new();
    let _ = writeln!(brief, "# Fix required ({}/{max_iterations})", iteration);
    let _ = writeln!(brief);
    if let Some(task_id) = &notification.task_id {
        let _ = writeln!(brief, "- **Task id**: {task_id}");
    }
    let _ = writeln!(brief, "- **Branch**: {branch}");
    let _ = writeln!(brief, "- **Failure**: {}", notification.kind.as_str());

    match notification.kind {
        NotificationKind::ConflictDetected => {
            let files: Vec<String> = notification.data["files"]
                .as_array()
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default();
            let _ = writeln!(brief, "\n## Conflicting files\n");
            for file in files {
                let _ = writeln!(brief, "- {file}");
            }
            let _ = writeln!(
                brief,
                "\n## Remediation\n\nThe mainline has moved under this branch. Rework the \
                 listed files so the branch applies cleanly on the current mainline, then \
                 commit to this branch. The orchestrator rebases and force-pushes for you."
            );
        }
        NotificationKind::TestsFailed => {
            let check = notification.data["check"].as_str().unwrap_or("unknown");
            let output = notification.data["output"].as_str().unwrap_or("");
            let _ = writeln!(brief, "- **Failed check**: {check}");
            let _ = writeln!(brief, "\n## Captured output\n\n```\n{output}\n```");
            let _ = writeln!(
                brief,
                "\n## Remediation\n\nMake the failing check pass, then commit to this \
                 branch. The orchestrator re-runs the checks and re-submits."
            );
        }
        _ => {
            let _ = writeln!(brief, "\n```\n{}\n```", notification.data);
        }
    }

    std::fs::write(dir.join(FIX_BRIEF_FILE), brief)
}

/// Remove the task brief and context file; missing files are fine.
pub fn remove_task_files(dir: &Path) {
    for name in [TASK_BRIEF_FILE, CONTEXT_FILE] {
        let _ = std::fs::remove_file(dir.join(name));
    }
}

/// Remove the fix brief; a missing file is fine.
pub fn remove_fix_files(dir: &Path) {
    let _ = std::fs::remove_file(dir.join(FIX_BRIEF_FILE));
}
