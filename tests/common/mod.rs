//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use drover::adapters::sqlite::{create_test_pool, Migrator};
use drover::domain::models::{Backlog, BacklogRecord, Config};
use drover::services::CoordinatorContext;

/// In-memory state store with migrations applied.
pub async fn test_context(config: Config) -> Arc<CoordinatorContext> {
    let pool = create_test_pool().await.expect("in-memory pool");
    Migrator::new(pool.clone())
        .run_embedded_migrations()
        .await
        .expect("migrations");
    CoordinatorContext::sqlite(pool, config)
}

/// Backlog record builder.
pub fn record(id: &str, kind: &str, deps: &[&str]) -> BacklogRecord {
    BacklogRecord {
        id: id.to_string(),
        title: format!("Task {id}"),
        kind: kind.to_string(),
        priority: None,
        dependencies: deps.iter().map(|s| (*s).to_string()).collect(),
        description: String::new(),
        acceptance_criteria: Vec::new(),
        extra: serde_json::Map::new(),
    }
}

pub fn backlog(records: Vec<BacklogRecord>) -> Backlog {
    Backlog { tasks: records, sprint_schedule: None }
}

/// Run git in a directory, panicking on failure. Test setup only.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap_or_else(|e| panic!("git {args:?} failed to spawn: {e}"));
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Initialize a repository with an initial commit on `main`.
pub fn init_repo(dir: &Path) {
    git(dir, &["init", "-b", "main"]);
    git(dir, &["config", "user.email", "tests@example.com"]);
    git(dir, &["config", "user.name", "Test Harness"]);
    std::fs::write(dir.join("README.md"), "# fixture\n").unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", "initial"]);
}

/// Create a branch off main with one commit writing `path` = `content`.
pub fn commit_on_branch(dir: &Path, branch: &str, path: &str, content: &str) {
    git(dir, &["checkout", "main"]);
    git(dir, &["checkout", "-b", branch]);
    std::fs::write(dir.join(path), content).unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", &format!("change {path}")]);
    git(dir, &["checkout", "main"]);
}
