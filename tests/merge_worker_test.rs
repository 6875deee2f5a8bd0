//! Merge worker tests over real git repositories in temp directories:
//! FIFO integration, conflict routing, the quality gate, and terminal
//! bookkeeping.

mod common;

use std::sync::Arc;
use tempfile::TempDir;

use drover::domain::models::{
    Config, MergeOutcome, NotificationKind, PhaseStatus, QualityCheck, TaskStatus,
};
use drover::services::coordinator::CompletionOutcome;
use drover::services::{BacklogLoader, CoordinatorService, MergeWorker, PhaseScheduler};

use common::{backlog, commit_on_branch, git, init_repo, record, test_context};

async fn setup(
    records: Vec<drover::domain::models::BacklogRecord>,
    configure: impl FnOnce(&mut Config),
) -> (TempDir, Arc<drover::services::CoordinatorContext>, CoordinatorService, MergeWorker) {
    let repo = TempDir::new().unwrap();
    init_repo(repo.path());

    let mut config = Config::default();
    config.repo_path = repo.path().to_string_lossy().into_owned();
    configure(&mut config);

    let ctx = test_context(config).await;
    BacklogLoader::new(ctx.clone()).load(&backlog(records)).await.unwrap();
    let coordinator = CoordinatorService::new(ctx.clone());
    let worker = MergeWorker::new(ctx.clone());
    (repo, ctx, coordinator, worker)
}

#[tokio::test]
async fn merges_in_fifo_order_and_completes_the_backlog() {
    let (repo, ctx, coordinator, worker) = setup(
        vec![record("t1", "development", &[]), record("t2", "development", &[])],
        |_| {},
    )
    .await;

    coordinator.register(Some("a".into()), vec![]).await.unwrap();
    coordinator.register(Some("b".into()), vec![]).await.unwrap();
    let first = coordinator.claim("a").await.unwrap().unwrap();
    let second = coordinator.claim("b").await.unwrap().unwrap();

    for (agent, task) in [("a", &first), ("b", &second)] {
        let branch = format!("{agent}/task-{}", task.id);
        commit_on_branch(repo.path(), &branch, &format!("{}.txt", task.id), "content\n");
        coordinator
            .complete(agent, &task.id, CompletionOutcome::Success, Some(branch), None, None)
            .await
            .unwrap();
    }

    // FIFO: the first completion is integrated first.
    let popped = ctx.merge_queue.pop().await.unwrap().unwrap();
    assert_eq!(popped.task_id, first.id);
    let outcome = worker.process(popped).await.unwrap();
    assert!(matches!(outcome, MergeOutcome::Merged { .. }));

    let popped = ctx.merge_queue.pop().await.unwrap().unwrap();
    assert_eq!(popped.task_id, second.id);
    worker.process(popped).await.unwrap();

    // Both merged; the squash commits carry the deterministic message.
    let t1 = ctx.tasks.get(&first.id).await.unwrap().unwrap();
    assert_eq!(t1.status, TaskStatus::Merged);
    assert!(t1.merged_at.is_some());
    let t2 = ctx.tasks.get(&second.id).await.unwrap().unwrap();
    assert_eq!(t2.status, TaskStatus::Merged);
    assert!(t1.merged_at.unwrap() <= t2.merged_at.unwrap());

    let subject = git(repo.path(), &["log", "-1", "--format=%s"]);
    assert_eq!(subject, format!("Merge b/task-{}", second.id));
    assert!(repo.path().join(format!("{}.txt", first.id)).exists());
    assert!(repo.path().join(format!("{}.txt", second.id)).exists());

    // Source branches were cleaned up.
    let branches = git(repo.path(), &["branch", "--list"]);
    assert!(!branches.contains("task-"));

    // Single phase, both terminal: backlog complete.
    let phases = ctx.phases.list().await.unwrap();
    assert!(phases.iter().all(|p| p.status == PhaseStatus::Completed));
    assert!(PhaseScheduler::new(ctx.clone()).backlog_complete().await.unwrap());

    // Owners were notified of their merges.
    let kinds: Vec<_> = ctx
        .bus
        .drain_pending("a")
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.kind)
        .collect();
    assert!(kinds.contains(&NotificationKind::MergeSuccess));
}

#[tokio::test]
async fn second_branch_touching_same_line_routes_to_conflict() {
    let (repo, ctx, coordinator, worker) = setup(
        vec![record("t1", "development", &[]), record("t2", "development", &[])],
        |_| {},
    )
    .await;

    coordinator.register(Some("a".into()), vec![]).await.unwrap();
    coordinator.register(Some("b".into()), vec![]).await.unwrap();
    coordinator.claim("a").await.unwrap().unwrap();
    coordinator.claim("b").await.unwrap().unwrap();

    // Both branches fork from the same mainline tip and write the same file.
    commit_on_branch(repo.path(), "a/task-t1", "shared.txt", "from t1\n");
    commit_on_branch(repo.path(), "b/task-t2", "shared.txt", "from t2\n");

    coordinator
        .complete("a", "t1", CompletionOutcome::Success, Some("a/task-t1".into()), None, None)
        .await
        .unwrap();
    coordinator
        .complete("b", "t2", CompletionOutcome::Success, Some("b/task-t2".into()), None, None)
        .await
        .unwrap();

    let outcome = worker.process(ctx.merge_queue.pop().await.unwrap().unwrap()).await.unwrap();
    assert!(matches!(outcome, MergeOutcome::Merged { .. }));

    let outcome = worker.process(ctx.merge_queue.pop().await.unwrap().unwrap()).await.unwrap();
    let MergeOutcome::Conflict { files } = outcome else {
        panic!("expected conflict, got {outcome:?}");
    };
    assert_eq!(files, vec!["shared.txt"]);

    // Task is parked in conflict; no retry consumed; mainline holds t1 only.
    let t2 = ctx.tasks.get("t2").await.unwrap().unwrap();
    assert_eq!(t2.status, TaskStatus::Conflict);
    assert_eq!(t2.retry_count, 0);
    let content = std::fs::read_to_string(repo.path().join("shared.txt")).unwrap();
    assert_eq!(content, "from t1\n");

    // The owning agent got the conflict notification with the file list.
    let pending = ctx.bus.drain_pending("b").await.unwrap();
    let conflict = pending
        .iter()
        .find(|n| n.kind == NotificationKind::ConflictDetected)
        .expect("conflict notification");
    assert_eq!(conflict.task_id.as_deref(), Some("t2"));
    assert_eq!(conflict.data["files"][0], "shared.txt");

    // The branch survives for the fix loop.
    let branches = git(repo.path(), &["branch", "--list", "b/task-t2"]);
    assert!(branches.contains("b/task-t2"));
}

#[tokio::test]
async fn required_check_failure_gates_the_merge() {
    let (repo, ctx, coordinator, worker) = setup(
        vec![record("t1", "development", &[])],
        |config| {
            config.quality_gates.checks = vec![QualityCheck {
                name: "always-fails".to_string(),
                command: vec!["false".to_string()],
                required: true,
            }];
        },
    )
    .await;

    coordinator.register(Some("a".into()), vec![]).await.unwrap();
    coordinator.claim("a").await.unwrap().unwrap();
    commit_on_branch(repo.path(), "a/task-t1", "t1.txt", "content\n");
    coordinator
        .complete("a", "t1", CompletionOutcome::Success, Some("a/task-t1".into()), None, None)
        .await
        .unwrap();

    let outcome = worker.process(ctx.merge_queue.pop().await.unwrap().unwrap()).await.unwrap();
    let MergeOutcome::TestsFailed { check, .. } = outcome else {
        panic!("expected tests_failed, got {outcome:?}");
    };
    assert_eq!(check, "always-fails");

    let t1 = ctx.tasks.get("t1").await.unwrap().unwrap();
    assert_eq!(t1.status, TaskStatus::TestFailed);
    assert_eq!(t1.retry_count, 0);

    // No merge happened and the worker restored the mainline checkout.
    assert!(!repo.path().join("t1.txt").exists());
    let head = git(repo.path(), &["rev-parse", "--abbrev-ref", "HEAD"]);
    assert_eq!(head, "main");

    let pending = ctx.bus.drain_pending("a").await.unwrap();
    assert!(pending.iter().any(|n| n.kind == NotificationKind::TestsFailed));
}

#[tokio::test]
async fn advisory_check_failure_does_not_gate() {
    let (repo, ctx, coordinator, worker) = setup(
        vec![record("t1", "development", &[])],
        |config| {
            config.quality_gates.checks = vec![
                QualityCheck {
                    name: "advisory-fails".to_string(),
                    command: vec!["false".to_string()],
                    required: false,
                },
                QualityCheck {
                    name: "required-passes".to_string(),
                    command: vec!["true".to_string()],
                    required: true,
                },
            ];
        },
    )
    .await;

    coordinator.register(Some("a".into()), vec![]).await.unwrap();
    coordinator.claim("a").await.unwrap().unwrap();
    commit_on_branch(repo.path(), "a/task-t1", "t1.txt", "content\n");
    coordinator
        .complete("a", "t1", CompletionOutcome::Success, Some("a/task-t1".into()), None, None)
        .await
        .unwrap();

    let outcome = worker.process(ctx.merge_queue.pop().await.unwrap().unwrap()).await.unwrap();
    assert!(matches!(outcome, MergeOutcome::Merged { .. }));
}

#[tokio::test]
async fn crashed_worker_active_merge_is_recovered() {
    let (repo, ctx, coordinator, worker) =
        setup(vec![record("t1", "development", &[])], |_| {}).await;

    coordinator.register(Some("a".into()), vec![]).await.unwrap();
    coordinator.claim("a").await.unwrap().unwrap();
    commit_on_branch(repo.path(), "a/task-t1", "t1.txt", "content\n");
    coordinator
        .complete("a", "t1", CompletionOutcome::Success, Some("a/task-t1".into()), None, None)
        .await
        .unwrap();

    // Simulate a crash mid-merge: popped and marked active, never cleared.
    let request = ctx.merge_queue.pop().await.unwrap().unwrap();
    ctx.merge_queue.mark_active(&request).await.unwrap();
    assert_eq!(ctx.merge_queue.len().await.unwrap(), 0);

    // A fresh worker recovers the in-flight request and integrates it.
    assert_eq!(worker.recover().await.unwrap(), 1);
    assert_eq!(ctx.merge_queue.len().await.unwrap(), 1);
    let outcome = worker.process(ctx.merge_queue.pop().await.unwrap().unwrap()).await.unwrap();
    assert!(matches!(outcome, MergeOutcome::Merged { .. }));

    // Nothing left to recover.
    assert_eq!(worker.recover().await.unwrap(), 0);
}

#[tokio::test]
async fn integrate_failure_requeues_then_fails_terminally() {
    let repo = TempDir::new().unwrap();
    init_repo(repo.path());

    // A bare origin so the mainline refresh works in remote mode; the
    // hosted PR merge itself cannot succeed here, which is the point.
    let remote = TempDir::new().unwrap();
    git(remote.path(), &["init", "--bare", "-b", "main"]);
    git(repo.path(), &["remote", "add", "origin", &remote.path().to_string_lossy()]);
    git(repo.path(), &["push", "-u", "origin", "main"]);

    let mut config = Config::default();
    config.repo_path = repo.path().to_string_lossy().into_owned();
    config.git.push_to_remote = true;
    config.advanced.max_retries = 2;

    let ctx = test_context(config).await;
    BacklogLoader::new(ctx.clone())
        .load(&backlog(vec![record("t1", "development", &[])]))
        .await
        .unwrap();
    let coordinator = CoordinatorService::new(ctx.clone());
    let worker = MergeWorker::new(ctx.clone());

    coordinator.register(Some("a".into()), vec![]).await.unwrap();
    coordinator.claim("a").await.unwrap().unwrap();
    commit_on_branch(repo.path(), "a/task-t1", "t1.txt", "content\n");
    coordinator
        .complete(
            "a",
            "t1",
            CompletionOutcome::Success,
            Some("a/task-t1".into()),
            Some("1".into()),
            None,
        )
        .await
        .unwrap();

    // First attempt: integrate fails, retry budget remains, tail requeue.
    let outcome = worker.process(ctx.merge_queue.pop().await.unwrap().unwrap()).await.unwrap();
    assert!(matches!(outcome, MergeOutcome::Requeued { retry_count: 1 }));
    let t1 = ctx.tasks.get("t1").await.unwrap().unwrap();
    assert_eq!(t1.status, TaskStatus::MergeFailed);
    assert_eq!(t1.retry_count, 1);
    assert_eq!(ctx.merge_queue.len().await.unwrap(), 1);

    // Second attempt exhausts the budget: terminal failure.
    let outcome = worker.process(ctx.merge_queue.pop().await.unwrap().unwrap()).await.unwrap();
    assert!(matches!(outcome, MergeOutcome::Failed { .. }));
    let t1 = ctx.tasks.get("t1").await.unwrap().unwrap();
    assert_eq!(t1.status, TaskStatus::Failed);
    assert_eq!(ctx.merge_queue.len().await.unwrap(), 0);

    let pending = ctx.bus.drain_pending("a").await.unwrap();
    assert!(pending.iter().any(|n| n.kind == NotificationKind::MergeFailed));
}

#[tokio::test]
async fn fixed_conflict_resubmission_merges_on_the_same_branch() {
    let (repo, ctx, coordinator, worker) = setup(
        vec![record("t1", "development", &[]), record("t2", "development", &[])],
        |_| {},
    )
    .await;

    coordinator.register(Some("a".into()), vec![]).await.unwrap();
    coordinator.register(Some("b".into()), vec![]).await.unwrap();
    coordinator.claim("a").await.unwrap().unwrap();
    coordinator.claim("b").await.unwrap().unwrap();

    commit_on_branch(repo.path(), "a/task-t1", "shared.txt", "from t1\n");
    commit_on_branch(repo.path(), "b/task-t2", "shared.txt", "from t2\n");

    coordinator
        .complete("a", "t1", CompletionOutcome::Success, Some("a/task-t1".into()), None, None)
        .await
        .unwrap();
    coordinator
        .complete("b", "t2", CompletionOutcome::Success, Some("b/task-t2".into()), None, None)
        .await
        .unwrap();

    worker.process(ctx.merge_queue.pop().await.unwrap().unwrap()).await.unwrap();
    let outcome = worker.process(ctx.merge_queue.pop().await.unwrap().unwrap()).await.unwrap();
    assert!(matches!(outcome, MergeOutcome::Conflict { .. }));

    // The agent resolves on the same branch: rebase-equivalent rewrite that
    // takes the mainline's content plus its own change elsewhere.
    git(repo.path(), &["checkout", "b/task-t2"]);
    std::fs::write(repo.path().join("shared.txt"), "from t1\n").unwrap();
    std::fs::write(repo.path().join("t2.txt"), "from t2\n").unwrap();
    git(repo.path(), &["add", "."]);
    git(repo.path(), &["commit", "-m", "resolve conflict"]);
    git(repo.path(), &["checkout", "main"]);

    // A fresh completion signal re-enqueues the merge.
    coordinator
        .complete("b", "t2", CompletionOutcome::Success, Some("b/task-t2".into()), None, None)
        .await
        .unwrap();
    let outcome = worker.process(ctx.merge_queue.pop().await.unwrap().unwrap()).await.unwrap();
    assert!(matches!(outcome, MergeOutcome::Merged { .. }));

    let t2 = ctx.tasks.get("t2").await.unwrap().unwrap();
    assert_eq!(t2.status, TaskStatus::Merged);
    assert!(repo.path().join("t2.txt").exists());
}
