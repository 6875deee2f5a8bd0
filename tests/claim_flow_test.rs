//! Claim and completion flow tests against an in-memory state store:
//! single-claim exclusivity, dependency gating, blocked propagation,
//! ordering, and idempotence.

mod common;

use drover::domain::errors::DomainError;
use drover::domain::models::{Config, PhaseStatus, TaskStatus};
use drover::services::coordinator::CompletionOutcome;
use drover::services::{BacklogLoader, CoordinatorService, PhaseScheduler};

use common::{backlog, record, test_context};

#[tokio::test]
async fn two_agents_two_independent_tasks() {
    let ctx = test_context(Config::default()).await;
    BacklogLoader::new(ctx.clone())
        .load(&backlog(vec![
            record("t1", "development", &[]),
            record("t2", "development", &[]),
        ]))
        .await
        .unwrap();
    let coordinator = CoordinatorService::new(ctx.clone());

    let a = coordinator.register(Some("a".into()), vec![]).await.unwrap();
    let b = coordinator.register(Some("b".into()), vec![]).await.unwrap();

    let task_a = coordinator.claim(&a.id).await.unwrap().expect("a claims a task");
    let task_b = coordinator.claim(&b.id).await.unwrap().expect("b claims the other");
    assert_ne!(task_a.id, task_b.id);
    assert_eq!(task_a.status, TaskStatus::InProgress);
    assert_eq!(task_a.assigned_agent.as_deref(), Some("a"));

    // Nothing left to claim.
    assert!(coordinator.claim(&a.id).await.unwrap().is_none());
}

#[tokio::test]
async fn contested_task_goes_to_one_agent() {
    let ctx = test_context(Config::default()).await;
    BacklogLoader::new(ctx.clone())
        .load(&backlog(vec![record("t1", "development", &[])]))
        .await
        .unwrap();
    let coordinator = CoordinatorService::new(ctx.clone());

    coordinator.register(Some("a".into()), vec![]).await.unwrap();
    coordinator.register(Some("b".into()), vec![]).await.unwrap();

    let (first, second) =
        tokio::join!(coordinator.claim("a"), coordinator.claim("b"));
    let first = first.unwrap();
    let second = second.unwrap();

    // Exactly one wins; the loser sees no tasks available.
    assert!(first.is_some() != second.is_some());
}

#[tokio::test]
async fn linear_dependency_gates_claims() {
    let ctx = test_context(Config::default()).await;
    BacklogLoader::new(ctx.clone())
        .load(&backlog(vec![
            record("t1", "development", &[]),
            record("t2", "development", &["t1"]),
        ]))
        .await
        .unwrap();
    let coordinator = CoordinatorService::new(ctx.clone());
    let scheduler = PhaseScheduler::new(ctx.clone());

    coordinator.register(Some("a".into()), vec![]).await.unwrap();
    let t1 = coordinator.claim("a").await.unwrap().unwrap();
    assert_eq!(t1.id, "t1");

    coordinator
        .complete("a", "t1", CompletionOutcome::Success, Some("a/task-t1".into()), None, None)
        .await
        .unwrap();

    // Done but not merged: t2 stays out of reach (its phase is not active
    // and its dependency is not merged).
    assert!(coordinator.claim("a").await.unwrap().is_none());

    // Simulate the merge worker's terminal write.
    let mut t1 = ctx.tasks.get("t1").await.unwrap().unwrap();
    t1.transition_to(TaskStatus::Merged).unwrap();
    ctx.tasks.update(&t1).await.unwrap();
    scheduler.on_task_terminal().await.unwrap();

    let active = ctx.phases.active().await.unwrap().unwrap();
    assert_eq!(active.index, 2);

    let t2 = coordinator.claim("a").await.unwrap().expect("t2 claimable after merge");
    assert_eq!(t2.id, "t2");
}

#[tokio::test]
async fn failed_dependency_blocks_dependent_and_phase_advances() {
    let ctx = test_context(Config::default()).await;
    BacklogLoader::new(ctx.clone())
        .load(&backlog(vec![
            record("t1", "development", &[]),
            record("t2", "development", &["t1"]),
        ]))
        .await
        .unwrap();
    let coordinator = CoordinatorService::new(ctx.clone());
    let scheduler = PhaseScheduler::new(ctx.clone());

    coordinator.register(Some("a".into()), vec![]).await.unwrap();
    coordinator.claim("a").await.unwrap().unwrap();
    coordinator
        .complete(
            "a",
            "t1",
            CompletionOutcome::Failure,
            None,
            None,
            Some("build broken".into()),
        )
        .await
        .unwrap();

    assert_eq!(
        ctx.tasks.get("t1").await.unwrap().unwrap().status,
        TaskStatus::Failed
    );
    // Phase 1 completed on the failure; phase 2 is active.
    assert_eq!(ctx.phases.active().await.unwrap().unwrap().index, 2);

    // Claiming transitions t2 to blocked instead of handing it out.
    assert!(coordinator.claim("a").await.unwrap().is_none());
    let t2 = ctx.tasks.get("t2").await.unwrap().unwrap();
    assert_eq!(t2.status, TaskStatus::Blocked);
    assert_eq!(t2.blocked_reason.as_deref(), Some("dependency t1 failed"));

    // Blocked is terminal: the phase completed and the backlog is done.
    scheduler.on_task_terminal().await.unwrap();
    let phases = ctx.phases.list().await.unwrap();
    assert!(phases.iter().all(|p| p.status == PhaseStatus::Completed));
    assert!(scheduler.backlog_complete().await.unwrap());
}

#[tokio::test]
async fn claim_orders_by_priority_then_id() {
    let ctx = test_context(Config::default()).await;
    let mut low = record("a-low", "development", &[]);
    low.priority = Some("L".into());
    let mut high = record("z-high", "development", &[]);
    high.priority = Some("H".into());
    let mid_b = record("m2", "development", &[]);
    let mid_a = record("m1", "development", &[]);

    BacklogLoader::new(ctx.clone())
        .load(&backlog(vec![low, high, mid_b, mid_a]))
        .await
        .unwrap();
    let coordinator = CoordinatorService::new(ctx.clone());
    coordinator.register(Some("a".into()), vec![]).await.unwrap();

    let order: Vec<String> = {
        let mut ids = Vec::new();
        while let Some(task) = coordinator.claim("a").await.unwrap() {
            ids.push(task.id.clone());
            // Release so the single agent can claim the next one.
            coordinator
                .complete(
                    "a",
                    &task.id,
                    CompletionOutcome::Success,
                    Some(format!("a/task-{}", task.id)),
                    None,
                    None,
                )
                .await
                .unwrap();
        }
        ids
    };

    assert_eq!(order, vec!["z-high", "m1", "m2", "a-low"]);
}

#[tokio::test]
async fn kind_gating_excludes_disabled_kinds() {
    let mut config = Config::default();
    config
        .agent_assignment
        .0
        .insert("security".into(), drover::domain::models::KindGate { enabled: false });

    let ctx = test_context(config).await;
    BacklogLoader::new(ctx.clone())
        .load(&backlog(vec![
            record("sec", "security", &[]),
            record("dev", "development", &[]),
        ]))
        .await
        .unwrap();
    let coordinator = CoordinatorService::new(ctx.clone());
    coordinator.register(Some("a".into()), vec![]).await.unwrap();

    let claimed = coordinator.claim("a").await.unwrap().unwrap();
    assert_eq!(claimed.id, "dev");
    assert!(coordinator.claim("a").await.unwrap().is_none());
}

#[tokio::test]
async fn completion_requires_the_lock_holder() {
    let ctx = test_context(Config::default()).await;
    BacklogLoader::new(ctx.clone())
        .load(&backlog(vec![record("t1", "development", &[])]))
        .await
        .unwrap();
    let coordinator = CoordinatorService::new(ctx.clone());
    coordinator.register(Some("a".into()), vec![]).await.unwrap();
    coordinator.register(Some("b".into()), vec![]).await.unwrap();

    coordinator.claim("a").await.unwrap().unwrap();

    let err = coordinator
        .complete("b", "t1", CompletionOutcome::Success, Some("b/task-t1".into()), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::WrongAgent { .. }));

    // Unknown agents and tasks surface as such.
    let err = coordinator.claim("ghost").await.unwrap_err();
    assert!(matches!(err, DomainError::AgentNotFound(_)));
    let err = coordinator
        .complete("a", "t9", CompletionOutcome::Success, None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::TaskNotFound(_)));
}

#[tokio::test]
async fn completion_succeeds_after_lock_expiry_for_live_agent() {
    // A one-second lease against a longer implementation: the lease lapses
    // mid-work, but the agent stays alive and heartbeating, so its
    // completion must land. Expiration alone never resets a task; only
    // the reaper does.
    let mut config = Config::default();
    config.timeouts.task_lock_ttl = 1;
    let ctx = test_context(config).await;
    BacklogLoader::new(ctx.clone())
        .load(&backlog(vec![record("t1", "development", &[])]))
        .await
        .unwrap();
    let coordinator = CoordinatorService::new(ctx.clone());

    coordinator.register(Some("a".into()), vec![]).await.unwrap();
    let task = coordinator.claim("a").await.unwrap().unwrap();
    assert_eq!(task.id, "t1");

    // Outlive the lease while the agent keeps beating.
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    coordinator.heartbeat("a").await.unwrap();
    assert!(ctx.locks.holder("t1").await.unwrap().is_none());

    coordinator
        .complete("a", "t1", CompletionOutcome::Success, Some("a/task-t1".into()), None, None)
        .await
        .unwrap();

    let t1 = ctx.tasks.get("t1").await.unwrap().unwrap();
    assert_eq!(t1.status, TaskStatus::Done);
    assert_eq!(ctx.merge_queue.len().await.unwrap(), 1);

    // The wrong agent is still rejected even with the lease gone.
    coordinator.register(Some("b".into()), vec![]).await.unwrap();
    let err = coordinator
        .complete("b", "t1", CompletionOutcome::Success, Some("b/task-t1".into()), None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DomainError::WrongAgent { .. } | DomainError::LockNotHeld { .. }
    ));
}

#[tokio::test]
async fn repeated_complete_is_rejected_recognizably() {
    let ctx = test_context(Config::default()).await;
    BacklogLoader::new(ctx.clone())
        .load(&backlog(vec![record("t1", "development", &[])]))
        .await
        .unwrap();
    let coordinator = CoordinatorService::new(ctx.clone());
    coordinator.register(Some("a".into()), vec![]).await.unwrap();
    coordinator.claim("a").await.unwrap().unwrap();

    coordinator
        .complete("a", "t1", CompletionOutcome::Success, Some("a/task-t1".into()), None, None)
        .await
        .unwrap();

    // The claim lock is gone after the first completion.
    let err = coordinator
        .complete("a", "t1", CompletionOutcome::Success, Some("a/task-t1".into()), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::LockNotHeld { .. }));

    // Re-claiming a done task is impossible too.
    assert!(coordinator.claim("a").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let ctx = test_context(Config::default()).await;
    let coordinator = CoordinatorService::new(ctx);

    coordinator.register(Some("a".into()), vec![]).await.unwrap();
    let err = coordinator.register(Some("a".into()), vec![]).await.unwrap_err();
    assert!(matches!(err, DomainError::AgentConflict(_)));
}
