//! State-store restart: tasks, claims, and the merge queue survive a
//! reconnect to the same database file.

mod common;

use tempfile::TempDir;

use drover::adapters::sqlite::{create_pool, Migrator};
use drover::domain::models::{Config, TaskStatus};
use drover::services::coordinator::CompletionOutcome;
use drover::services::{BacklogLoader, CoordinatorContext, CoordinatorService};

use common::{backlog, record};

#[tokio::test]
async fn restart_preserves_tasks_claims_and_queue_order() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.database.path = dir.path().join("drover.db").to_string_lossy().into_owned();

    // First life: load, claim both tasks, complete one.
    {
        let pool = create_pool(&config.database).await.unwrap();
        Migrator::new(pool.clone()).run_embedded_migrations().await.unwrap();
        let ctx = CoordinatorContext::sqlite(pool.clone(), config.clone());

        BacklogLoader::new(ctx.clone())
            .load(&backlog(vec![
                record("t1", "development", &[]),
                record("t2", "development", &[]),
            ]))
            .await
            .unwrap();

        let coordinator = CoordinatorService::new(ctx.clone());
        coordinator.register(Some("a".into()), vec![]).await.unwrap();
        coordinator.claim("a").await.unwrap().unwrap();
        coordinator
            .complete("a", "t1", CompletionOutcome::Success, Some("a/task-t1".into()), None, None)
            .await
            .unwrap();
        coordinator.claim("a").await.unwrap().unwrap();

        pool.close().await;
    }

    // Second life: everything is where it was.
    let pool = create_pool(&config.database).await.unwrap();
    Migrator::new(pool.clone()).run_embedded_migrations().await.unwrap();
    let ctx = CoordinatorContext::sqlite(pool, config);

    let t1 = ctx.tasks.get("t1").await.unwrap().unwrap();
    assert_eq!(t1.status, TaskStatus::Done);
    let t2 = ctx.tasks.get("t2").await.unwrap().unwrap();
    assert_eq!(t2.status, TaskStatus::InProgress);
    assert_eq!(t2.assigned_agent.as_deref(), Some("a"));

    // The claim lease survived: another agent cannot steal t2.
    assert_eq!(ctx.locks.holder("t2").await.unwrap().as_deref(), Some("a"));

    // The merge queue preserved its order and content.
    assert_eq!(ctx.merge_queue.len().await.unwrap(), 1);
    let request = ctx.merge_queue.pop().await.unwrap().unwrap();
    assert_eq!(request.task_id, "t1");
    assert_eq!(request.branch, "a/task-t1");
}
