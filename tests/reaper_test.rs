//! Dead-agent recovery: heartbeat expiry releases the claim lock and
//! resets the orphaned task so another agent can pick it up.

mod common;

use chrono::{Duration, Utc};
use drover::domain::models::{AgentState, Config, TaskStatus};
use drover::services::{BacklogLoader, CoordinatorService, Reaper};

use common::{backlog, record, test_context};

#[tokio::test]
async fn dead_agent_task_is_reclaimed() {
    let mut config = Config::default();
    config.timeouts.agent_timeout = 300;
    let ctx = test_context(config).await;

    BacklogLoader::new(ctx.clone())
        .load(&backlog(vec![record("t1", "development", &[])]))
        .await
        .unwrap();
    let coordinator = CoordinatorService::new(ctx.clone());
    let reaper = Reaper::new(ctx.clone());

    coordinator.register(Some("doomed".into()), vec![]).await.unwrap();
    coordinator.register(Some("survivor".into()), vec![]).await.unwrap();
    let task = coordinator.claim("doomed").await.unwrap().unwrap();
    assert_eq!(task.id, "t1");

    // Nothing to reap while the heartbeat is fresh.
    assert_eq!(reaper.sweep().await.unwrap(), 0);
    assert!(coordinator.claim("survivor").await.unwrap().is_none());

    // Backdate the heartbeat past agent_timeout; the process died.
    let mut doomed = ctx.agents.get("doomed").await.unwrap().unwrap();
    doomed.last_heartbeat = Utc::now() - Duration::seconds(400);
    ctx.agents.update(&doomed).await.unwrap();

    let reset = reaper.sweep().await.unwrap();
    assert_eq!(reset, 1);

    let task = ctx.tasks.get("t1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.assigned_agent.is_none());
    assert!(task.claimed_at.is_none());

    let doomed = ctx.agents.get("doomed").await.unwrap().unwrap();
    assert_eq!(doomed.state, AgentState::Dead);
    assert!(doomed.current_task.is_none());

    // The lock is gone: the survivor claims the task.
    let reclaimed = coordinator.claim("survivor").await.unwrap().unwrap();
    assert_eq!(reclaimed.id, "t1");
    assert_eq!(reclaimed.assigned_agent.as_deref(), Some("survivor"));
}

#[tokio::test]
async fn idle_dead_agents_are_marked_without_resets() {
    let ctx = test_context(Config::default()).await;
    let coordinator = CoordinatorService::new(ctx.clone());
    let reaper = Reaper::new(ctx.clone());

    coordinator.register(Some("idle".into()), vec![]).await.unwrap();
    let mut idle = ctx.agents.get("idle").await.unwrap().unwrap();
    idle.last_heartbeat = Utc::now() - Duration::seconds(400);
    ctx.agents.update(&idle).await.unwrap();

    assert_eq!(reaper.sweep().await.unwrap(), 0);
    assert_eq!(
        ctx.agents.get("idle").await.unwrap().unwrap().state,
        AgentState::Dead
    );
}

#[tokio::test]
async fn dead_id_can_reregister() {
    let ctx = test_context(Config::default()).await;
    let coordinator = CoordinatorService::new(ctx.clone());
    let reaper = Reaper::new(ctx.clone());

    coordinator.register(Some("phoenix".into()), vec![]).await.unwrap();
    let mut agent = ctx.agents.get("phoenix").await.unwrap().unwrap();
    agent.last_heartbeat = Utc::now() - Duration::seconds(400);
    ctx.agents.update(&agent).await.unwrap();
    reaper.sweep().await.unwrap();

    // The reaped id is free again.
    let reborn = coordinator.register(Some("phoenix".into()), vec![]).await.unwrap();
    assert_eq!(reborn.state, AgentState::Idle);
}
