//! Coordinator HTTP surface.
//!
//! JSON over HTTP: register/heartbeat/claim/complete for agents, status
//! and cleanup for operators, health for probes, plus a drain endpoint for
//! the durable per-agent notification queue. Status codes: 200 success,
//! 404 unknown agent/task, 409 lock or claim conflict, 422 precondition
//! violation, 503 transient state-store failure.

pub mod handlers;
pub mod types;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::services::{CoordinatorContext, CoordinatorService, Reaper};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<CoordinatorContext>,
    pub coordinator: Arc<CoordinatorService>,
    pub reaper: Arc<Reaper>,
}

impl AppState {
    pub fn new(ctx: Arc<CoordinatorContext>) -> Self {
        Self {
            coordinator: Arc::new(CoordinatorService::new(ctx.clone())),
            reaper: Arc::new(Reaper::new(ctx.clone())),
            ctx,
        }
    }
}

/// Build the coordinator router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/agent/register", post(handlers::register))
        .route("/agent/heartbeat", post(handlers::heartbeat))
        .route("/agent/{id}/notifications", get(handlers::notifications))
        .route("/task/claim", post(handlers::claim))
        .route("/task/complete", post(handlers::complete))
        .route("/status", get(handlers::status))
        .route("/cleanup", post(handlers::cleanup))
        .route("/health", get(handlers::health))
        .with_state(state)
}
