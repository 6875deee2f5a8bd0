//! Coordinator API handlers and the DomainError -> status mapping.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::domain::errors::DomainError;
use crate::infrastructure::api::types::{
    ClaimRequest, ClaimResponse, CleanupResponse, CompleteRequest, ErrorBody, HealthResponse,
    HeartbeatRequest, NotificationsResponse, RegisterRequest, RegisterResponse,
};
use crate::infrastructure::api::AppState;
use crate::services::coordinator::StatusReport;

/// Wrapper mapping domain errors onto wire statuses.
pub struct ApiError(DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            DomainError::TaskNotFound(_) | DomainError::AgentNotFound(_) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            DomainError::AgentConflict(_)
            | DomainError::LockNotHeld { .. }
            | DomainError::WrongAgent { .. } => (StatusCode::CONFLICT, "conflict"),
            DomainError::ValidationFailed(_)
            | DomainError::PreconditionFailed(_)
            | DomainError::InvalidStateTransition { .. }
            | DomainError::DependencyCycle { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "precondition")
            }
            DomainError::Transient(_) => (StatusCode::SERVICE_UNAVAILABLE, "transient"),
            DomainError::Database(_) | DomainError::Serialization(_) | DomainError::Git(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        let body = ErrorBody { error: kind.to_string(), message: self.0.to_string() };
        (status, Json(body)).into_response()
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let agent = state
        .coordinator
        .register(request.preferred_id, request.capabilities)
        .await?;
    Ok(Json(RegisterResponse { agent_id: agent.id }))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Json(request): Json<HeartbeatRequest>,
) -> Result<StatusCode, ApiError> {
    state.coordinator.heartbeat(&request.agent_id).await?;
    Ok(StatusCode::OK)
}

pub async fn claim(
    State(state): State<AppState>,
    Json(request): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let task = state.coordinator.claim(&request.agent_id).await?;
    Ok(Json(ClaimResponse { task }))
}

pub async fn complete(
    State(state): State<AppState>,
    Json(request): Json<CompleteRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .coordinator
        .complete(
            &request.agent_id,
            &request.task_id,
            request.outcome,
            request.branch,
            request.pull_request,
            request.reason,
        )
        .await?;
    Ok(StatusCode::OK)
}

pub async fn status(State(state): State<AppState>) -> Result<Json<StatusReport>, ApiError> {
    Ok(Json(state.coordinator.status().await?))
}

pub async fn cleanup(State(state): State<AppState>) -> Result<Json<CleanupResponse>, ApiError> {
    let reset = state.reaper.sweep().await?;
    Ok(Json(CleanupResponse { reset }))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string() })
}

pub async fn notifications(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<NotificationsResponse>, ApiError> {
    // Drain validates nothing about the id on purpose: an agent may drain
    // before its first heartbeat lands.
    let notifications = state.ctx.bus.drain_pending(&agent_id).await?;
    Ok(Json(NotificationsResponse { notifications }))
}
