//! HTTP client for the coordinator API.

use reqwest::StatusCode;
use thiserror::Error;

use crate::domain::models::{Notification, Task};
use crate::infrastructure::api::types::{
    ClaimRequest, ClaimResponse, CleanupResponse, CompleteRequest, ErrorBody, HeartbeatRequest,
    NotificationsResponse, RegisterRequest, RegisterResponse,
};
use crate::services::coordinator::{CompletionOutcome, StatusReport};

/// Client-side errors, separating transport failures from API rejections.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("coordinator unreachable: {0}")]
    Http(#[from] reqwest::Error),

    #[error("coordinator rejected the request ({status}): {message}")]
    Api { status: StatusCode, kind: String, message: String },
}

impl ClientError {
    /// Whether the coordinator reported a transient state-store failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status == StatusCode::SERVICE_UNAVAILABLE)
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// JSON client for one coordinator endpoint.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    base_url: String,
    http: reqwest::Client,
}

impl CoordinatorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), http: reqwest::Client::new() }
    }

    pub async fn register(
        &self,
        preferred_id: Option<String>,
        capabilities: Vec<String>,
    ) -> ClientResult<String> {
        let response = self
            .http
            .post(format!("{}/agent/register", self.base_url))
            .json(&RegisterRequest { capabilities, preferred_id })
            .send()
            .await?;
        let body: RegisterResponse = decode(response).await?;
        Ok(body.agent_id)
    }

    pub async fn heartbeat(&self, agent_id: &str) -> ClientResult<()> {
        let response = self
            .http
            .post(format!("{}/agent/heartbeat", self.base_url))
            .json(&HeartbeatRequest { agent_id: agent_id.to_string() })
            .send()
            .await?;
        check(response).await
    }

    pub async fn claim(&self, agent_id: &str) -> ClientResult<Option<Task>> {
        let response = self
            .http
            .post(format!("{}/task/claim", self.base_url))
            .json(&ClaimRequest { agent_id: agent_id.to_string() })
            .send()
            .await?;
        let body: ClaimResponse = decode(response).await?;
        Ok(body.task)
    }

    pub async fn complete(
        &self,
        agent_id: &str,
        task_id: &str,
        outcome: CompletionOutcome,
        branch: Option<String>,
        pull_request: Option<String>,
        reason: Option<String>,
    ) -> ClientResult<()> {
        let response = self
            .http
            .post(format!("{}/task/complete", self.base_url))
            .json(&CompleteRequest {
                agent_id: agent_id.to_string(),
                task_id: task_id.to_string(),
                outcome,
                branch,
                pull_request,
                reason,
            })
            .send()
            .await?;
        check(response).await
    }

    pub async fn notifications(&self, agent_id: &str) -> ClientResult<Vec<Notification>> {
        let response = self
            .http
            .get(format!("{}/agent/{agent_id}/notifications", self.base_url))
            .send()
            .await?;
        let body: NotificationsResponse = decode(response).await?;
        Ok(body.notifications)
    }

    pub async fn status(&self) -> ClientResult<StatusReport> {
        let response = self.http.get(format!("{}/status", self.base_url)).send().await?;
        decode(response).await
    }

    pub async fn cleanup(&self) -> ClientResult<u32> {
        let response = self.http.post(format!("{}/cleanup", self.base_url)).send().await?;
        let body: CleanupResponse = decode(response).await?;
        Ok(body.reset)
    }
}

async fn api_error(response: reqwest::Response) -> ClientError {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => ClientError::Api { status, kind: body.error, message: body.message },
        Err(_) => ClientError::Api {
            status,
            kind: "unknown".to_string(),
            message: format!("status {status}"),
        },
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    Ok(response.json::<T>().await?)
}

async fn check(response: reqwest::Response) -> ClientResult<()> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    Ok(())
}
