//! Task repository port.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskStatus};

/// Repository interface for Task persistence.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Create a new task.
    async fn create(&self, task: &Task) -> DomainResult<()>;

    /// Get a task by id.
    async fn get(&self, id: &str) -> DomainResult<Option<Task>>;

    /// Update an existing task.
    async fn update(&self, task: &Task) -> DomainResult<()>;

    /// List all tasks.
    async fn list(&self) -> DomainResult<Vec<Task>>;

    /// List tasks by status.
    async fn list_by_status(&self, status: TaskStatus) -> DomainResult<Vec<Task>>;

    /// Fetch several tasks by id, preserving the input order for ids found.
    async fn get_many(&self, ids: &[String]) -> DomainResult<Vec<Task>>;

    /// Count tasks by status.
    async fn count_by_status(&self) -> DomainResult<HashMap<TaskStatus, u64>>;
}
