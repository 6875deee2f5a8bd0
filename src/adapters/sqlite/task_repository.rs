//! SQLite implementation of the TaskRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::adapters::sqlite::util::{parse_datetime, parse_opt_datetime};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Task, TaskKind, TaskPriority, TaskStatus};
use crate::domain::ports::TaskRepository;

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_dependencies(&self, task: &mut Task) -> DomainResult<()> {
        let deps: Vec<(String,)> = sqlx::query_as(
            "SELECT depends_on_id FROM task_dependencies WHERE task_id = ? ORDER BY depends_on_id",
        )
        .bind(&task.id)
        .fetch_all(&self.pool)
        .await?;

        task.depends_on = deps.into_iter().map(|(id,)| id).collect();
        Ok(())
    }

    async fn rows_to_tasks(&self, rows: Vec<TaskRow>) -> DomainResult<Vec<Task>> {
        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let mut task: Task = row.try_into()?;
            self.load_dependencies(&mut task).await?;
            tasks.push(task);
        }
        Ok(tasks)
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task) -> DomainResult<()> {
        let criteria_json = serde_json::to_string(&task.acceptance_criteria)?;
        let extra_json = serde_json::to_string(&task.extra)?;

        sqlx::query(
            r#"INSERT INTO tasks (id, title, kind, priority, description, acceptance_criteria,
               status, assigned_agent, branch, pull_request, retry_count, blocked_reason, extra,
               created_at, claimed_at, completed_at, merged_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&task.id)
        .bind(&task.title)
        .bind(task.kind.as_str())
        .bind(task.priority.as_str())
        .bind(&task.description)
        .bind(&criteria_json)
        .bind(task.status.as_str())
        .bind(&task.assigned_agent)
        .bind(&task.branch)
        .bind(&task.pull_request)
        .bind(task.retry_count as i64)
        .bind(&task.blocked_reason)
        .bind(&extra_json)
        .bind(task.created_at.to_rfc3339())
        .bind(task.claimed_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.merged_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        for dep_id in &task.depends_on {
            sqlx::query(
                "INSERT OR IGNORE INTO task_dependencies (task_id, depends_on_id) VALUES (?, ?)",
            )
            .bind(&task.id)
            .bind(dep_id)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn get(&self, id: &str) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => {
                let mut task: Task = r.try_into()?;
                self.load_dependencies(&mut task).await?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, task: &Task) -> DomainResult<()> {
        let criteria_json = serde_json::to_string(&task.acceptance_criteria)?;
        let extra_json = serde_json::to_string(&task.extra)?;

        let result = sqlx::query(
            r#"UPDATE tasks SET title = ?, kind = ?, priority = ?, description = ?,
               acceptance_criteria = ?, status = ?, assigned_agent = ?, branch = ?,
               pull_request = ?, retry_count = ?, blocked_reason = ?, extra = ?,
               claimed_at = ?, completed_at = ?, merged_at = ?
               WHERE id = ?"#,
        )
        .bind(&task.title)
        .bind(task.kind.as_str())
        .bind(task.priority.as_str())
        .bind(&task.description)
        .bind(&criteria_json)
        .bind(task.status.as_str())
        .bind(&task.assigned_agent)
        .bind(&task.branch)
        .bind(&task.pull_request)
        .bind(task.retry_count as i64)
        .bind(&task.blocked_reason)
        .bind(&extra_json)
        .bind(task.claimed_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.merged_at.map(|t| t.to_rfc3339()))
        .bind(&task.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task.id.clone()));
        }

        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as("SELECT * FROM tasks ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        self.rows_to_tasks(rows).await
    }

    async fn list_by_status(&self, status: TaskStatus) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE status = ? ORDER BY id")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        self.rows_to_tasks(rows).await
    }

    async fn get_many(&self, ids: &[String]) -> DomainResult<Vec<Task>> {
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(task) = self.get(id).await? {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    async fn count_by_status(&self) -> DomainResult<HashMap<TaskStatus, u64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM tasks GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = HashMap::new();
        for (status_str, count) in rows {
            if let Some(status) = TaskStatus::from_str(&status_str) {
                counts.insert(status, count as u64);
            }
        }
        Ok(counts)
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    title: String,
    kind: String,
    priority: String,
    description: String,
    acceptance_criteria: String,
    status: String,
    assigned_agent: Option<String>,
    branch: Option<String>,
    pull_request: Option<String>,
    retry_count: i64,
    blocked_reason: Option<String>,
    extra: String,
    created_at: String,
    claimed_at: Option<String>,
    completed_at: Option<String>,
    merged_at: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let kind = TaskKind::from_str(&row.kind)
            .ok_or_else(|| DomainError::Serialization(format!("unknown task kind '{}'", row.kind)))?;
        let priority = TaskPriority::from_str(&row.priority).ok_or_else(|| {
            DomainError::Serialization(format!("unknown priority '{}'", row.priority))
        })?;
        let status = TaskStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::Serialization(format!("unknown status '{}'", row.status)))?;

        Ok(Self {
            id: row.id,
            title: row.title,
            kind,
            priority,
            description: row.description,
            acceptance_criteria: serde_json::from_str(&row.acceptance_criteria)?,
            depends_on: Vec::new(),
            status,
            assigned_agent: row.assigned_agent,
            branch: row.branch,
            pull_request: row.pull_request,
            retry_count: row.retry_count as u32,
            blocked_reason: row.blocked_reason,
            extra: serde_json::from_str(&row.extra)?,
            created_at: parse_datetime(&row.created_at)?,
            claimed_at: parse_opt_datetime(row.claimed_at.as_deref())?,
            completed_at: parse_opt_datetime(row.completed_at.as_deref())?,
            merged_at: parse_opt_datetime(row.merged_at.as_deref())?,
        })
    }
}
