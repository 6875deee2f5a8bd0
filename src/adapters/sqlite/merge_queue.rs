//! SQLite implementation of the durable merge FIFO.
//!
//! Order is the AUTOINCREMENT sequence, so it survives restarts. The pop is
//! transactional (read head, delete by seq). An in-process Notify lets the
//! worker observe enqueues promptly; the timed fallback in `pop_blocking`
//! keeps it live across processes.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::adapters::sqlite::retry::with_backoff;
use crate::adapters::sqlite::util::parse_datetime;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{MergeRequest, RetryConfig};
use crate::domain::ports::MergeQueue;

#[derive(Clone)]
pub struct SqliteMergeQueue {
    pool: SqlitePool,
    retry: RetryConfig,
    enqueued: Arc<Notify>,
}

impl SqliteMergeQueue {
    pub fn new(pool: SqlitePool, retry: RetryConfig) -> Self {
        Self { pool, retry, enqueued: Arc::new(Notify::new()) }
    }

    async fn pop_once(&self) -> DomainResult<Option<MergeRequest>> {
        let mut tx = self.pool.begin().await?;

        let row: Option<MergeRow> =
            sqlx::query_as("SELECT * FROM merge_queue ORDER BY seq LIMIT 1")
                .fetch_optional(&mut *tx)
                .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query("DELETE FROM merge_queue WHERE seq = ?")
            .bind(row.seq)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(row.try_into()?))
    }
}

#[async_trait]
impl MergeQueue for SqliteMergeQueue {
    async fn enqueue(&self, request: &MergeRequest) -> DomainResult<()> {
        with_backoff(&self.retry, || async {
            sqlx::query(
                r#"INSERT INTO merge_queue (id, task_id, branch, pull_request, agent_id, retry_count, enqueued_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(request.id.to_string())
            .bind(&request.task_id)
            .bind(&request.branch)
            .bind(&request.pull_request)
            .bind(&request.agent_id)
            .bind(request.retry_count as i64)
            .bind(request.enqueued_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await?;

        self.enqueued.notify_one();
        Ok(())
    }

    async fn pop(&self) -> DomainResult<Option<MergeRequest>> {
        with_backoff(&self.retry, || self.pop_once()).await
    }

    async fn pop_blocking(&self, timeout: Duration) -> DomainResult<Option<MergeRequest>> {
        if let Some(request) = self.pop().await? {
            return Ok(Some(request));
        }

        tokio::select! {
            () = self.enqueued.notified() => {}
            () = tokio::time::sleep(timeout) => {}
        }

        self.pop().await
    }

    async fn len(&self) -> DomainResult<u64> {
        with_backoff(&self.retry, || async {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM merge_queue")
                .fetch_one(&self.pool)
                .await?;
            Ok(count as u64)
        })
        .await
    }

    async fn mark_active(&self, request: &MergeRequest) -> DomainResult<()> {
        let request_json = serde_json::to_string(request)?;
        with_backoff(&self.retry, || async {
            sqlx::query(
                r#"INSERT INTO active_merges (task_id, request, started_at) VALUES (?, ?, ?)
                   ON CONFLICT(task_id) DO UPDATE SET
                       request = excluded.request, started_at = excluded.started_at"#,
            )
            .bind(&request.task_id)
            .bind(&request_json)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn clear_active(&self, task_id: &str) -> DomainResult<()> {
        with_backoff(&self.retry, || async {
            sqlx::query("DELETE FROM active_merges WHERE task_id = ?")
                .bind(task_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn take_stale_active(&self) -> DomainResult<Vec<MergeRequest>> {
        let mut tx = self.pool.begin().await?;
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT request FROM active_merges ORDER BY started_at")
                .fetch_all(&mut *tx)
                .await?;
        sqlx::query("DELETE FROM active_merges").execute(&mut *tx).await?;
        tx.commit().await?;

        rows.into_iter()
            .map(|(json,)| serde_json::from_str(&json).map_err(Into::into))
            .collect()
    }
}

#[derive(sqlx::FromRow)]
struct MergeRow {
    #[allow(dead_code)]
    seq: i64,
    id: String,
    task_id: String,
    branch: String,
    pull_request: Option<String>,
    agent_id: String,
    retry_count: i64,
    enqueued_at: String,
}

impl TryFrom<MergeRow> for MergeRequest {
    type Error = DomainError;

    fn try_from(row: MergeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| DomainError::Serialization(format!("invalid merge id: {e}")))?,
            task_id: row.task_id,
            branch: row.branch,
            pull_request: row.pull_request,
            agent_id: row.agent_id,
            retry_count: row.retry_count as u32,
            enqueued_at: parse_datetime(&row.enqueued_at)?,
        })
    }
}
