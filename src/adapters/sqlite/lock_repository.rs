//! SQLite implementation of the claim-lock lease store.
//!
//! Acquisition is a conditional upsert: the insert wins outright, and an
//! existing row may only be taken over once its lease has expired. The
//! rows_affected count tells contested from acquired. Transient connection
//! failures retry with backoff before surfacing.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::SqlitePool;
use std::time::Duration;

use crate::adapters::sqlite::retry::with_backoff;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::RetryConfig;
use crate::domain::ports::LockRepository;

#[derive(Clone)]
pub struct SqliteLockRepository {
    pool: SqlitePool,
    retry: RetryConfig,
}

impl SqliteLockRepository {
    pub fn new(pool: SqlitePool, retry: RetryConfig) -> Self {
        Self { pool, retry }
    }
}

#[async_trait]
impl LockRepository for SqliteLockRepository {
    async fn acquire(&self, task_id: &str, holder: &str, ttl: Duration) -> DomainResult<bool> {
        let ttl = ChronoDuration::from_std(ttl)
            .map_err(|e| DomainError::ValidationFailed(format!("invalid lock ttl: {e}")))?;

        with_backoff(&self.retry, || async {
            let now = Utc::now();
            let expires_at = now + ttl;

            let result = sqlx::query(
                r#"INSERT INTO task_locks (task_id, holder, acquired_at, expires_at)
                   VALUES (?, ?, ?, ?)
                   ON CONFLICT(task_id) DO UPDATE SET
                       holder = excluded.holder,
                       acquired_at = excluded.acquired_at,
                       expires_at = excluded.expires_at
                   WHERE task_locks.expires_at < ?"#,
            )
            .bind(task_id)
            .bind(holder)
            .bind(now.to_rfc3339())
            .bind(expires_at.to_rfc3339())
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;

            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn holder(&self, task_id: &str) -> DomainResult<Option<String>> {
        with_backoff(&self.retry, || async {
            let row: Option<(String,)> = sqlx::query_as(
                "SELECT holder FROM task_locks WHERE task_id = ? AND expires_at >= ?",
            )
            .bind(task_id)
            .bind(Utc::now().to_rfc3339())
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(|(holder,)| holder))
        })
        .await
    }

    async fn release(&self, task_id: &str, holder: &str) -> DomainResult<bool> {
        with_backoff(&self.retry, || async {
            let result = sqlx::query("DELETE FROM task_locks WHERE task_id = ? AND holder = ?")
                .bind(task_id)
                .bind(holder)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn force_release(&self, task_id: &str) -> DomainResult<bool> {
        with_backoff(&self.retry, || async {
            let result = sqlx::query("DELETE FROM task_locks WHERE task_id = ?")
                .bind(task_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }
}
