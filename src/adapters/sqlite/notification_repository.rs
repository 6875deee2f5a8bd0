//! SQLite implementation of the durable notification store.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::util::parse_datetime;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Notification, NotificationKind};
use crate::domain::ports::{NotificationStore, PENDING_CAP};

#[derive(Clone)]
pub struct SqliteNotificationStore {
    pool: SqlitePool,
}

impl SqliteNotificationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for SqliteNotificationStore {
    async fn push(&self, notification: &Notification) -> DomainResult<()> {
        let data_json = serde_json::to_string(&notification.data)?;
        sqlx::query(
            r#"INSERT INTO notifications (id, version, agent_id, task_id, kind, data, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(notification.id.to_string())
        .bind(notification.version as i64)
        .bind(&notification.agent_id)
        .bind(&notification.task_id)
        .bind(notification.kind.as_str())
        .bind(&data_json)
        .bind(notification.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;

        // Trim the oldest entries past the per-agent cap.
        sqlx::query(
            r#"DELETE FROM notifications WHERE agent_id = ? AND seq NOT IN (
                   SELECT seq FROM notifications WHERE agent_id = ?
                   ORDER BY seq DESC LIMIT ?
               )"#,
        )
        .bind(&notification.agent_id)
        .bind(&notification.agent_id)
        .bind(PENDING_CAP as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn drain(&self, agent_id: &str) -> DomainResult<Vec<Notification>> {
        let mut tx = self.pool.begin().await?;

        let rows: Vec<NotificationRow> =
            sqlx::query_as("SELECT * FROM notifications WHERE agent_id = ? ORDER BY seq")
                .bind(agent_id)
                .fetch_all(&mut *tx)
                .await?;

        sqlx::query("DELETE FROM notifications WHERE agent_id = ?")
            .bind(agent_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn pending_len(&self, agent_id: &str) -> DomainResult<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE agent_id = ?")
                .bind(agent_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    #[allow(dead_code)]
    seq: i64,
    id: String,
    version: i64,
    agent_id: String,
    task_id: Option<String>,
    kind: String,
    data: String,
    created_at: String,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = DomainError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let kind = NotificationKind::from_str(&row.kind).ok_or_else(|| {
            DomainError::Serialization(format!("unknown notification kind '{}'", row.kind))
        })?;
        Ok(Self {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| DomainError::Serialization(format!("invalid notification id: {e}")))?,
            version: row.version as u32,
            agent_id: row.agent_id,
            task_id: row.task_id,
            kind,
            data: serde_json::from_str(&row.data)?,
            timestamp: parse_datetime(&row.created_at)?,
        })
    }
}
