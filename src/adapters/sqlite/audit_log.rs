//! SQLite implementation of the append-only audit log.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::adapters::sqlite::util::parse_datetime;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{AuditEntry, AuditLog};

#[derive(Clone)]
pub struct SqliteAuditLog {
    pool: SqlitePool,
}

impl SqliteAuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for SqliteAuditLog {
    async fn record(&self, entry: &AuditEntry) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO audit_log (entity, entity_id, event, writer, detail, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&entry.entity)
        .bind(&entry.entity_id)
        .bind(&entry.event)
        .bind(&entry.writer)
        .bind(&entry.detail)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_recent(&self, limit: u64) -> DomainResult<Vec<AuditEntry>> {
        let rows: Vec<AuditRow> =
            sqlx::query_as("SELECT * FROM audit_log ORDER BY seq DESC LIMIT ?")
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(AuditEntry::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    #[allow(dead_code)]
    seq: i64,
    entity: String,
    entity_id: String,
    event: String,
    writer: String,
    detail: Option<String>,
    created_at: String,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = DomainError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(Self {
            entity: row.entity,
            entity_id: row.entity_id,
            event: row.event,
            writer: row.writer,
            detail: row.detail,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
