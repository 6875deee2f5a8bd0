//! SQLite implementation of the PhaseRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::adapters::sqlite::util::parse_opt_datetime;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Phase, PhaseStatus};
use crate::domain::ports::PhaseRepository;

#[derive(Clone)]
pub struct SqlitePhaseRepository {
    pool: SqlitePool,
}

impl SqlitePhaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PhaseRepository for SqlitePhaseRepository {
    async fn create(&self, phase: &Phase) -> DomainResult<()> {
        let task_ids_json = serde_json::to_string(&phase.task_ids)?;
        sqlx::query(
            "INSERT INTO phases (idx, task_ids, status, started_at, completed_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(phase.index as i64)
        .bind(&task_ids_json)
        .bind(phase.status.as_str())
        .bind(phase.started_at.map(|t| t.to_rfc3339()))
        .bind(phase.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, index: u32) -> DomainResult<Option<Phase>> {
        let row: Option<PhaseRow> = sqlx::query_as("SELECT * FROM phases WHERE idx = ?")
            .bind(index as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Phase::try_from).transpose()
    }

    async fn update(&self, phase: &Phase) -> DomainResult<()> {
        let task_ids_json = serde_json::to_string(&phase.task_ids)?;
        let result = sqlx::query(
            "UPDATE phases SET task_ids = ?, status = ?, started_at = ?, completed_at = ? WHERE idx = ?",
        )
        .bind(&task_ids_json)
        .bind(phase.status.as_str())
        .bind(phase.started_at.map(|t| t.to_rfc3339()))
        .bind(phase.completed_at.map(|t| t.to_rfc3339()))
        .bind(phase.index as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ValidationFailed(format!(
                "phase {} does not exist",
                phase.index
            )));
        }
        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<Phase>> {
        let rows: Vec<PhaseRow> = sqlx::query_as("SELECT * FROM phases ORDER BY idx")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Phase::try_from).collect()
    }

    async fn active(&self) -> DomainResult<Option<Phase>> {
        let row: Option<PhaseRow> =
            sqlx::query_as("SELECT * FROM phases WHERE status = 'active' ORDER BY idx LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        row.map(Phase::try_from).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct PhaseRow {
    idx: i64,
    task_ids: String,
    status: String,
    started_at: Option<String>,
    completed_at: Option<String>,
}

impl TryFrom<PhaseRow> for Phase {
    type Error = DomainError;

    fn try_from(row: PhaseRow) -> Result<Self, Self::Error> {
        let status = PhaseStatus::from_str(&row.status).ok_or_else(|| {
            DomainError::Serialization(format!("unknown phase status '{}'", row.status))
        })?;
        Ok(Self {
            index: row.idx as u32,
            task_ids: serde_json::from_str(&row.task_ids)?,
            status,
            started_at: parse_opt_datetime(row.started_at.as_deref())?,
            completed_at: parse_opt_datetime(row.completed_at.as_deref())?,
        })
    }
}
