//! SQLite implementation of the AgentRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::adapters::sqlite::util::parse_datetime;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Agent, AgentState};
use crate::domain::ports::AgentRepository;

#[derive(Clone)]
pub struct SqliteAgentRepository {
    pool: SqlitePool,
}

impl SqliteAgentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentRepository for SqliteAgentRepository {
    async fn create(&self, agent: &Agent) -> DomainResult<()> {
        let existing: Option<(String,)> = sqlx::query_as("SELECT state FROM agents WHERE id = ?")
            .bind(&agent.id)
            .fetch_optional(&self.pool)
            .await?;

        // A dead agent's id may be re-registered; a live one may not.
        if let Some((state,)) = existing {
            if AgentState::from_str(&state) != Some(AgentState::Dead) {
                return Err(DomainError::AgentConflict(agent.id.clone()));
            }
            sqlx::query("DELETE FROM agents WHERE id = ?")
                .bind(&agent.id)
                .execute(&self.pool)
                .await?;
        }

        let capabilities_json = serde_json::to_string(&agent.capabilities)?;
        sqlx::query(
            r#"INSERT INTO agents (id, capabilities, state, current_task, last_heartbeat, registered_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&agent.id)
        .bind(&capabilities_json)
        .bind(agent.state.as_str())
        .bind(&agent.current_task)
        .bind(agent.last_heartbeat.to_rfc3339())
        .bind(agent.registered_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> DomainResult<Option<Agent>> {
        let row: Option<AgentRow> = sqlx::query_as("SELECT * FROM agents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Agent::try_from).transpose()
    }

    async fn update(&self, agent: &Agent) -> DomainResult<()> {
        let capabilities_json = serde_json::to_string(&agent.capabilities)?;
        let result = sqlx::query(
            r#"UPDATE agents SET capabilities = ?, state = ?, current_task = ?,
               last_heartbeat = ? WHERE id = ?"#,
        )
        .bind(&capabilities_json)
        .bind(agent.state.as_str())
        .bind(&agent.current_task)
        .bind(agent.last_heartbeat.to_rfc3339())
        .bind(&agent.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::AgentNotFound(agent.id.clone()));
        }
        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<Agent>> {
        let rows: Vec<AgentRow> = sqlx::query_as("SELECT * FROM agents ORDER BY registered_at")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Agent::try_from).collect()
    }

    async fn heartbeat(&self, id: &str) -> DomainResult<bool> {
        let result = sqlx::query("UPDATE agents SET last_heartbeat = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    capabilities: String,
    state: String,
    current_task: Option<String>,
    last_heartbeat: String,
    registered_at: String,
}

impl TryFrom<AgentRow> for Agent {
    type Error = DomainError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        let state = AgentState::from_str(&row.state)
            .ok_or_else(|| DomainError::Serialization(format!("unknown agent state '{}'", row.state)))?;
        Ok(Self {
            id: row.id,
            capabilities: serde_json::from_str(&row.capabilities)?,
            state,
            current_task: row.current_task,
            last_heartbeat: parse_datetime(&row.last_heartbeat)?,
            registered_at: parse_datetime(&row.registered_at)?,
        })
    }
}
