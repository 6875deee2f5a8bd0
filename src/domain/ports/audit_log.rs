//! Append-only audit log port.
//!
//! Records phase transitions and terminal task events with the writer that
//! performed them, so single-writer-rule violations are detectable after
//! the fact.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entity kind: "task" or "phase"
    pub entity: String,
    /// Entity id
    pub entity_id: String,
    /// Event name, e.g. a status transition "done -> merged"
    pub event: String,
    /// Which component wrote it: "coordinator", "merge_worker", "reaper", "loader"
    pub writer: String,
    /// Optional free-text detail
    pub detail: Option<String>,
    /// When recorded
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn task(id: &str, event: impl Into<String>, writer: &str) -> Self {
        Self {
            entity: "task".to_string(),
            entity_id: id.to_string(),
            event: event.into(),
            writer: writer.to_string(),
            detail: None,
            created_at: Utc::now(),
        }
    }

    pub fn phase(index: u32, event: impl Into<String>, writer: &str) -> Self {
        Self {
            entity: "phase".to_string(),
            entity_id: index.to_string(),
            event: event.into(),
            writer: writer.to_string(),
            detail: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Append-only audit log interface.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append one entry.
    async fn record(&self, entry: &AuditEntry) -> DomainResult<()>;

    /// Most recent entries, newest first.
    async fn list_recent(&self, limit: u64) -> DomainResult<Vec<AuditEntry>>;
}
