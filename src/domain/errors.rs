//! Domain errors for the drover orchestration core.

use thiserror::Error;

/// Domain-level errors that can occur while orchestrating the backlog.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent id already registered: {0}")]
    AgentConflict(String),

    #[error("Claim lock for task {task} not held by agent {agent}")]
    LockNotHeld { task: String, agent: String },

    #[error("Task {task} is not assigned to agent {agent}")]
    WrongAgent { task: String, agent: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Precondition violated: {0}")]
    PreconditionFailed(String),

    #[error("Transient state-store failure: {0}")]
    Transient(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Git operation failed: {0}")]
    Git(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Whether this error came from a transient state-store condition and
    /// the operation may succeed if retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::Transient(err.to_string())
            }
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_message_lists_path() {
        let err = DomainError::DependencyCycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn test_transient_classification() {
        assert!(DomainError::Transient("pool timed out".into()).is_transient());
        assert!(!DomainError::TaskNotFound("t1".into()).is_transient());
    }
}
