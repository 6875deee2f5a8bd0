//! Shared row-mapping helpers for the sqlite adapters.

use chrono::{DateTime, Utc};

use crate::domain::errors::{DomainError, DomainResult};

/// Parse an RFC 3339 timestamp column.
pub fn parse_datetime(value: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::Serialization(format!("invalid timestamp '{value}': {e}")))
}

/// Parse an optional RFC 3339 timestamp column.
pub fn parse_opt_datetime(value: Option<&str>) -> DomainResult<Option<DateTime<Utc>>> {
    value.map(parse_datetime).transpose()
}
