//! Backlog input model.
//!
//! The backlog is structured external config: a list of raw task records,
//! optionally wrapped in a mapping that may carry an advisory
//! `sprintSchedule` ordering. Kinds and priorities stay as raw strings here
//! so the loader can report validation errors that name the offending ids.

use serde::{Deserialize, Serialize};

/// One raw task record as authored in the backlog file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklogRecord {
    /// Opaque id, unique within the backlog
    pub id: String,
    /// Human-readable title
    pub title: String,
    /// Kind name; validated against the closed kind set by the loader
    pub kind: String,
    /// Priority shorthand (H/M/L) or full name; defaults to medium
    #[serde(default)]
    pub priority: Option<String>,
    /// Task ids this record depends on
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Detailed description
    #[serde(default)]
    pub description: String,
    /// Free-text acceptance criteria
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Unknown fields, preserved but not interpreted
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The whole backlog document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Backlog {
    /// Task records forming the DAG
    #[serde(default)]
    pub tasks: Vec<BacklogRecord>,
    /// Advisory ordering; the phase compiler is authoritative
    #[serde(default, rename = "sprintSchedule", skip_serializing_if = "Option::is_none")]
    pub sprint_schedule: Option<serde_json::Value>,
}

impl Backlog {
    /// Parse a backlog from YAML. Accepts either a bare list of records or
    /// a mapping with `tasks` (and optionally `sprintSchedule`).
    pub fn from_yaml(input: &str) -> Result<Self, serde_yaml::Error> {
        let value: serde_yaml::Value = serde_yaml::from_str(input)?;
        if value.is_sequence() {
            let tasks: Vec<BacklogRecord> = serde_yaml::from_value(value)?;
            return Ok(Self { tasks, sprint_schedule: None });
        }
        serde_yaml::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_list() {
        let yaml = r"
- id: t1
  title: Scaffold the service
  kind: setup
- id: t2
  title: Implement the endpoint
  kind: development
  priority: H
  dependencies: [t1]
";
        let backlog = Backlog::from_yaml(yaml).unwrap();
        assert_eq!(backlog.tasks.len(), 2);
        assert_eq!(backlog.tasks[1].dependencies, vec!["t1"]);
        assert_eq!(backlog.tasks[1].priority.as_deref(), Some("H"));
        assert!(backlog.sprint_schedule.is_none());
    }

    #[test]
    fn test_parse_wrapped_with_sprint_schedule() {
        let yaml = r"
sprintSchedule:
  - [t1]
  - [t2]
tasks:
  - id: t1
    title: First
    kind: setup
  - id: t2
    title: Second
    kind: testing
    dependencies: [t1]
";
        let backlog = Backlog::from_yaml(yaml).unwrap();
        assert_eq!(backlog.tasks.len(), 2);
        assert!(backlog.sprint_schedule.is_some());
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let yaml = r"
- id: t1
  title: First
  kind: setup
  estimate: 5d
  labels: [infra, urgent]
";
        let backlog = Backlog::from_yaml(yaml).unwrap();
        let extra = &backlog.tasks[0].extra;
        assert_eq!(extra.get("estimate").and_then(|v| v.as_str()), Some("5d"));
        assert!(extra.get("labels").map(|v| v.is_array()).unwrap_or(false));
    }
}
