//! Backlog loader and DAG compiler.
//!
//! Validates raw backlog records, rejects cycles with the shortest cycle
//! path named in the error, peels topological phases with Kahn's
//! algorithm, and seeds the state store with pending tasks and phase
//! definitions (phase 1 active).

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::info;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Backlog, Phase, Task, TaskKind, TaskPriority};
use crate::domain::ports::AuditEntry;
use crate::services::context::CoordinatorContext;

/// Validates and compiles a backlog, then seeds the state store.
pub struct BacklogLoader {
    ctx: Arc<CoordinatorContext>,
}

impl BacklogLoader {
    pub fn new(ctx: Arc<CoordinatorContext>) -> Self {
        Self { ctx }
    }

    /// Validate, compile, and write the backlog to the store. Returns the
    /// phase plan. Fails fast when the store already holds tasks.
    pub async fn load(&self, backlog: &Backlog) -> DomainResult<Vec<Phase>> {
        let tasks = validate(backlog)?;
        let layers = compute_phases(&tasks)?;

        if !self.ctx.tasks.list().await?.is_empty() {
            return Err(DomainError::ValidationFailed(
                "state store already holds a backlog; use a fresh database".to_string(),
            ));
        }

        for task in &tasks {
            self.ctx.tasks.create(task).await?;
        }

        let mut phases = Vec::with_capacity(layers.len());
        for (i, task_ids) in layers.into_iter().enumerate() {
            let mut phase = Phase::new(i as u32 + 1, task_ids);
            if phase.index == 1 {
                phase.activate();
            }
            self.ctx.phases.create(&phase).await?;
            phases.push(phase);
        }

        self.ctx
            .audit
            .record(
                &AuditEntry::phase(1, "activated", "loader")
                    .with_detail(format!("{} tasks in {} phases", tasks.len(), phases.len())),
            )
            .await?;

        info!(tasks = tasks.len(), phases = phases.len(), "backlog loaded");
        Ok(phases)
    }
}

/// Validate raw records into tasks. Aggregates every problem into one
/// error message identifying the offending ids.
pub fn validate(backlog: &Backlog) -> DomainResult<Vec<Task>> {
    if backlog.tasks.is_empty() {
        return Err(DomainError::ValidationFailed("backlog is empty".to_string()));
    }

    let mut problems: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for record in &backlog.tasks {
        if record.id.is_empty() {
            problems.push("record with empty id".to_string());
        }
        if !seen.insert(record.id.as_str()) {
            problems.push(format!("duplicate task id '{}'", record.id));
        }
        if record.title.is_empty() {
            problems.push(format!("task '{}' has no title", record.id));
        }
        if TaskKind::from_str(&record.kind).is_none() {
            problems.push(format!("task '{}' has unknown kind '{}'", record.id, record.kind));
        }
        if let Some(priority) = &record.priority {
            if TaskPriority::from_str(priority).is_none() {
                problems.push(format!(
                    "task '{}' has unknown priority '{priority}'",
                    record.id
                ));
            }
        }
    }

    let ids: HashSet<&str> = backlog.tasks.iter().map(|r| r.id.as_str()).collect();
    for record in &backlog.tasks {
        for dep in &record.dependencies {
            if !ids.contains(dep.as_str()) {
                problems.push(format!(
                    "task '{}' depends on unknown task '{dep}'",
                    record.id
                ));
            }
        }
    }

    if !problems.is_empty() {
        return Err(DomainError::ValidationFailed(problems.join("; ")));
    }

    if let Some(path) = shortest_cycle(backlog) {
        return Err(DomainError::DependencyCycle { path });
    }

    Ok(backlog
        .tasks
        .iter()
        .map(|record| {
            let mut task = Task::new(
                record.id.clone(),
                record.title.clone(),
                TaskKind::from_str(&record.kind).unwrap_or_default(),
            )
            .with_description(record.description.clone());
            task.priority = record
                .priority
                .as_deref()
                .and_then(TaskPriority::from_str)
                .unwrap_or_default();
            task.acceptance_criteria = record.acceptance_criteria.clone();
            task.extra = record.extra.clone();
            for dep in &record.dependencies {
                task.depends_on.push(dep.clone());
            }
            task
        })
        .collect())
}

/// Find the shortest dependency cycle, if any, as a closed path
/// `[a, b, ..., a]`. BFS from every node over the dependency edges; ties
/// break on the lexicographically first start id.
pub fn shortest_cycle(backlog: &Backlog) -> Option<Vec<String>> {
    let graph: BTreeMap<&str, Vec<&str>> = backlog
        .tasks
        .iter()
        .map(|r| (r.id.as_str(), r.dependencies.iter().map(String::as_str).collect()))
        .collect();

    let mut best: Option<Vec<String>> = None;
    for &start in graph.keys() {
        let mut predecessor: HashMap<&str, &str> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut visited = HashSet::from([start]);

        'bfs: while let Some(node) = queue.pop_front() {
            for &next in graph.get(node).into_iter().flatten() {
                if next == start {
                    // Reconstruct start -> ... -> node -> start.
                    let mut path = vec![start.to_string()];
                    let mut cursor = node;
                    let mut tail = Vec::new();
                    while cursor != start {
                        tail.push(cursor.to_string());
                        cursor = predecessor[cursor];
                    }
                    tail.reverse();
                    path.extend(tail);
                    path.push(start.to_string());

                    if best.as_ref().map_or(true, |b| path.len() < b.len()) {
                        best = Some(path);
                    }
                    break 'bfs;
                }
                if visited.insert(next) {
                    predecessor.insert(next, node);
                    queue.push_back(next);
                }
            }
        }
    }
    best
}

/// Peel topological phases with Kahn's algorithm: phase 1 holds every task
/// with no dependencies; each later phase holds the tasks whose remaining
/// dependencies emptied when the previous phase was removed. Ids within a
/// phase are sorted for determinism.
pub fn compute_phases(tasks: &[Task]) -> DomainResult<Vec<Vec<String>>> {
    let mut remaining_deps: HashMap<&str, HashSet<&str>> = tasks
        .iter()
        .map(|t| (t.id.as_str(), t.depends_on.iter().map(String::as_str).collect()))
        .collect();

    let mut layers: Vec<Vec<String>> = Vec::new();
    while !remaining_deps.is_empty() {
        let mut layer: Vec<String> = remaining_deps
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(id, _)| (*id).to_string())
            .collect();
        layer.sort();

        if layer.is_empty() {
            // Unreachable after cycle validation; kept as a hard stop.
            let stuck: Vec<String> = remaining_deps.keys().map(|s| (*s).to_string()).collect();
            return Err(DomainError::DependencyCycle { path: stuck });
        }

        for id in &layer {
            remaining_deps.remove(id.as_str());
        }
        for deps in remaining_deps.values_mut() {
            for id in &layer {
                deps.remove(id.as_str());
            }
        }
        layers.push(layer);
    }

    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::BacklogRecord;

    fn record(id: &str, kind: &str, deps: &[&str]) -> BacklogRecord {
        BacklogRecord {
            id: id.to_string(),
            title: format!("Task {id}"),
            kind: kind.to_string(),
            priority: None,
            dependencies: deps.iter().map(|s| (*s).to_string()).collect(),
            description: String::new(),
            acceptance_criteria: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    fn backlog(records: Vec<BacklogRecord>) -> Backlog {
        Backlog { tasks: records, sprint_schedule: None }
    }

    #[test]
    fn test_empty_backlog_rejected() {
        let err = validate(&backlog(vec![])).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = validate(&backlog(vec![
            record("t1", "setup", &[]),
            record("t1", "setup", &[]),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("duplicate task id 't1'"));
    }

    #[test]
    fn test_unknown_kind_and_missing_dep_rejected() {
        let err = validate(&backlog(vec![
            record("t1", "deploy", &[]),
            record("t2", "testing", &["t9"]),
        ]))
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown kind 'deploy'"));
        assert!(msg.contains("depends on unknown task 't9'"));
    }

    #[test]
    fn test_default_priority_is_medium() {
        let tasks = validate(&backlog(vec![record("t1", "setup", &[])])).unwrap();
        assert_eq!(tasks[0].priority, TaskPriority::Medium);
    }

    #[test]
    fn test_cycle_reports_shortest_path() {
        // Two cycles: a->b->c->a (length 3) and d->e->d (length 2).
        let err = validate(&backlog(vec![
            record("a", "setup", &["c"]),
            record("b", "setup", &["a"]),
            record("c", "setup", &["b"]),
            record("d", "setup", &["e"]),
            record("e", "setup", &["d"]),
        ]))
        .unwrap_err();

        match err {
            DomainError::DependencyCycle { path } => {
                assert_eq!(path.len(), 3); // [d, e, d]
                assert_eq!(path.first(), path.last());
                assert!(path.contains(&"d".to_string()));
                assert!(path.contains(&"e".to_string()));
            }
            other => panic!("expected cycle error, got {other}"),
        }
    }

    #[test]
    fn test_self_cycle_detected() {
        let err = validate(&backlog(vec![record("a", "setup", &["a"])])).unwrap_err();
        match err {
            DomainError::DependencyCycle { path } => assert_eq!(path, vec!["a", "a"]),
            other => panic!("expected cycle error, got {other}"),
        }
    }

    #[test]
    fn test_phases_peel_in_dependency_order() {
        let tasks = validate(&backlog(vec![
            record("t1", "setup", &[]),
            record("t2", "development", &["t1"]),
            record("t3", "development", &["t1"]),
            record("t4", "testing", &["t2", "t3"]),
        ]))
        .unwrap();

        let layers = compute_phases(&tasks).unwrap();
        assert_eq!(layers, vec![
            vec!["t1".to_string()],
            vec!["t2".to_string(), "t3".to_string()],
            vec!["t4".to_string()],
        ]);
    }

    #[test]
    fn test_phase_flattening_is_topological() {
        let tasks = validate(&backlog(vec![
            record("a", "setup", &[]),
            record("b", "development", &["a"]),
            record("c", "development", &["a", "b"]),
            record("d", "testing", &["b"]),
        ]))
        .unwrap();

        let layers = compute_phases(&tasks).unwrap();
        let order: Vec<&str> = layers.iter().flatten().map(String::as_str).collect();
        let position: HashMap<&str, usize> =
            order.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        for task in &tasks {
            for dep in &task.depends_on {
                assert!(
                    position[dep.as_str()] < position[task.id.as_str()],
                    "{dep} must precede {}",
                    task.id
                );
            }
        }
    }
}
