//! Drover - multi-agent task orchestration core.
//!
//! A coordinator that compiles a backlog DAG into topological phases,
//! leases tasks to concurrent agent processes under expiring claim locks,
//! supervises each agent's git-based execution, and serializes the
//! integration of completed branches into a shared mainline:
//! - Backlog loader and DAG compiler (Kahn phase peeling, cycle reporting)
//! - Coordinator HTTP service (register, heartbeat, claim, complete)
//! - Sequential merge worker (probe, quality gate, squash integration)
//! - Dead-agent reaper and durable per-agent notification queues
//! - SQLite state store in WAL mode behind repository ports

pub mod adapters;
pub mod agent;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;
