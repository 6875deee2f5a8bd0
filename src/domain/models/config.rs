//! Configuration model for drover.
//!
//! All recognized options, with serde defaults matching the documented
//! operational defaults. Loaded hierarchically by the config loader
//! (programmatic defaults, project YAML, local overrides, environment).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::task::TaskKind;

/// Main configuration structure for drover.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Path to the git repository the coordinator integrates into
    #[serde(default = "default_repo_path")]
    pub repo_path: String,

    /// Git behavior
    #[serde(default)]
    pub git: GitConfig,

    /// Quality gates run before integration and by agents locally
    #[serde(default)]
    pub quality_gates: QualityGatesConfig,

    /// All orchestration timeouts, in seconds
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Advanced tuning knobs
    #[serde(default)]
    pub advanced: AdvancedConfig,

    /// Per-kind auto-claim gating
    #[serde(default)]
    pub agent_assignment: AgentAssignmentConfig,

    /// State store configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Coordinator HTTP endpoint
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Transient state-store retry policy
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_repo_path() -> String {
    ".".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_path: default_repo_path(),
            git: GitConfig::default(),
            quality_gates: QualityGatesConfig::default(),
            timeouts: TimeoutsConfig::default(),
            advanced: AdvancedConfig::default(),
            agent_assignment: AgentAssignmentConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            coordinator: CoordinatorConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Git behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GitConfig {
    /// Per-task branch isolation; always true for multi-agent operation
    #[serde(default = "default_true")]
    pub use_branches: bool,

    /// Gates remote push and PR creation
    #[serde(default)]
    pub push_to_remote: bool,

    /// Gates PR creation independent of push
    #[serde(default)]
    pub auto_pr: bool,

    /// Mainline branch name
    #[serde(default = "default_main_branch")]
    pub main_branch: String,

    /// Template for per-task branch names; `{agent}` and `{task}` expand
    #[serde(default = "default_branch_pattern")]
    pub branch_pattern: String,
}

const fn default_true() -> bool {
    true
}

fn default_main_branch() -> String {
    "main".to_string()
}

fn default_branch_pattern() -> String {
    "{agent}/task-{task}".to_string()
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            use_branches: true,
            push_to_remote: false,
            auto_pr: false,
            main_branch: default_main_branch(),
            branch_pattern: default_branch_pattern(),
        }
    }
}

impl GitConfig {
    /// Expand the branch pattern for an agent/task pair.
    pub fn branch_for(&self, agent_id: &str, task_id: &str) -> String {
        self.branch_pattern
            .replace("{agent}", agent_id)
            .replace("{task}", task_id)
    }
}

/// One configured quality check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QualityCheck {
    /// Display name
    pub name: String,
    /// Argv list; never passed through a shell
    pub command: Vec<String>,
    /// Required checks gate progression; advisory checks are logged
    #[serde(default = "default_true")]
    pub required: bool,
}

/// Quality gates configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QualityGatesConfig {
    /// Ordered list of checks; empty means auto-detect by project kind
    #[serde(default)]
    pub checks: Vec<QualityCheck>,
}

/// All orchestration timeouts, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutsConfig {
    /// Claim lock TTL; keep at roughly 2x agent_timeout so the lock cannot
    /// expire before the reaper resets the task. The lease serializes
    /// claim-time contention only: it may be shorter than impl_timeout,
    /// because completion authority is the task's assigned agent and only
    /// the reaper ever resets a claim. A TTL >= impl_timeout keeps the
    /// lease alive for the whole implementation window anyway.
    #[serde(default = "default_task_lock_ttl")]
    pub task_lock_ttl: u64,

    /// Heartbeat age after which an agent is considered dead
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout: u64,

    /// Interval between agent heartbeats
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,

    /// Sleep between claim attempts when no task is available
    #[serde(default = "default_claim_wait")]
    pub claim_wait: u64,

    /// Poll interval while waiting for an implementation commit
    #[serde(default = "default_impl_poll")]
    pub impl_poll: u64,

    /// Wall-clock bound on the implementation wait
    #[serde(default = "default_impl_timeout")]
    pub impl_timeout: u64,

    /// Wall-clock bound on one fix-loop iteration
    #[serde(default = "default_fix_timeout")]
    pub fix_timeout: u64,

    /// Interval between reaper sweeps
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval: u64,

    /// Bound on each merge worker subprocess step
    #[serde(default = "default_merge_step_timeout")]
    pub merge_step_timeout: u64,
}

const fn default_task_lock_ttl() -> u64 {
    600
}
const fn default_agent_timeout() -> u64 {
    300
}
const fn default_heartbeat_interval() -> u64 {
    30
}
const fn default_claim_wait() -> u64 {
    3
}
const fn default_impl_poll() -> u64 {
    10
}
const fn default_impl_timeout() -> u64 {
    3600
}
const fn default_fix_timeout() -> u64 {
    1800
}
const fn default_reaper_interval() -> u64 {
    60
}
const fn default_merge_step_timeout() -> u64 {
    1800
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            task_lock_ttl: default_task_lock_ttl(),
            agent_timeout: default_agent_timeout(),
            heartbeat_interval: default_heartbeat_interval(),
            claim_wait: default_claim_wait(),
            impl_poll: default_impl_poll(),
            impl_timeout: default_impl_timeout(),
            fix_timeout: default_fix_timeout(),
            reaper_interval: default_reaper_interval(),
            merge_step_timeout: default_merge_step_timeout(),
        }
    }
}

impl TimeoutsConfig {
    pub fn task_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.task_lock_ttl)
    }
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout)
    }
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval)
    }
    pub fn claim_wait(&self) -> Duration {
        Duration::from_secs(self.claim_wait)
    }
    pub fn impl_poll(&self) -> Duration {
        Duration::from_secs(self.impl_poll)
    }
    pub fn impl_timeout(&self) -> Duration {
        Duration::from_secs(self.impl_timeout)
    }
    pub fn fix_timeout(&self) -> Duration {
        Duration::from_secs(self.fix_timeout)
    }
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval)
    }
    pub fn merge_step_timeout(&self) -> Duration {
        Duration::from_secs(self.merge_step_timeout)
    }
}

/// Advanced tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AdvancedConfig {
    /// Bound on merge retries before a task fails terminally
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Bound on fix-loop iterations per task
    #[serde(default = "default_max_fix_iterations")]
    pub max_fix_iterations: u32,
}

const fn default_max_retries() -> u32 {
    3
}
const fn default_max_fix_iterations() -> u32 {
    3
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            max_fix_iterations: default_max_fix_iterations(),
        }
    }
}

/// Per-kind auto-claim gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct KindGate {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Per-kind auto-claim gating; kinds absent from the map are enabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentAssignmentConfig(pub HashMap<String, KindGate>);

impl AgentAssignmentConfig {
    /// Whether auto-claim is enabled for the given kind.
    pub fn enabled_for(&self, kind: TaskKind) -> bool {
        self.0.get(kind.as_str()).map_or(true, |gate| gate.enabled)
    }
}

/// State store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".drover/drover.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Coordinator HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CoordinatorConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    7350
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl CoordinatorConfig {
    /// Socket address string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL agents dial.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Transient state-store retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// First backoff interval, in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff multiplier between attempts
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Total attempts before surfacing a transient failure
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

const fn default_initial_backoff_ms() -> u64 {
    1000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_max_attempts() -> u32 {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.git.use_branches);
        assert!(!config.git.push_to_remote);
        assert_eq!(config.git.main_branch, "main");
        assert_eq!(config.timeouts.task_lock_ttl, 600);
        assert_eq!(config.timeouts.agent_timeout, 300);
        assert_eq!(config.advanced.max_retries, 3);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_lock_ttl_covers_reaper_window() {
        let t = TimeoutsConfig::default();
        // The lock must outlive a missed-heartbeat window plus one sweep.
        assert!(t.task_lock_ttl > t.agent_timeout + t.reaper_interval);
    }

    #[test]
    fn test_branch_pattern_expansion() {
        let git = GitConfig::default();
        assert_eq!(git.branch_for("agent-1", "t42"), "agent-1/task-t42");
    }

    #[test]
    fn test_kind_gating_defaults_enabled() {
        let gates = AgentAssignmentConfig::default();
        assert!(gates.enabled_for(TaskKind::Development));

        let mut map = HashMap::new();
        map.insert("security".to_string(), KindGate { enabled: false });
        let gates = AgentAssignmentConfig(map);
        assert!(!gates.enabled_for(TaskKind::Security));
        assert!(gates.enabled_for(TaskKind::Review));
    }

    #[test]
    fn test_deserialize_partial_yaml() {
        let yaml = r"
git:
  push_to_remote: true
  main_branch: trunk
timeouts:
  agent_timeout: 120
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.git.push_to_remote);
        assert_eq!(config.git.main_branch, "trunk");
        assert_eq!(config.timeouts.agent_timeout, 120);
        // Untouched sections keep their defaults.
        assert_eq!(config.timeouts.heartbeat_interval, 30);
        assert_eq!(config.database.path, ".drover/drover.db");
    }
}
