//! Configuration loader with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid max_retries: {0}. Cannot be 0")]
    InvalidMaxRetries(u32),

    #[error("Invalid retry policy: max_attempts cannot be 0")]
    InvalidRetryAttempts,

    #[error("Quality check '{0}' has an empty command")]
    EmptyCheckCommand(String),

    #[error(
        "task_lock_ttl ({ttl}s) must exceed agent_timeout + reaper_interval ({floor}s), \
         or a lock could expire before the reaper resets its task"
    )]
    LockTtlTooShort { ttl: u64, floor: u64 },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .drover/config.yaml (project config)
    /// 3. .drover/local.yaml (project local overrides, optional)
    /// 4. Environment variables (DROVER_* prefix, highest priority)
    ///
    /// Configuration is always project-local so multiple backlogs can run
    /// on one machine against different repositories.
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".drover/config.yaml"))
            .merge(Yaml::file(".drover/local.yaml"))
            .merge(Env::prefixed("DROVER_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.advanced.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries(config.advanced.max_retries));
        }
        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidRetryAttempts);
        }

        for check in &config.quality_gates.checks {
            if check.command.is_empty() {
                return Err(ConfigError::EmptyCheckCommand(check.name.clone()));
            }
        }

        let floor = config.timeouts.agent_timeout + config.timeouts.reaper_interval;
        if config.timeouts.task_lock_ttl <= floor {
            return Err(ConfigError::LockTtlTooShort {
                ttl: config.timeouts.task_lock_ttl,
                floor,
            });
        }

        if config.git.main_branch.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "git.main_branch cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Advisory findings about legal-but-noteworthy settings. Logged by
    /// the coordinator at startup, once a subscriber is installed.
    pub fn lint(config: &Config) -> Vec<String> {
        let mut findings = Vec::new();

        // Completion does not depend on the lease staying live (the
        // assigned agent is authoritative), but a lease that lapses
        // mid-implementation is worth knowing about when reading lock
        // tables during an incident.
        if config.timeouts.task_lock_ttl < config.timeouts.impl_timeout {
            findings.push(format!(
                "timeouts.task_lock_ttl ({}s) is shorter than timeouts.impl_timeout ({}s); \
                 claim leases will lapse during long implementations. This is safe — the \
                 assigned agent, not the lease, authorizes completion — but raise the TTL \
                 to cover the implementation window if lock-table inspection should match \
                 in-flight work",
                config.timeouts.task_lock_ttl, config.timeouts.impl_timeout
            ));
        }

        findings
    }
}
