//! Quality gates.
//!
//! Runs the configured checks in order, or a default set auto-detected
//! from filesystem markers when none are configured. Required checks gate
//! progression; advisory checks are logged. Check outcomes are explicit
//! values carrying the captured output, never exceptions.

use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Config, QualityCheck};
use crate::infrastructure::process::{run_with_timeout, CommandOutput};

/// Project kind detected from filesystem markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectKind {
    Node,
    Python,
    Go,
    Rust,
    Maven,
    Gradle,
    Unknown,
}

impl ProjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Python => "python",
            Self::Go => "go",
            Self::Rust => "rust",
            Self::Maven => "maven",
            Self::Gradle => "gradle",
            Self::Unknown => "unknown",
        }
    }
}

/// Detect the project kind from well-known marker files.
pub fn detect_project_kind(dir: &Path) -> ProjectKind {
    if dir.join("package.json").exists() {
        ProjectKind::Node
    } else if dir.join("Cargo.toml").exists() {
        ProjectKind::Rust
    } else if dir.join("go.mod").exists() {
        ProjectKind::Go
    } else if dir.join("pom.xml").exists() {
        ProjectKind::Maven
    } else if dir.join("build.gradle").exists() || dir.join("build.gradle.kts").exists() {
        ProjectKind::Gradle
    } else if dir.join("pyproject.toml").exists() || dir.join("requirements.txt").exists() {
        ProjectKind::Python
    } else {
        ProjectKind::Unknown
    }
}

/// Default check set for a detected project kind.
pub fn default_checks(kind: ProjectKind) -> Vec<QualityCheck> {
    let argv = |parts: &[&str]| parts.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();
    match kind {
        ProjectKind::Node => vec![QualityCheck {
            name: "npm-test".to_string(),
            command: argv(&["npm", "test", "--silent"]),
            required: true,
        }],
        ProjectKind::Python => vec![QualityCheck {
            name: "pytest".to_string(),
            command: argv(&["python", "-m", "pytest", "-q"]),
            required: true,
        }],
        ProjectKind::Go => vec![QualityCheck {
            name: "go-test".to_string(),
            command: argv(&["go", "test", "./..."]),
            required: true,
        }],
        ProjectKind::Rust => vec![QualityCheck {
            name: "cargo-test".to_string(),
            command: argv(&["cargo", "test", "--quiet"]),
            required: true,
        }],
        ProjectKind::Maven => vec![QualityCheck {
            name: "mvn-test".to_string(),
            command: argv(&["mvn", "-q", "test"]),
            required: true,
        }],
        ProjectKind::Gradle => vec![QualityCheck {
            name: "gradle-test".to_string(),
            command: argv(&["gradle", "test"]),
            required: true,
        }],
        ProjectKind::Unknown => Vec::new(),
    }
}

/// Outcome of one executed check.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub name: String,
    pub required: bool,
    pub output: CommandOutput,
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        self.output.success()
    }
}

/// Outcomes of a full gate run.
#[derive(Debug, Clone, Default)]
pub struct GateReport {
    pub outcomes: Vec<CheckOutcome>,
}

impl GateReport {
    /// First required check that did not pass, if any.
    pub fn first_required_failure(&self) -> Option<&CheckOutcome> {
        self.outcomes.iter().find(|o| o.required && !o.passed())
    }

    pub fn passed(&self) -> bool {
        self.first_required_failure().is_none()
    }
}

/// An ordered set of checks bound by a per-check timeout.
#[derive(Debug, Clone)]
pub struct QualityGates {
    checks: Vec<QualityCheck>,
    timeout: Duration,
}

impl QualityGates {
    pub fn new(checks: Vec<QualityCheck>, timeout: Duration) -> Self {
        Self { checks, timeout }
    }

    /// Configured checks when present, otherwise the detected default set.
    pub fn resolve(config: &Config, dir: &Path) -> Self {
        let checks = if config.quality_gates.checks.is_empty() {
            let kind = detect_project_kind(dir);
            info!(kind = kind.as_str(), "quality checks auto-detected");
            default_checks(kind)
        } else {
            config.quality_gates.checks.clone()
        };
        Self::new(checks, config.timeouts.merge_step_timeout())
    }

    /// Run checks in order. Stops at the first required failure; advisory
    /// failures are logged and do not gate.
    pub async fn run(&self, dir: &Path) -> DomainResult<GateReport> {
        let mut report = GateReport::default();
        for check in &self.checks {
            let output = match run_with_timeout(&check.command, dir, self.timeout).await {
                Ok(output) => output,
                // A missing check binary is a failed check, not a crash.
                Err(DomainError::PreconditionFailed(msg)) => CommandOutput {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: msg,
                    timed_out: false,
                },
                Err(other) => return Err(other),
            };

            let outcome =
                CheckOutcome { name: check.name.clone(), required: check.required, output };

            if outcome.passed() {
                info!(check = %outcome.name, "check passed");
            } else if outcome.required {
                warn!(check = %outcome.name, output = %outcome.output.diagnostic(), "required check failed");
                report.outcomes.push(outcome);
                return Ok(report);
            } else {
                warn!(check = %outcome.name, output = %outcome.output.diagnostic(), "advisory check failed");
            }
            report.outcomes.push(outcome);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn check(name: &str, command: &[&str], required: bool) -> QualityCheck {
        QualityCheck {
            name: name.to_string(),
            command: command.iter().map(|s| (*s).to_string()).collect(),
            required,
        }
    }

    #[test]
    fn test_detect_markers() {
        let dir = TempDir::new().unwrap();
        assert_eq!(detect_project_kind(dir.path()), ProjectKind::Unknown);

        std::fs::write(dir.path().join("go.mod"), "module example.com/x\n").unwrap();
        assert_eq!(detect_project_kind(dir.path()), ProjectKind::Go);

        // Node markers win over Go when both are present.
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        assert_eq!(detect_project_kind(dir.path()), ProjectKind::Node);
    }

    #[test]
    fn test_default_checks_nonempty_for_known_kinds() {
        for kind in [
            ProjectKind::Node,
            ProjectKind::Python,
            ProjectKind::Go,
            ProjectKind::Rust,
            ProjectKind::Maven,
            ProjectKind::Gradle,
        ] {
            assert!(!default_checks(kind).is_empty(), "{kind:?}");
        }
        assert!(default_checks(ProjectKind::Unknown).is_empty());
    }

    #[tokio::test]
    async fn test_required_failure_stops_the_run() {
        let dir = TempDir::new().unwrap();
        let gates = QualityGates::new(
            vec![
                check("fails", &["false"], true),
                check("never-runs", &["true"], true),
            ],
            Duration::from_secs(10),
        );
        let report = gates.run(dir.path()).await.unwrap();
        assert!(!report.passed());
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.first_required_failure().unwrap().name, "fails");
    }

    #[tokio::test]
    async fn test_advisory_failure_does_not_gate() {
        let dir = TempDir::new().unwrap();
        let gates = QualityGates::new(
            vec![
                check("advisory", &["false"], false),
                check("required", &["true"], true),
            ],
            Duration::from_secs(10),
        );
        let report = gates.run(dir.path()).await.unwrap();
        assert!(report.passed());
        assert_eq!(report.outcomes.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_binary_counts_as_failure() {
        let dir = TempDir::new().unwrap();
        let gates = QualityGates::new(
            vec![check("ghost", &["no-such-binary-qqq"], true)],
            Duration::from_secs(10),
        );
        let report = gates.run(dir.path()).await.unwrap();
        assert!(!report.passed());
    }
}
