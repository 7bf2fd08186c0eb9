//! Core types for runs and their reports

use crate::error::{Error, ErrorCategory};
use serde::Serialize;
use std::process::Output;

/// Output of a command executed on a host
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code().unwrap_or(-1),
        }
    }
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: Vec::new(),
            exit_code: 0,
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(exit_code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    /// Whether the run has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// What happened to one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Host already matched the desired state
    NoChange,
    /// Corrective actions were applied
    Changed,
    /// Corrective actions are needed (dry run, nothing applied)
    WouldChange,
    /// The operation's condition did not hold
    Skipped { reason: String },
    /// The operation failed; the run halted here
    Failed {
        error: String,
        category: ErrorCategory,
    },
}

impl Outcome {
    /// Whether the operation changed (or would change) the host
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Changed | Self::WouldChange)
    }

    /// Whether the operation failed
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Log entry for one evaluated operation
#[derive(Debug, Clone, Serialize)]
pub struct OperationReport {
    pub name: String,
    pub outcome: Outcome,
    /// Actions applied (or planned, in a dry run)
    pub actions: Vec<String>,
}

impl OperationReport {
    pub fn new(name: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            name: name.into(),
            outcome,
            actions: Vec::new(),
        }
    }

    pub fn with_actions(mut self, actions: Vec<String>) -> Self {
        self.actions = actions;
        self
    }

    /// Whether the operation changed (or would change) the host
    pub fn changed(&self) -> bool {
        self.outcome.is_change()
    }
}

/// Result of one host's run
#[derive(Debug, Serialize)]
pub struct RunResult {
    pub host: String,
    pub status: RunStatus,
    /// Evaluated operations, in declaration order
    pub reports: Vec<OperationReport>,
    /// Operations never evaluated because the run halted
    pub not_run: Vec<String>,
    /// First fatal error
    #[serde(skip)]
    pub error: Option<Error>,
}

impl RunResult {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            status: RunStatus::Pending,
            reports: Vec::new(),
            not_run: Vec::new(),
            error: None,
        }
    }

    /// A run that failed before its first operation (e.g. the deploy could
    /// not be declared)
    pub fn failed_before_start(host: impl Into<String>, error: Error) -> Self {
        Self {
            status: RunStatus::Failed,
            error: Some(error),
            ..Self::new(host)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Name of the operation that halted the run
    pub fn failed_operation(&self) -> Option<&str> {
        self.reports
            .iter()
            .find(|r| r.outcome.is_failure())
            .map(|r| r.name.as_str())
    }

    /// Number of operations that changed (or would change) the host
    pub fn changed_count(&self) -> usize {
        self.reports.iter().filter(|r| r.changed()).count()
    }

    /// Find the report for an operation by name (first match)
    pub fn report(&self, name: &str) -> Option<&OperationReport> {
        self.reports.iter().find(|r| r.name == name)
    }
}

/// Summary of execution results across hosts
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecuteSummary {
    pub changed: usize,
    pub would_change: usize,
    pub no_change: usize,
    pub skipped: usize,
    pub failed: usize,
    pub not_run: usize,
    pub hosts_succeeded: usize,
    pub hosts_failed: usize,
}

impl ExecuteSummary {
    /// Summarise a set of runs
    pub fn from_runs(runs: &[RunResult]) -> Self {
        let mut summary = Self::default();
        for run in runs {
            summary.add_run(run);
        }
        summary
    }

    /// Add a run to the summary
    pub fn add_run(&mut self, run: &RunResult) {
        for report in &run.reports {
            self.add_outcome(&report.outcome);
        }
        self.not_run += run.not_run.len();
        if run.is_success() {
            self.hosts_succeeded += 1;
        } else {
            self.hosts_failed += 1;
        }
    }

    /// Add an outcome to the summary
    pub fn add_outcome(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::NoChange => self.no_change += 1,
            Outcome::Changed => self.changed += 1,
            Outcome::WouldChange => self.would_change += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Total number of changes made or planned
    pub fn total_changes(&self) -> usize {
        self.changed + self.would_change
    }

    /// Check if every host succeeded
    pub fn is_success(&self) -> bool {
        self.hosts_failed == 0
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Evaluate only, apply nothing
    pub dry_run: bool,
    /// Number of hosts converged in parallel
    pub jobs: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
        }
    }
}
