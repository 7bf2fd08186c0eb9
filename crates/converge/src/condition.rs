//! Conditions gating operations, and the record of what changed so far.

use crate::error::Result;
use crate::host::Host;
use std::collections::HashMap;
use std::fmt;
use std::ops;

/// Which operations of the current run changed the host.
#[derive(Debug, Default, Clone)]
pub struct ChangeTracker {
    changed: HashMap<String, bool>,
}

impl ChangeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of operation `name`. A later record with the same
    /// name overrides the earlier one.
    pub fn record(&mut self, name: &str, changed: bool) {
        self.changed.insert(name.to_string(), changed);
    }

    /// Whether operation `name` ran and changed the host.
    #[must_use]
    pub fn changed(&self, name: &str) -> bool {
        self.changed.get(name).copied().unwrap_or(false)
    }
}

/// Predicate over facts and earlier outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// An earlier operation with this name changed the host.
    Changed(String),
    /// Something exists at the path.
    Exists(String),
    /// Nothing exists at the path.
    Missing(String),
    GroupMissing(String),
    UserMissing(String),
    /// Some line of the file matches the pattern.
    PatternFound { path: String, pattern: String },
    /// No line of the file matches the pattern.
    PatternMissing { path: String, pattern: String },
    /// Trimmed stdout of the command equals `expected`.
    CommandOutputIs { command: String, expected: String },
    Not(Box<Condition>),
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Condition {
    pub fn changed(name: impl Into<String>) -> Self {
        Self::Changed(name.into())
    }

    pub fn exists(path: impl Into<String>) -> Self {
        Self::Exists(path.into())
    }

    pub fn missing(path: impl Into<String>) -> Self {
        Self::Missing(path.into())
    }

    pub fn pattern_found(path: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::PatternFound {
            path: path.into(),
            pattern: pattern.into(),
        }
    }

    /// Evaluate against the host's facts and the run so far.
    pub fn evaluate(&self, host: &mut Host, tracker: &ChangeTracker) -> Result<bool> {
        Ok(match self {
            Self::Changed(name) => tracker.changed(name),
            Self::Exists(path) => host.path(path)?.is_some(),
            Self::Missing(path) => host.path(path)?.is_none(),
            Self::GroupMissing(name) => !host.groups()?.contains(name),
            Self::UserMissing(name) => !host.users()?.contains(name),
            Self::PatternFound { path, pattern } => !host.find_in_file(path, pattern)?.is_empty(),
            Self::PatternMissing { path, pattern } => {
                host.find_in_file(path, pattern)?.is_empty()
            }
            Self::CommandOutputIs { command, expected } => host.command(command)? == *expected,
            Self::Not(inner) => !inner.evaluate(host, tracker)?,
            Self::All(conditions) => {
                for condition in conditions {
                    if !condition.evaluate(host, tracker)? {
                        return Ok(false);
                    }
                }
                true
            }
            Self::Any(conditions) => {
                for condition in conditions {
                    if condition.evaluate(host, tracker)? {
                        return Ok(true);
                    }
                }
                false
            }
        })
    }
}

impl ops::Not for Condition {
    type Output = Self;

    fn not(self) -> Self {
        Self::Not(Box::new(self))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Changed(name) => write!(f, "'{name}' changed"),
            Self::Exists(path) => write!(f, "{path} exists"),
            Self::Missing(path) => write!(f, "{path} is missing"),
            Self::GroupMissing(name) => write!(f, "group {name} is missing"),
            Self::UserMissing(name) => write!(f, "user {name} is missing"),
            Self::PatternFound { path, pattern } => write!(f, "{path} matches /{pattern}/"),
            Self::PatternMissing { path, pattern } => {
                write!(f, "{path} does not match /{pattern}/")
            }
            Self::CommandOutputIs { command, expected } => {
                write!(f, "`{command}` prints {expected:?}")
            }
            Self::Not(inner) => write!(f, "not ({inner})"),
            Self::All(conditions) => write_joined(f, conditions, " and "),
            Self::Any(conditions) => write_joined(f, conditions, " or "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, conditions: &[Condition], sep: &str) -> fmt::Result {
    for (i, condition) in conditions.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "({condition})")?;
    }
    Ok(())
}
