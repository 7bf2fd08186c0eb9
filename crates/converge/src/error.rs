//! Error taxonomy for convergence runs.
//!
//! Every error halts the run of the host it happened on. Categories only
//! decide how the failure is presented and whether re-running makes sense.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Result type alias for convergence operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of convergence errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Host could not be reached.
    Connectivity,
    /// Malformed fact query or declaration.
    Configuration,
    /// A corrective action failed on the host.
    Operation,
    /// Downloaded content did not match its checksum.
    Integrity,
    /// A remote command exceeded its deadline.
    Timeout,
}

impl ErrorCategory {
    /// Whether re-running the deploy may succeed without changing it.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity | Self::Operation | Self::Timeout)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Connectivity => "Host unreachable",
            Self::Configuration => "Invalid declaration",
            Self::Operation => "Operation failed",
            Self::Integrity => "Checksum mismatch",
            Self::Timeout => "Timed out",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors raised while querying facts or applying operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport could not reach the host.
    #[error("cannot reach {host}: {message}")]
    Connectivity {
        /// Host name.
        host: String,
        /// What went wrong.
        message: String,
    },

    /// A fact query was malformed or its output could not be parsed.
    #[error("invalid fact query: {0}")]
    InvalidFactQuery(String),

    /// Declaration or inventory error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A command exited with a non-zero status.
    #[error("command `{command}` exited with status {exit_code}: {stderr}")]
    Command {
        /// Command line as sent to the host.
        command: String,
        /// Exit status (-1 when killed by a signal).
        exit_code: i32,
        /// Trimmed standard error.
        stderr: String,
    },

    /// Downloaded content did not hash to the expected digest.
    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    Integrity {
        /// Source URL.
        url: String,
        /// Expected digest.
        expected: String,
        /// Digest of the received content.
        actual: String,
    },

    /// A command did not finish in time.
    #[error("command `{command}` timed out after {after:?}")]
    Timeout {
        /// Command line as sent to the host.
        command: String,
        /// Configured deadline.
        after: Duration,
    },

    /// The companion checksum file could not be fetched.
    #[error("failed to fetch checksum for {url}: {source}")]
    ChecksumFetch {
        /// Asset URL.
        url: String,
        /// Underlying fetch error.
        source: fetchkit::Error,
    },

    /// An asset download failed.
    #[error("download failed: {source}")]
    Download {
        /// Underlying fetch error.
        source: fetchkit::Error,
    },

    /// An operation failed; wraps the first error it hit.
    #[error("operation '{operation}' failed: {cause}")]
    Operation {
        /// Name of the failing operation.
        operation: String,
        /// What went wrong.
        cause: Box<Error>,
    },
}

impl Error {
    /// Create a connectivity error.
    pub fn connectivity(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connectivity {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Wrap `cause` as the failure of `operation`.
    pub fn operation(operation: impl Into<String>, cause: Error) -> Self {
        Self::Operation {
            operation: operation.into(),
            cause: Box::new(cause),
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Connectivity { .. } => ErrorCategory::Connectivity,
            Error::InvalidFactQuery(_) | Error::Config(_) => ErrorCategory::Configuration,
            Error::Command { .. } => ErrorCategory::Operation,
            Error::Integrity { .. } => ErrorCategory::Integrity,
            Error::Timeout { .. } => ErrorCategory::Timeout,
            Error::ChecksumFetch { source, .. } | Error::Download { source } => {
                match source.category() {
                    fetchkit::ErrorCategory::Timeout => ErrorCategory::Timeout,
                    fetchkit::ErrorCategory::Network => ErrorCategory::Connectivity,
                    fetchkit::ErrorCategory::Format => ErrorCategory::Configuration,
                }
            }
            Error::Operation { cause, .. } => cause.category(),
        }
    }

    /// Whether re-running the deploy may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Name of the failing operation, if this is an operation error.
    #[must_use]
    pub fn operation_name(&self) -> Option<&str> {
        match self {
            Error::Operation { operation, .. } => Some(operation),
            _ => None,
        }
    }

    /// The innermost cause.
    #[must_use]
    pub fn root(&self) -> &Error {
        match self {
            Error::Operation { cause, .. } => cause.root(),
            other => other,
        }
    }
}
