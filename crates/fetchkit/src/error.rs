//! Error types for fetch operations.
//!
//! Errors are categorized so callers can tell a flaky network from a
//! malformed request and decide whether re-running is worthwhile.

use std::fmt;

/// Result type alias for fetch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of fetch errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Host unreachable, connection reset, non-2xx status.
    Network,
    /// The request did not complete in time.
    Timeout,
    /// The URL or response could not be interpreted.
    Format,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Timeout => "Request timed out",
            Self::Format => "Invalid request or response",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while fetching a URL.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// HTTP request failed (transport error or non-2xx status).
    #[error("request to {url} failed: {message}")]
    Http {
        /// Requested URL.
        url: String,
        /// Error message.
        message: String,
        /// HTTP status code if the server answered.
        status: Option<u16>,
    },

    /// Request exceeded the configured timeout.
    #[error("request to {url} timed out")]
    Timeout {
        /// Requested URL.
        url: String,
    },

    /// Response body could not be read.
    #[error("failed to read response from {url}: {message}")]
    Body {
        /// Requested URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// URL has no usable file name component.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl Error {
    /// Create an HTTP error.
    pub fn http(url: impl Into<String>, message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Http {
            url: url.into(),
            message: message.into(),
            status,
        }
    }

    /// Convert a ureq error, keeping the URL it was raised for.
    pub fn from_ureq(url: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::http(url, format!("HTTP {code}"), Some(code)),
            ureq::Error::Timeout(_) => Self::Timeout {
                url: url.to_string(),
            },
            other => Self::http(url, other.to_string(), None),
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Http { .. } => ErrorCategory::Network,
            Error::Timeout { .. } => ErrorCategory::Timeout,
            Error::Body { .. } | Error::InvalidUrl(_) => ErrorCategory::Format,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// HTTP status code, when the server answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => *status,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_is_network() {
        let err = Error::from_ureq("https://example.com/a.sha1", ureq::Error::StatusCode(404));
        assert_eq!(err.category(), ErrorCategory::Network);
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("HTTP 404"));
    }

    #[test]
    fn test_invalid_url_not_retryable() {
        let err = Error::InvalidUrl("https://example.com/".to_string());
        assert_eq!(err.category(), ErrorCategory::Format);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_timeout_retryable() {
        let err = Error::Timeout {
            url: "https://example.com".to_string(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.status(), None);
    }
}
