//! HTTP backend built on a blocking ureq agent.

use crate::backend::Fetcher;
use crate::error::{Error, Result};
use std::time::Duration;

/// Maximum download size (release tarballs stay well below this).
const MAX_BODY_SIZE: u64 = 512 * 1024 * 1024;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const USER_AGENT: &str = concat!("fetchkit/", env!("CARGO_PKG_VERSION"));

/// Fetcher backed by a real HTTP client.
pub struct HttpFetcher {
    agent: ureq::Agent,
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a fetcher whose requests fail after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
            timeout,
        }
    }

    /// Configured per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("GET {url}");

        let mut response = self
            .agent
            .get(url)
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| Error::from_ureq(url, e))?;

        let bytes = response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_SIZE)
            .read_to_vec()
            .map_err(|e| match e {
                ureq::Error::Timeout(_) => Error::Timeout {
                    url: url.to_string(),
                },
                other => Error::Body {
                    url: url.to_string(),
                    message: other.to_string(),
                },
            })?;

        log::debug!("GET {url}: {} bytes", bytes.len());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout() {
        let fetcher = HttpFetcher::default();
        assert_eq!(fetcher.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_custom_timeout() {
        let fetcher = HttpFetcher::with_timeout(Duration::from_secs(5));
        assert_eq!(fetcher.timeout(), Duration::from_secs(5));
    }
}
