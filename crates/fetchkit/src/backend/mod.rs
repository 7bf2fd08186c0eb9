//! Fetch backends.
//!
//! The [`Fetcher`] trait is the only thing the rest of the workspace knows
//! about the network. [`http::HttpFetcher`] talks to real servers,
//! [`MockFetcher`] serves canned responses from memory.
//!
//! ```
//! use fetchkit::backend::{Fetcher, MockFetcher};
//!
//! let mock = MockFetcher::new();
//! mock.add_body("https://example.com/tool.tgz", b"payload".to_vec());
//!
//! assert_eq!(mock.fetch("https://example.com/tool.tgz").unwrap(), b"payload");
//! assert!(mock.fetch("https://example.com/missing").is_err());
//! ```

pub mod http;

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Source of remote content.
pub trait Fetcher: Send + Sync {
    /// Fetch the full body of `url`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Http` for transport failures and non-2xx answers,
    /// `Error::Timeout` when the request exceeds its deadline.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;

    /// Fetch `url` as UTF-8 text (lossy).
    fn fetch_text(&self, url: &str) -> Result<String> {
        let bytes = self.fetch(url)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        (**self).fetch(url)
    }
}

/// In-memory fetcher for tests and offline runs.
///
/// Unknown URLs answer with HTTP 404. Every request is recorded.
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    responses: Arc<Mutex<HashMap<String, std::result::Result<Vec<u8>, Error>>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    /// Create a new empty mock fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    pub fn add_body(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), Ok(body.into()));
    }

    /// Answer `url` with the given HTTP status.
    pub fn add_status(&self, url: impl Into<String>, status: u16) {
        let url = url.into();
        let err = Error::http(url.clone(), format!("HTTP {status}"), Some(status));
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url, Err(err));
    }

    /// Answer `url` with an arbitrary error.
    pub fn add_error(&self, url: impl Into<String>, err: Error) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), Err(err));
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        let responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        match responses.get(url) {
            Some(response) => response.clone(),
            None => Err(Error::http(url, "HTTP 404", Some(404))),
        }
    }
}
