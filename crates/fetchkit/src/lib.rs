//! # fetchkit
//!
//! Blocking downloads of release assets and resolution of the checksum files
//! published next to them.
//!
//! ```no_run
//! use fetchkit::checksum::{self, Algorithm};
//! use fetchkit::{Fetcher, HttpFetcher};
//!
//! let fetcher = HttpFetcher::new();
//! let url = "https://github.com/concourse/concourse/releases/download/v7.13.1/concourse-7.13.1-linux-amd64.tgz";
//!
//! if let Some(expected) = checksum::resolve(&fetcher, url, Algorithm::Sha1).unwrap() {
//!     let bytes = fetcher.fetch(url).unwrap();
//!     assert!(expected.matches(&bytes));
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod checksum;
pub mod error;

pub use backend::http::HttpFetcher;
pub use backend::{Fetcher, MockFetcher};
pub use checksum::{Algorithm, Checksum};
pub use error::{Error, ErrorCategory, Result};
