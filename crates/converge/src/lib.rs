//! # Converge
//!
//! An idempotent, convergent host-configuration engine.
//!
//! A deploy is an ordered list of [`Operation`]s, each declaring a piece of
//! desired state. The [`Executor`] evaluates every operation against the
//! host's current facts, applies the minimal corrective [`Action`]s when the
//! host differs, and records a structured outcome per operation.
//!
//! ## Core Concepts
//!
//! - **Transport**: runs a shell command on a host ([`ShellTransport`],
//!   [`MockTransport`])
//! - **Facts**: typed, cached, read-only queries ([`FactQuery`])
//! - **Operation**: desired state plus an optional [`Condition`]
//! - **Executor**: strictly sequential per host, parallel across hosts
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use converge::operation::{Line, Packages, Service};
//! use converge::{Executor, Host, HttpFetcher, Operation, OsFamily, ShellTransport};
//!
//! let transport = ShellTransport::with_connector(
//!     "lab",
//!     vec!["ssh".into(), "root@lab".into()],
//! );
//! let mut host = Host::new("lab", OsFamily::Alpine, transport);
//!
//! let operations = vec![
//!     Operation::new("Install postgres", Packages::new(["postgresql16"])),
//!     Operation::new("Start postgres", Service::running("postgresql").enabled(true)),
//!     Operation::new("Motd", Line::new("/etc/motd", "managed host")),
//! ];
//!
//! let executor = Executor::new(Arc::new(HttpFetcher::new()));
//! let result = executor.run_simple(&mut host, &operations);
//! assert!(result.is_success());
//! ```

pub mod action;
pub mod backend;
pub mod condition;
pub mod context;
pub mod error;
pub mod executor;
pub mod fact;
pub mod host;
pub mod operation;
pub mod transport;
pub mod types;

pub use action::Action;
pub use backend::{OsFamily, PackageManager, ServiceManager, ServiceStatus};
pub use condition::{ChangeTracker, Condition};
pub use context::{AutoConfirm, ConfirmCallback, NoProgress, ProgressCallback};
pub use error::{Error, ErrorCategory, Result};
pub use executor::Executor;
pub use fact::{FactCache, FactQuery, FactValue, Invalidation, PathInfo, PathKind};
pub use fetchkit::{Checksum, Fetcher, HttpFetcher, MockFetcher};
pub use host::Host;
pub use operation::{Evaluation, Operation, OperationKind};
pub use transport::{MockTransport, ShellTransport, Transport};
pub use types::{
    CommandOutput, ExecuteOptions, ExecuteSummary, OperationReport, Outcome, RunResult, RunStatus,
};
