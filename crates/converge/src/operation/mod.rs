//! Desired-state operations.
//!
//! An operation compares the host's facts with the state it declares and
//! yields the ordered actions needed to close the gap. Evaluating an
//! operation never changes the host.

mod download;
mod files;
mod packages;
mod service;
mod shell;

pub use download::Download;
pub use files::{Directory, File, Line, Symlink, converge_lines};
pub use packages::Packages;
pub use service::Service;
pub use shell::Shell;

use crate::action::Action;
use crate::condition::{ChangeTracker, Condition};
use crate::error::Result;
use crate::fact::Invalidation;
use crate::host::Host;

/// Result of evaluating an operation against a host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Evaluation {
    /// Whether the host differs from the desired state.
    pub changed: bool,
    /// Corrective actions, in the order they must run.
    pub actions: Vec<Action>,
}

impl Evaluation {
    /// The host already matches.
    #[must_use]
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// The host differs; running `actions` fixes it.
    #[must_use]
    pub fn change(actions: Vec<Action>) -> Self {
        Self {
            changed: !actions.is_empty(),
            actions,
        }
    }
}

/// Every kind of operation the engine understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    PackageInstalled(Packages),
    DirectoryPresent(Directory),
    FilePresent(File),
    LineInFile(Line),
    SymlinkPresent(Symlink),
    ServiceRunning(Service),
    Download(Download),
    ShellCommand(Shell),
}

impl OperationKind {
    fn evaluate(&self, host: &mut Host, tracker: &ChangeTracker) -> Result<Evaluation> {
        match self {
            Self::PackageInstalled(op) => op.evaluate(host),
            Self::DirectoryPresent(op) => op.evaluate(host),
            Self::FilePresent(op) => op.evaluate(host),
            Self::LineInFile(op) => op.evaluate(host),
            Self::SymlinkPresent(op) => op.evaluate(host),
            Self::ServiceRunning(op) => op.evaluate(host),
            Self::Download(op) => op.evaluate(host),
            Self::ShellCommand(op) => op.evaluate(host, tracker),
        }
    }

    fn default_invalidations(&self) -> Vec<Invalidation> {
        match self {
            Self::PackageInstalled(_) => vec![Invalidation::Packages],
            Self::DirectoryPresent(Directory { path, .. })
            | Self::FilePresent(File { path, .. })
            | Self::LineInFile(Line { path, .. })
            | Self::SymlinkPresent(Symlink { path, .. })
            | Self::Download(Download { dest: path, .. }) => {
                vec![Invalidation::Path(path.clone())]
            }
            Self::ServiceRunning(Service { name, .. }) => {
                vec![Invalidation::Service(name.clone())]
            }
            Self::ShellCommand(_) => vec![Invalidation::Everything],
        }
    }
}

macro_rules! impl_from_kind {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for OperationKind {
                fn from(op: $ty) -> Self {
                    Self::$variant(op)
                }
            }
        )*
    };
}

impl_from_kind! {
    Packages => PackageInstalled,
    Directory => DirectoryPresent,
    File => FilePresent,
    Line => LineInFile,
    Symlink => SymlinkPresent,
    Service => ServiceRunning,
    Download => Download,
    Shell => ShellCommand,
}

/// A named, optionally conditional unit of desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub kind: OperationKind,
    /// Evaluate only when this holds; otherwise the operation is skipped.
    pub when: Option<Condition>,
    /// Extra facts to drop after the operation changes the host.
    pub invalidates: Vec<Invalidation>,
}

impl Operation {
    pub fn new(name: impl Into<String>, kind: impl Into<OperationKind>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            when: None,
            invalidates: Vec::new(),
        }
    }

    /// Only evaluate when `condition` holds.
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.when = Some(condition);
        self
    }

    /// Also drop `invalidation` after a change.
    #[must_use]
    pub fn invalidating(mut self, invalidation: Invalidation) -> Self {
        self.invalidates.push(invalidation);
        self
    }

    /// Compare the host with the desired state.
    pub fn evaluate(&self, host: &mut Host, tracker: &ChangeTracker) -> Result<Evaluation> {
        self.kind.evaluate(host, tracker)
    }

    /// Facts that may be stale once this operation has changed the host.
    #[must_use]
    pub fn affected(&self) -> Vec<Invalidation> {
        let mut all = self.kind.default_invalidations();
        all.extend(self.invalidates.iter().cloned());
        all
    }
}
