//! Deploys shipped with labhost.
//!
//! A deploy turns a host into an ordered list of operations. Declaring may
//! read facts (the KIND config needs the host's address) and resolve
//! checksums, but never changes the host.

pub mod alpine;
pub mod concourse;
pub mod debian;
pub mod kind;
pub mod postgres;

use crate::cli::DeployName;
use converge::operation::Symlink;
use converge::{Fetcher, Host, Operation, OsFamily, Result};
use std::sync::Arc;

pub const TIMEZONE: &str = "America/Toronto";

/// Repository choices for Alpine-based deploys
#[derive(Debug, Clone, Copy, Default)]
pub struct RepoOptions {
    pub edge: bool,
    pub testing: bool,
    pub no_community: bool,
    /// Keep a `.bak` copy of the repositories file before each edit
    pub backup: bool,
}

/// A named deploy with everything needed to declare it
pub struct Deploy {
    name: DeployName,
    repos: RepoOptions,
    fetcher: Arc<dyn Fetcher>,
}

impl Deploy {
    pub fn new(name: DeployName, repos: RepoOptions, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            name,
            repos,
            fetcher,
        }
    }

    /// OS family hosts are assumed to run when the inventory doesn't say
    pub fn default_os(&self) -> OsFamily {
        default_os(self.name)
    }

    /// Declare the operations for one host.
    pub fn operations(&self, host: &mut Host) -> Result<Vec<Operation>> {
        log::debug!("[{}] declaring {:?}", host.name(), self.name);
        let operations = match self.name {
            DeployName::Alpine => alpine::base(self.repos),
            DeployName::Debian => debian::base(),
            DeployName::Concourse => {
                let mut ops = alpine::base(self.repos);
                ops.extend(postgres::server());
                ops.extend(concourse::operations(self.fetcher.as_ref())?);
                ops
            }
            DeployName::Kind => kind::debian_node(host)?,
            DeployName::KindAlpine => {
                let mut ops = alpine::base(self.repos);
                ops.extend(kind::alpine_node());
                ops
            }
        };
        Ok(operations)
    }
}

pub fn default_os(name: DeployName) -> OsFamily {
    match name {
        DeployName::Kind | DeployName::Debian => OsFamily::Debian,
        DeployName::Alpine | DeployName::Concourse | DeployName::KindAlpine => OsFamily::Alpine,
    }
}

/// Point `/etc/localtime` at the zone's tzdata file
pub fn timezone(zone: &str) -> Operation {
    Operation::new(
        format!("Timezone {zone}"),
        Symlink::new("/etc/localtime", format!("/etc/zoneinfo/{zone}")),
    )
}

/// One-line description shown by `labhost deploys`
pub fn describe(name: DeployName) -> &'static str {
    match name {
        DeployName::Concourse => "Alpine base, PostgreSQL 16 and Concourse CI (web + worker)",
        DeployName::Kind => "Debian KIND node: containerd/runc from sid, kind, nerdctl",
        DeployName::KindAlpine => "Alpine KIND node from distribution packages",
        DeployName::Alpine => "Alpine base: timezone, repositories, tooling",
        DeployName::Debian => "Debian base: timezone, sid repository, tooling",
    }
}

/// Operation names must be unique within a deploy; `Changed` conditions
/// refer to them.
#[cfg(test)]
pub(crate) fn assert_unique_names(operations: &[Operation]) {
    let mut seen = std::collections::HashSet::new();
    for op in operations {
        assert!(seen.insert(op.name.as_str()), "duplicate operation {}", op.name);
    }
}
