//! Facts: typed, read-only queries about a host's current state.
//!
//! Each query knows the command that answers it and how to parse that
//! command's output. Answers are cached per run in a [`FactCache`] and only
//! dropped through an explicit [`Invalidation`].

use crate::backend::{OsFamily, ServiceStatus};
use crate::error::{Error, Result};
use crate::transport::quote;
use crate::types::CommandOutput;
use fetchkit::Algorithm;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Exit status the fact commands use for "path does not exist".
const MISSING: i32 = 44;

/// A query about host state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FactQuery {
    /// Type, ownership and mode of a path (symlinks are not followed).
    Path(String),
    /// Target of a symlink.
    Link(String),
    /// Lines of a file.
    FileLines(String),
    /// Lines of a file matching an extended regular expression.
    FindInFile { path: String, pattern: String },
    /// Hex digest of a regular file.
    FileDigest { path: String, algorithm: Algorithm },
    /// Trimmed stdout of an arbitrary command.
    Command(String),
    /// Local group names.
    Groups,
    /// Local user names.
    Users,
    /// Installed package names.
    InstalledPackages,
    /// Running/enabled state of a service.
    Service(String),
    /// IPv4 addresses by interface.
    Ipv4Addrs,
}

impl FactQuery {
    /// Short name of the query kind, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Path(_) => "path",
            Self::Link(_) => "link",
            Self::FileLines(_) => "file_lines",
            Self::FindInFile { .. } => "find_in_file",
            Self::FileDigest { .. } => "file_digest",
            Self::Command(_) => "command",
            Self::Groups => "groups",
            Self::Users => "users",
            Self::InstalledPackages => "installed_packages",
            Self::Service(_) => "service",
            Self::Ipv4Addrs => "ipv4_addrs",
        }
    }

    /// Filesystem path the query reads, if any.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Path(p)
            | Self::Link(p)
            | Self::FileLines(p)
            | Self::FindInFile { path: p, .. }
            | Self::FileDigest { path: p, .. } => Some(p),
            Self::Groups => Some("/etc/group"),
            Self::Users => Some("/etc/passwd"),
            _ => None,
        }
    }

    /// Reject malformed queries before anything is sent to the host.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidFactQuery(msg));
        match self {
            Self::Path(p)
            | Self::Link(p)
            | Self::FileLines(p)
            | Self::FindInFile { path: p, .. }
            | Self::FileDigest { path: p, .. } => {
                if p.is_empty() {
                    return invalid(format!("{}: empty path", self.kind()));
                }
                if !p.starts_with('/') {
                    return invalid(format!("{}: path must be absolute: {p}", self.kind()));
                }
            }
            Self::Command(cmd) if cmd.trim().is_empty() => {
                return invalid("command: empty command".to_string());
            }
            Self::Service(name) if name.trim().is_empty() => {
                return invalid("service: empty name".to_string());
            }
            _ => {}
        }
        if let Self::FindInFile { pattern, .. } = self
            && pattern.is_empty()
        {
            return invalid("find_in_file: empty pattern".to_string());
        }
        Ok(())
    }

    /// Shell command answering this query on a host of family `os`.
    #[must_use]
    pub fn command(&self, os: OsFamily) -> String {
        match self {
            Self::Path(p) => stat_command(p, false),
            Self::Link(p) => {
                let q = quote(p);
                format!("if [ -L {q} ]; then readlink -- {q}; fi")
            }
            Self::FileLines(p) => {
                let q = quote(p);
                format!("[ -f {q} ] || exit {MISSING}; cat -- {q}")
            }
            Self::FindInFile { path, pattern } => format!(
                "grep -E -e {} -- {} 2>/dev/null || true",
                quote(pattern),
                quote(path)
            ),
            Self::FileDigest { path, algorithm } => {
                let q = quote(path);
                format!(
                    "[ -f {q} ] || exit {MISSING}; {} -- {q}",
                    algorithm.sum_command()
                )
            }
            Self::Command(cmd) => cmd.clone(),
            Self::Groups => "cut -d: -f1 /etc/group".to_string(),
            Self::Users => "cut -d: -f1 /etc/passwd".to_string(),
            Self::InstalledPackages => os.package_manager().list_command().to_string(),
            Self::Service(name) => os.service_manager().status_command(name),
            Self::Ipv4Addrs => "ip -o -4 addr show".to_string(),
        }
    }

    /// Interpret the output of [`Self::command`].
    pub fn parse(&self, os: OsFamily, output: &CommandOutput) -> Result<FactValue> {
        let expects_missing = matches!(self, Self::FileLines(_) | Self::FileDigest { .. });
        if expects_missing && output.exit_code == MISSING {
            return Ok(match self {
                Self::FileLines(_) => FactValue::Lines(None),
                _ => FactValue::Digest(None),
            });
        }
        if !output.success() {
            return Err(Error::Command {
                command: self.command(os),
                exit_code: output.exit_code,
                stderr: output.stderr_str().trim().to_string(),
            });
        }

        let stdout = output.stdout_str();
        let value = match self {
            Self::Path(_) => FactValue::Path(PathInfo::parse(stdout.trim())?),
            Self::Link(_) => {
                let target = stdout.trim_end_matches('\n');
                FactValue::Link((!target.is_empty()).then(|| target.to_string()))
            }
            Self::FileLines(_) => {
                FactValue::Lines(Some(stdout.lines().map(String::from).collect()))
            }
            Self::FindInFile { .. } => {
                FactValue::Matches(stdout.lines().map(String::from).collect())
            }
            Self::FileDigest { algorithm, .. } => {
                let digest = stdout.split_whitespace().next().unwrap_or_default();
                if !algorithm.is_valid_digest(digest) {
                    return Err(Error::InvalidFactQuery(format!(
                        "unexpected {} output: {stdout:?}",
                        algorithm.sum_command()
                    )));
                }
                FactValue::Digest(Some(digest.to_string()))
            }
            Self::Command(_) => FactValue::Text(stdout.trim().to_string()),
            Self::Groups | Self::Users => FactValue::Names(
                stdout
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            Self::InstalledPackages => {
                FactValue::Names(os.package_manager().parse_installed(&stdout))
            }
            Self::Service(_) => FactValue::Service(os.service_manager().parse_status(&stdout)?),
            Self::Ipv4Addrs => FactValue::Interfaces(parse_ipv4_addrs(&stdout)),
        };
        Ok(value)
    }
}

impl fmt::Display for FactQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(arg)
            | Self::Link(arg)
            | Self::FileLines(arg)
            | Self::Command(arg)
            | Self::Service(arg) => write!(f, "{}({arg})", self.kind()),
            Self::FindInFile { path, pattern } => write!(f, "find_in_file({path}, {pattern})"),
            Self::FileDigest { path, algorithm } => write!(f, "file_digest({path}, {algorithm})"),
            _ => write!(f, "{}", self.kind()),
        }
    }
}

/// Kind of filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
            Self::Other => "special file",
        };
        write!(f, "{s}")
    }
}

/// What `stat` reports about a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathInfo {
    pub kind: PathKind,
    pub user: String,
    pub group: String,
    /// Permission bits, e.g. `0o644`.
    pub mode: u32,
}

/// `stat` of `path` in the format [`PathInfo::parse`] reads. Empty output
/// when nothing exists there (or a followed symlink dangles).
pub(crate) fn stat_command(path: &str, follow: bool) -> String {
    let follow = if follow { "-L " } else { "" };
    format!(
        "stat {follow}-c '%F|%U|%G|%a' -- {} 2>/dev/null || true",
        quote(path)
    )
}

impl PathInfo {
    pub(crate) fn parse(line: &str) -> Result<Option<Self>> {
        if line.is_empty() {
            return Ok(None);
        }
        let parts: Vec<&str> = line.split('|').collect();
        let [kind, user, group, mode] = parts.as_slice() else {
            return Err(Error::InvalidFactQuery(format!(
                "unexpected stat output: {line:?}"
            )));
        };
        let kind = match *kind {
            "regular file" | "regular empty file" => PathKind::File,
            "directory" => PathKind::Directory,
            "symbolic link" => PathKind::Symlink,
            _ => PathKind::Other,
        };
        let mode = u32::from_str_radix(mode, 8)
            .map_err(|_| Error::InvalidFactQuery(format!("unexpected mode in {line:?}")))?;
        Ok(Some(Self {
            kind,
            user: (*user).to_string(),
            group: (*group).to_string(),
            mode,
        }))
    }
}

fn parse_ipv4_addrs(output: &str) -> BTreeMap<String, Vec<String>> {
    let mut interfaces: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for line in output.lines() {
        // 2: enp1s0    inet 192.168.122.10/24 brd 192.168.122.255 scope global enp1s0
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(pos) = fields.iter().position(|f| *f == "inet") else {
            continue;
        };
        let name = pos.checked_sub(1).and_then(|i| fields.get(i));
        let (Some(name), Some(cidr)) = (name, fields.get(pos + 1)) else {
            continue;
        };
        let addr = cidr.split_once('/').map_or(*cidr, |(a, _)| a);
        interfaces
            .entry((*name).to_string())
            .or_default()
            .push(addr.to_string());
    }
    interfaces
}

/// Answer to a [`FactQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FactValue {
    Path(Option<PathInfo>),
    Link(Option<String>),
    Lines(Option<Vec<String>>),
    Matches(Vec<String>),
    Digest(Option<String>),
    Text(String),
    Names(BTreeSet<String>),
    Service(ServiceStatus),
    Interfaces(BTreeMap<String, Vec<String>>),
}

/// Which cached facts an applied operation may have made stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// Facts about this path, its ancestors and descendants.
    Path(String),
    /// Installed package set.
    Packages,
    /// State of one service.
    Service(String),
    /// Drop the whole cache.
    Everything,
}

impl Invalidation {
    fn drops(&self, query: &FactQuery) -> bool {
        // Command facts can observe anything.
        if matches!(query, FactQuery::Command(_)) {
            return true;
        }
        match self {
            Self::Everything => true,
            Self::Packages => matches!(
                query,
                FactQuery::InstalledPackages | FactQuery::Service(_)
            ),
            Self::Service(name) => matches!(query, FactQuery::Service(n) if n == name),
            Self::Path(changed) => query
                .path()
                .is_some_and(|p| paths_overlap(p, changed)),
        }
    }
}

fn paths_overlap(a: &str, b: &str) -> bool {
    let within = |inner: &str, outer: &str| {
        let outer = outer.trim_end_matches('/');
        inner == outer || inner.strip_prefix(outer).is_some_and(|rest| rest.starts_with('/'))
    };
    within(a, b) || within(b, a)
}

/// Per-run fact cache.
#[derive(Debug, Default)]
pub struct FactCache {
    entries: HashMap<FactQuery, FactValue>,
}

impl FactCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, query: &FactQuery) -> Option<&FactValue> {
        self.entries.get(query)
    }

    pub fn insert(&mut self, query: FactQuery, value: FactValue) {
        self.entries.insert(query, value);
    }

    /// Drop every entry the invalidation covers.
    pub fn invalidate(&mut self, invalidation: &Invalidation) {
        let before = self.entries.len();
        self.entries.retain(|query, _| !invalidation.drops(query));
        let dropped = before - self.entries.len();
        if dropped > 0 {
            log::debug!("invalidated {dropped} cached fact(s) for {invalidation:?}");
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_relative_and_empty() {
        assert!(FactQuery::Path("etc/motd".into()).validate().is_err());
        assert!(FactQuery::FileLines(String::new()).validate().is_err());
        assert!(FactQuery::Command("  ".into()).validate().is_err());
        assert!(
            FactQuery::FindInFile {
                path: "/etc/apk/repositories".into(),
                pattern: String::new()
            }
            .validate()
            .is_err()
        );
        assert!(FactQuery::Path("/etc/motd".into()).validate().is_ok());
        assert!(FactQuery::Groups.validate().is_ok());
    }

    #[test]
    fn test_parse_path_info() {
        let info = PathInfo::parse("directory|atc|atc|755").unwrap().unwrap();
        assert_eq!(info.kind, PathKind::Directory);
        assert_eq!(info.user, "atc");
        assert_eq!(info.mode, 0o755);

        let empty = PathInfo::parse("regular empty file|root|root|644")
            .unwrap()
            .unwrap();
        assert_eq!(empty.kind, PathKind::File);

        assert_eq!(PathInfo::parse("").unwrap(), None);
        assert!(PathInfo::parse("garbage").is_err());
    }

    #[test]
    fn test_missing_file_lines() {
        let query = FactQuery::FileLines("/etc/nope".into());
        let value = query
            .parse(OsFamily::Alpine, &CommandOutput::failed(MISSING, ""))
            .unwrap();
        assert_eq!(value, FactValue::Lines(None));
    }

    #[test]
    fn test_command_failure_is_error() {
        let query = FactQuery::Command("false".into());
        let err = query
            .parse(OsFamily::Alpine, &CommandOutput::failed(1, "nope"))
            .unwrap_err();
        assert!(matches!(err, Error::Command { exit_code: 1, .. }));
    }

    #[test]
    fn test_parse_digest() {
        let query = FactQuery::FileDigest {
            path: "/tmp/a".into(),
            algorithm: Algorithm::Sha1,
        };
        let out = CommandOutput::ok("da39a3ee5e6b4b0d3255bfef95601890afd80709  /tmp/a\n");
        assert_eq!(
            query.parse(OsFamily::Debian, &out).unwrap(),
            FactValue::Digest(Some("da39a3ee5e6b4b0d3255bfef95601890afd80709".into()))
        );
    }

    #[test]
    fn test_parse_ipv4_addrs() {
        let output = "1: lo    inet 127.0.0.1/8 scope host lo\\       valid_lft forever\n\
                      2: enp1s0    inet 192.168.122.10/24 brd 192.168.122.255 scope global enp1s0\n";
        let addrs = parse_ipv4_addrs(output);
        assert_eq!(addrs["lo"], vec!["127.0.0.1"]);
        assert_eq!(addrs["enp1s0"], vec!["192.168.122.10"]);
    }

    #[test]
    fn test_paths_overlap() {
        assert!(paths_overlap("/etc/concourse", "/etc/concourse"));
        assert!(paths_overlap("/etc/concourse/web_key", "/etc/concourse"));
        assert!(paths_overlap("/etc", "/etc/concourse"));
        assert!(!paths_overlap("/etc/concourse2", "/etc/concourse"));
    }

    #[test]
    fn test_invalidate_path() {
        let mut cache = FactCache::new();
        cache.insert(FactQuery::Path("/opt/concourse".into()), FactValue::Path(None));
        cache.insert(
            FactQuery::Path("/opt/concourse/bin".into()),
            FactValue::Path(None),
        );
        cache.insert(FactQuery::Path("/etc/motd".into()), FactValue::Path(None));
        cache.insert(FactQuery::Command("uname".into()), FactValue::Text("Linux".into()));
        cache.insert(FactQuery::Groups, FactValue::Names(BTreeSet::new()));

        cache.invalidate(&Invalidation::Path("/opt/concourse".into()));

        assert!(cache.get(&FactQuery::Path("/opt/concourse".into())).is_none());
        assert!(cache.get(&FactQuery::Path("/opt/concourse/bin".into())).is_none());
        assert!(cache.get(&FactQuery::Command("uname".into())).is_none());
        assert!(cache.get(&FactQuery::Path("/etc/motd".into())).is_some());
        assert!(cache.get(&FactQuery::Groups).is_some());

        cache.invalidate(&Invalidation::Path("/etc/group".into()));
        assert!(cache.get(&FactQuery::Groups).is_none());
    }

    #[test]
    fn test_invalidate_service_only_named() {
        let mut cache = FactCache::new();
        let status = FactValue::Service(ServiceStatus::default());
        cache.insert(FactQuery::Service("postgresql".into()), status.clone());
        cache.insert(FactQuery::Service("cgroups".into()), status);

        cache.invalidate(&Invalidation::Service("cgroups".into()));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&FactQuery::Service("postgresql".into())).is_some());
    }
}
