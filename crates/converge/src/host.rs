//! A target host: its transport, OS family and per-run fact cache.

use crate::backend::{OsFamily, ServiceStatus};
use crate::error::{Error, Result};
use crate::fact::{
    FactCache, FactQuery, FactValue, Invalidation, PathInfo, PathKind, stat_command,
};
use crate::transport::Transport;
use crate::types::CommandOutput;
use fetchkit::Algorithm;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A host being converged.
pub struct Host {
    name: String,
    os: OsFamily,
    transport: Box<dyn Transport>,
    cache: FactCache,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("name", &self.name)
            .field("os", &self.os)
            .field("cached_facts", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl Host {
    pub fn new(name: impl Into<String>, os: OsFamily, transport: impl Transport + 'static) -> Self {
        Self {
            name: name.into(),
            os,
            transport: Box::new(transport),
            cache: FactCache::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn os(&self) -> OsFamily {
        self.os
    }

    /// Run a command, returning its output whatever the exit status.
    pub fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<CommandOutput> {
        self.transport.exec(command, stdin)
    }

    /// Run a command and fail on a non-zero exit.
    pub fn run_checked(&self, command: &str, stdin: Option<&[u8]>) -> Result<CommandOutput> {
        let output = self.exec(command, stdin)?;
        if !output.success() {
            return Err(Error::Command {
                command: command.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr_str().trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Answer a fact query, from the cache when possible.
    pub fn fact(&mut self, query: &FactQuery) -> Result<FactValue> {
        if let Some(value) = self.cache.get(query) {
            return Ok(value.clone());
        }
        query.validate()?;

        log::debug!("[{}] fact {query}", self.name);
        let output = self.exec(&query.command(self.os), None)?;
        let value = query.parse(self.os, &output)?;
        self.cache.insert(query.clone(), value.clone());
        Ok(value)
    }

    /// Drop cached facts an applied change may have made stale.
    pub fn invalidate(&mut self, invalidation: &Invalidation) {
        self.cache.invalidate(invalidation);
    }

    /// Forget every cached fact.
    pub fn reset_facts(&mut self) {
        self.cache = FactCache::new();
    }

    fn mismatch(query: &FactQuery, value: &FactValue) -> Error {
        Error::InvalidFactQuery(format!("{query} produced unexpected value {value:?}"))
    }

    /// Whatever exists at `path`, without following symlinks.
    pub fn path(&mut self, path: &str) -> Result<Option<PathInfo>> {
        let query = FactQuery::Path(path.to_string());
        match self.fact(&query)? {
            FactValue::Path(info) => Ok(info),
            other => Err(Self::mismatch(&query, &other)),
        }
    }

    /// What `path` resolves to once symlinks are followed.
    ///
    /// Read as a command fact so that any later change drops it.
    pub fn resolved_path(&mut self, path: &str) -> Result<Option<PathInfo>> {
        let info = self.path(path)?;
        if info.as_ref().is_none_or(|i| i.kind != PathKind::Symlink) {
            return Ok(info);
        }
        let stat = self.command(&stat_command(path, true))?;
        PathInfo::parse(&stat)
    }

    /// `path` if it is a directory.
    pub fn directory(&mut self, path: &str) -> Result<Option<PathInfo>> {
        Ok(self.path(path)?.filter(|i| i.kind == PathKind::Directory))
    }

    /// `path` if it is a regular file.
    pub fn file(&mut self, path: &str) -> Result<Option<PathInfo>> {
        Ok(self.path(path)?.filter(|i| i.kind == PathKind::File))
    }

    /// Target of the symlink at `path`.
    pub fn link(&mut self, path: &str) -> Result<Option<String>> {
        let query = FactQuery::Link(path.to_string());
        match self.fact(&query)? {
            FactValue::Link(target) => Ok(target),
            other => Err(Self::mismatch(&query, &other)),
        }
    }

    /// Lines of the regular file at `path`.
    pub fn file_lines(&mut self, path: &str) -> Result<Option<Vec<String>>> {
        let query = FactQuery::FileLines(path.to_string());
        match self.fact(&query)? {
            FactValue::Lines(lines) => Ok(lines),
            other => Err(Self::mismatch(&query, &other)),
        }
    }

    /// Lines of `path` matching the extended regex `pattern`.
    pub fn find_in_file(&mut self, path: &str, pattern: &str) -> Result<Vec<String>> {
        let query = FactQuery::FindInFile {
            path: path.to_string(),
            pattern: pattern.to_string(),
        };
        match self.fact(&query)? {
            FactValue::Matches(lines) => Ok(lines),
            other => Err(Self::mismatch(&query, &other)),
        }
    }

    pub fn file_digest(&mut self, path: &str, algorithm: Algorithm) -> Result<Option<String>> {
        let query = FactQuery::FileDigest {
            path: path.to_string(),
            algorithm,
        };
        match self.fact(&query)? {
            FactValue::Digest(digest) => Ok(digest),
            other => Err(Self::mismatch(&query, &other)),
        }
    }

    /// Trimmed stdout of `command`.
    pub fn command(&mut self, command: &str) -> Result<String> {
        let query = FactQuery::Command(command.to_string());
        match self.fact(&query)? {
            FactValue::Text(text) => Ok(text),
            other => Err(Self::mismatch(&query, &other)),
        }
    }

    fn names(&mut self, query: FactQuery) -> Result<BTreeSet<String>> {
        match self.fact(&query)? {
            FactValue::Names(names) => Ok(names),
            other => Err(Self::mismatch(&query, &other)),
        }
    }

    pub fn groups(&mut self) -> Result<BTreeSet<String>> {
        self.names(FactQuery::Groups)
    }

    pub fn users(&mut self) -> Result<BTreeSet<String>> {
        self.names(FactQuery::Users)
    }

    pub fn installed_packages(&mut self) -> Result<BTreeSet<String>> {
        self.names(FactQuery::InstalledPackages)
    }

    pub fn service(&mut self, name: &str) -> Result<ServiceStatus> {
        let query = FactQuery::Service(name.to_string());
        match self.fact(&query)? {
            FactValue::Service(status) => Ok(status),
            other => Err(Self::mismatch(&query, &other)),
        }
    }

    /// IPv4 addresses keyed by interface name.
    pub fn ipv4_addrs(&mut self) -> Result<BTreeMap<String, Vec<String>>> {
        let query = FactQuery::Ipv4Addrs;
        match self.fact(&query)? {
            FactValue::Interfaces(map) => Ok(map),
            other => Err(Self::mismatch(&query, &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, ShellTransport};

    #[test]
    fn test_facts_are_cached() {
        let mock = MockTransport::new("box");
        mock.on_ok("apk info", "curl\n");
        let mut host = Host::new("box", OsFamily::Alpine, mock.clone());

        assert!(host.installed_packages().unwrap().contains("curl"));
        assert!(host.installed_packages().unwrap().contains("curl"));
        assert_eq!(mock.commands().len(), 1);

        host.invalidate(&Invalidation::Packages);
        host.installed_packages().unwrap();
        assert_eq!(mock.commands().len(), 2);
    }

    #[test]
    fn test_invalid_query_never_reaches_host() {
        let mock = MockTransport::new("box");
        let mut host = Host::new("box", OsFamily::Alpine, mock.clone());

        let err = host.file_lines("relative/path").unwrap_err();
        assert!(matches!(err, Error::InvalidFactQuery(_)));
        assert!(mock.commands().is_empty());
    }

    #[test]
    fn test_unreachable_host() {
        let mut host = Host::new("box", OsFamily::Debian, MockTransport::unreachable("box"));
        let err = host.groups().unwrap_err();
        assert!(matches!(err, Error::Connectivity { .. }));
    }

    #[test]
    fn test_run_checked_fails_on_nonzero() {
        let mock = MockTransport::new("box");
        mock.on("apk add", CommandOutput::failed(1, "unable to select packages"));
        let host = Host::new("box", OsFamily::Alpine, mock);

        let err = host.run_checked("apk add nope", None).unwrap_err();
        assert!(matches!(err, Error::Command { exit_code: 1, .. }));
    }

    #[test]
    fn test_local_path_facts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap().to_string();
        let file = format!("{root}/motd");
        std::fs::write(&file, "one\ntwo\n").unwrap();
        let link = format!("{root}/current");
        std::os::unix::fs::symlink(&file, &link).unwrap();

        let mut host = Host::new("localhost", OsFamily::Debian, ShellTransport::local());

        assert_eq!(host.directory(&root).unwrap().unwrap().kind, PathKind::Directory);
        assert!(host.file(&root).unwrap().is_none());
        assert_eq!(
            host.file_lines(&file).unwrap(),
            Some(vec!["one".to_string(), "two".to_string()])
        );
        assert_eq!(host.find_in_file(&file, "^t").unwrap(), vec!["two"]);
        assert_eq!(host.link(&link).unwrap(), Some(file.clone()));
        assert_eq!(host.link(&file).unwrap(), None);
        assert_eq!(host.path(&link).unwrap().unwrap().kind, PathKind::Symlink);
        assert_eq!(host.file_lines(&format!("{root}/missing")).unwrap(), None);
        assert_eq!(host.command("echo  hi ").unwrap(), "hi");
    }
}
