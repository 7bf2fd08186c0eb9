//! Inventory: which hosts a command talks to and how to reach them.
//!
//! ```toml
//! [[hosts]]
//! name = "ci"
//! os = "alpine"
//! connector = ["ssh", "root@10.0.0.5"]
//! timeout_secs = 600
//!
//! [[hosts]]
//! name = "kind-1"
//! os = "debian"
//! ```

use crate::cli::TargetArgs;
use crate::paths;
use converge::{Host, OsFamily, ShellTransport};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a single target host
pub const ENV_TARGET: &str = "LAB_TARGET";

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("no target host: set {ENV_TARGET}, pass --target, or create {0}")]
    NoTarget(PathBuf),

    #[error("could not read inventory {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid inventory {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("inventory {0} lists no hosts")]
    Empty(PathBuf),

    /// 1-based position of the host in the file
    #[error("host #{0} has an empty name")]
    EmptyName(usize),
}

/// One inventory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    pub name: String,

    /// OS family; the deploy's own family when omitted
    #[serde(default)]
    pub os: Option<OsFamily>,

    /// Command prefix used to reach the host; `ssh root@<name>` when omitted,
    /// the local shell when empty
    #[serde(default)]
    pub connector: Option<Vec<String>>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl HostEntry {
    /// Entry for a host reached over ssh as root
    pub fn target(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            os: None,
            connector: None,
            timeout_secs: None,
        }
    }

    pub fn connector(&self) -> Vec<String> {
        self.connector
            .clone()
            .unwrap_or_else(|| vec!["ssh".to_string(), format!("root@{}", self.name)])
    }

    /// Build a host, falling back to `default_os` and `default_timeout`.
    pub fn to_host(&self, default_os: OsFamily, default_timeout: Option<Duration>) -> Host {
        let mut transport = ShellTransport::with_connector(&self.name, self.connector());
        if let Some(timeout) = self
            .timeout_secs
            .map(Duration::from_secs)
            .or(default_timeout)
        {
            transport = transport.with_timeout(timeout);
        }
        Host::new(&self.name, self.os.unwrap_or(default_os), transport)
    }
}

/// The hosts a command runs against
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub hosts: Vec<HostEntry>,
}

impl Inventory {
    /// Parse an inventory file
    pub fn load(path: &Path) -> Result<Self, InventoryError> {
        let content = fs::read_to_string(path).map_err(|source| InventoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, InventoryError> {
        let inventory: Self = toml::from_str(content).map_err(|source| InventoryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if inventory.hosts.is_empty() {
            return Err(InventoryError::Empty(path.to_path_buf()));
        }
        if let Some(index) = inventory.hosts.iter().position(|h| h.name.trim().is_empty()) {
            return Err(InventoryError::EmptyName(index + 1));
        }
        Ok(inventory)
    }

    /// Resolve the hosts selected on the command line.
    ///
    /// An explicit target (flag or `LAB_TARGET`) wins over the inventory
    /// file. Without either, this is a configuration error.
    pub fn resolve(args: &TargetArgs) -> anyhow::Result<Self> {
        if let Some(target) = args.target.as_deref().filter(|t| !t.trim().is_empty()) {
            log::debug!("Using single target {target}");
            return Ok(Self {
                hosts: vec![HostEntry::target(target.trim())],
            });
        }

        let path = match &args.inventory {
            Some(path) => paths::expand(&path.to_string_lossy()),
            None => paths::inventory_file()?,
        };
        if args.inventory.is_none() && !path.exists() {
            return Err(InventoryError::NoTarget(path).into());
        }
        log::debug!("Using inventory {}", path.display());
        Ok(Self::load(&path)?)
    }

    /// Build hosts for a deploy whose default family is `default_os`.
    pub fn hosts(&self, default_os: OsFamily, timeout: Option<Duration>) -> Vec<Host> {
        self.hosts
            .iter()
            .map(|entry| entry.to_host(default_os, timeout))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inventory() {
        let content = r#"
            [[hosts]]
            name = "ci"
            os = "alpine"
            connector = ["ssh", "-p", "2222", "root@10.0.0.5"]
            timeout_secs = 600

            [[hosts]]
            name = "kind-1"
        "#;
        let inventory = Inventory::parse(content, Path::new("inventory.toml")).unwrap();
        assert_eq!(inventory.hosts.len(), 2);
        assert_eq!(inventory.hosts[0].os, Some(OsFamily::Alpine));
        assert_eq!(
            inventory.hosts[0].connector(),
            vec!["ssh", "-p", "2222", "root@10.0.0.5"]
        );
        assert_eq!(inventory.hosts[1].connector(), vec!["ssh", "root@kind-1"]);
    }

    #[test]
    fn test_empty_inventory_rejected() {
        let err = Inventory::parse("hosts = []", Path::new("inventory.toml")).unwrap_err();
        assert!(matches!(err, InventoryError::Empty(_)));
    }

    #[test]
    fn test_empty_name_reports_position() {
        let content = "[[hosts]]\nname = \"ci-1\"\n\n[[hosts]]\nname = \"  \"\n";
        let err = Inventory::parse(content, Path::new("inventory.toml")).unwrap_err();
        assert!(matches!(err, InventoryError::EmptyName(2)));
        assert_eq!(err.to_string(), "host #2 has an empty name");
    }

    #[test]
    fn test_unknown_os_rejected() {
        let content = "[[hosts]]\nname = \"x\"\nos = \"gentoo\"\n";
        let err = Inventory::parse(content, Path::new("inventory.toml")).unwrap_err();
        assert!(matches!(err, InventoryError::Parse { .. }));
    }

    #[test]
    fn test_target_wins() {
        let args = TargetArgs {
            target: Some("10.0.0.9".into()),
            inventory: Some(PathBuf::from("/nonexistent/inventory.toml")),
            timeout: None,
        };
        let inventory = Inventory::resolve(&args).unwrap();
        assert_eq!(inventory.hosts, vec![HostEntry::target("10.0.0.9")]);
    }

    #[test]
    fn test_no_target_names_lab_target() {
        let err = InventoryError::NoTarget(PathBuf::from("/etc/labhost/inventory.toml"));
        let message = err.to_string();
        assert!(message.contains(ENV_TARGET));
        assert!(message.contains("/etc/labhost/inventory.toml"));
    }

    #[test]
    fn test_missing_explicit_inventory_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Inventory::resolve(&TargetArgs {
            target: None,
            inventory: Some(dir.path().join("missing.toml")),
            timeout: None,
        })
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InventoryError>(),
            Some(InventoryError::Read { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.toml");
        fs::write(&path, "[[hosts]]\nname = \"lab\"\nconnector = []\n").unwrap();

        let inventory = Inventory::resolve(&TargetArgs {
            target: None,
            inventory: Some(path),
            timeout: Some(30),
        })
        .unwrap();
        let hosts = inventory.hosts(OsFamily::Debian, None);
        assert_eq!(hosts[0].name(), "lab");
        assert_eq!(hosts[0].os(), OsFamily::Debian);
        assert!(inventory.hosts[0].connector().is_empty());
    }
}
