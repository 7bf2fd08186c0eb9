//! Package and service manager backends.
//!
//! Backends only build command lines and parse their output. Running them is
//! the transport's job.

use crate::error::{Error, Result};
use crate::transport::quote;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Operating system family of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Alpine,
    Debian,
}

impl OsFamily {
    #[must_use]
    pub fn package_manager(self) -> PackageManager {
        match self {
            Self::Alpine => PackageManager::Apk,
            Self::Debian => PackageManager::Apt,
        }
    }

    #[must_use]
    pub fn service_manager(self) -> ServiceManager {
        match self {
            Self::Alpine => ServiceManager::OpenRc,
            Self::Debian => ServiceManager::Systemd,
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alpine => write!(f, "alpine"),
            Self::Debian => write!(f, "debian"),
        }
    }
}

impl FromStr for OsFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "alpine" => Ok(Self::Alpine),
            "debian" => Ok(Self::Debian),
            other => Err(Error::Config(format!("unsupported OS family: {other}"))),
        }
    }
}

/// Package manager flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apk,
    Apt,
}

impl PackageManager {
    /// Command listing installed package names.
    #[must_use]
    pub fn list_command(self) -> &'static str {
        match self {
            Self::Apk => "apk info",
            Self::Apt => "dpkg-query -W -f='${db:Status-Abbrev} ${Package}\\n'",
        }
    }

    /// Parse the output of [`Self::list_command`].
    #[must_use]
    pub fn parse_installed(self, output: &str) -> BTreeSet<String> {
        match self {
            Self::Apk => output
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            Self::Apt => output
                .lines()
                .filter_map(|line| {
                    let mut parts = line.split_whitespace();
                    let status = parts.next()?;
                    let name = parts.next()?;
                    // "ii" = desired install, currently installed
                    (status == "ii").then(|| strip_arch(name).to_string())
                })
                .collect(),
        }
    }

    /// Command installing `packages`.
    #[must_use]
    pub fn install_command(self, packages: &[String], extra_args: &[String]) -> String {
        let prefix = match self {
            Self::Apk => "apk add",
            Self::Apt => "DEBIAN_FRONTEND=noninteractive apt-get install -y",
        };
        join_command(prefix, extra_args, packages)
    }

    /// Command removing `packages`.
    #[must_use]
    pub fn remove_command(self, packages: &[String]) -> String {
        let prefix = match self {
            Self::Apk => "apk del",
            Self::Apt => "DEBIAN_FRONTEND=noninteractive apt-get remove -y",
        };
        join_command(prefix, &[], packages)
    }

    /// Command refreshing the package index.
    #[must_use]
    pub fn update_command(self) -> &'static str {
        match self {
            Self::Apk => "apk update",
            Self::Apt => "apt-get update",
        }
    }
}

fn strip_arch(name: &str) -> &str {
    name.split_once(':').map_or(name, |(n, _)| n)
}

fn join_command(prefix: &str, extra_args: &[String], words: &[String]) -> String {
    let mut cmd = prefix.to_string();
    for arg in extra_args {
        cmd.push(' ');
        cmd.push_str(arg);
    }
    for word in words {
        cmd.push(' ');
        cmd.push_str(&quote(word));
    }
    cmd
}

/// Observed state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub enabled: bool,
}

/// Service manager flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceManager {
    OpenRc,
    Systemd,
}

impl ServiceManager {
    /// Command printing two lines: running state then enabled state.
    #[must_use]
    pub fn status_command(self, name: &str) -> String {
        let q = quote(name);
        match self {
            Self::OpenRc => format!(
                "if rc-service {q} status >/dev/null 2>&1; then echo running; else echo stopped; fi; \
                 if rc-update show | awk '{{print $1}}' | grep -qx {q}; then echo enabled; else echo disabled; fi"
            ),
            Self::Systemd => format!(
                "systemctl is-active {q} || true; systemctl is-enabled {q} 2>/dev/null || echo disabled"
            ),
        }
    }

    /// Parse the output of [`Self::status_command`].
    pub fn parse_status(self, output: &str) -> Result<ServiceStatus> {
        let mut lines = output.lines().map(str::trim).filter(|l| !l.is_empty());
        let (Some(active), Some(enabled)) = (lines.next(), lines.next()) else {
            return Err(Error::InvalidFactQuery(format!(
                "unexpected service status output: {output:?}"
            )));
        };
        let running = match self {
            Self::OpenRc => active == "running",
            Self::Systemd => active == "active",
        };
        let enabled = matches!(enabled, "enabled" | "static" | "alias");
        Ok(ServiceStatus { running, enabled })
    }

    #[must_use]
    pub fn start_command(self, name: &str) -> String {
        match self {
            Self::OpenRc => format!("rc-service {} start", quote(name)),
            Self::Systemd => format!("systemctl start {}", quote(name)),
        }
    }

    #[must_use]
    pub fn stop_command(self, name: &str) -> String {
        match self {
            Self::OpenRc => format!("rc-service {} stop", quote(name)),
            Self::Systemd => format!("systemctl stop {}", quote(name)),
        }
    }

    #[must_use]
    pub fn enable_command(self, name: &str) -> String {
        match self {
            Self::OpenRc => format!("rc-update add {} default", quote(name)),
            Self::Systemd => format!("systemctl enable {}", quote(name)),
        }
    }

    #[must_use]
    pub fn disable_command(self, name: &str) -> String {
        match self {
            Self::OpenRc => format!("rc-update del {}", quote(name)),
            Self::Systemd => format!("systemctl disable {}", quote(name)),
        }
    }
}
