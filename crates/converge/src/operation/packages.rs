use super::Evaluation;
use crate::action::Action;
use crate::error::Result;
use crate::host::Host;

/// Packages that must be installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packages {
    pub packages: Vec<String>,
    /// Passed to the package manager before the package names.
    pub extra_args: Vec<String>,
    /// Refresh the package index before installing.
    pub update: bool,
}

impl Packages {
    pub fn new<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            packages: packages.into_iter().map(Into::into).collect(),
            extra_args: Vec::new(),
            update: false,
        }
    }

    #[must_use]
    pub fn extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn update(mut self) -> Self {
        self.update = true;
        self
    }

    pub(super) fn evaluate(&self, host: &mut Host) -> Result<Evaluation> {
        let installed = host.installed_packages()?;
        let missing: Vec<String> = self
            .packages
            .iter()
            .filter(|p| !installed.contains(p.as_str()))
            .cloned()
            .collect();

        if missing.is_empty() {
            return Ok(Evaluation::unchanged());
        }

        let manager = host.os().package_manager();
        let mut actions = Vec::new();
        if self.update {
            actions.push(Action::shell(manager.update_command()));
        }
        actions.push(Action::shell(
            manager.install_command(&missing, &self.extra_args),
        ));
        Ok(Evaluation::change(actions))
    }
}
