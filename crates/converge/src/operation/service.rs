use super::Evaluation;
use crate::action::Action;
use crate::error::Result;
use crate::host::Host;

/// Desired running (and optionally enabled) state of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub running: bool,
    /// `None` leaves boot-time enablement alone.
    pub enabled: Option<bool>,
}

impl Service {
    /// A service that must be running.
    pub fn running(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            running: true,
            enabled: None,
        }
    }

    /// A service that must be stopped.
    pub fn stopped(name: impl Into<String>) -> Self {
        Self {
            running: false,
            ..Self::running(name)
        }
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub(super) fn evaluate(&self, host: &mut Host) -> Result<Evaluation> {
        let status = host.service(&self.name)?;
        let manager = host.os().service_manager();
        let mut actions = Vec::new();

        if status.running != self.running {
            actions.push(Action::shell(if self.running {
                manager.start_command(&self.name)
            } else {
                manager.stop_command(&self.name)
            }));
        }
        if let Some(enabled) = self.enabled
            && status.enabled != enabled
        {
            actions.push(Action::shell(if enabled {
                manager.enable_command(&self.name)
            } else {
                manager.disable_command(&self.name)
            }));
        }
        Ok(Evaluation::change(actions))
    }
}
