use super::Evaluation;
use crate::action::Action;
use crate::condition::{ChangeTracker, Condition};
use crate::error::Result;
use crate::host::Host;

/// Commands run in order.
///
/// Without a guard the operation always reports a change. With a guard,
/// the commands only run while it holds and the host counts as converged
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    pub commands: Vec<String>,
    pub guard: Option<Condition>,
}

impl Shell {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            guard: None,
        }
    }

    /// Only run while `guard` holds.
    #[must_use]
    pub fn only_if(mut self, guard: Condition) -> Self {
        self.guard = Some(guard);
        self
    }

    pub(super) fn evaluate(&self, host: &mut Host, tracker: &ChangeTracker) -> Result<Evaluation> {
        if let Some(guard) = &self.guard
            && !guard.evaluate(host, tracker)?
        {
            return Ok(Evaluation::unchanged());
        }
        Ok(Evaluation::change(
            self.commands.iter().map(Action::shell).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::OsFamily;
    use crate::transport::MockTransport;

    #[test]
    fn test_unguarded_always_changes() {
        let mut host = Host::new("box", OsFamily::Alpine, MockTransport::new("box"));
        let eval = Shell::new(["rc-update add cgroups", "true"])
            .evaluate(&mut host, &ChangeTracker::new())
            .unwrap();
        assert!(eval.changed);
        assert_eq!(eval.actions.len(), 2);
    }

    #[test]
    fn test_guard_false_is_unchanged() {
        let mock = MockTransport::new("box");
        mock.on_ok("cut -d: -f1 /etc/group", "root\natc\n");
        let mut host = Host::new("box", OsFamily::Alpine, mock);

        let eval = Shell::new(["addgroup -S atc"])
            .only_if(Condition::GroupMissing("atc".into()))
            .evaluate(&mut host, &ChangeTracker::new())
            .unwrap();
        assert!(!eval.changed);
        assert!(eval.actions.is_empty());
    }
}
