use super::Evaluation;
use super::files::conflict;
use crate::action::Action;
use crate::error::Result;
use crate::fact::PathKind;
use crate::host::Host;
use crate::transport::quote;
use fetchkit::Checksum;

/// A file downloaded from a URL.
///
/// Without a checksum the download is skipped whenever `dest` exists. A
/// symlinked `dest` is judged by the file it points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub url: String,
    pub dest: String,
    pub checksum: Option<Checksum>,
    pub mode: Option<u32>,
}

impl Download {
    pub fn new(url: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dest: dest.into(),
            checksum: None,
            mode: None,
        }
    }

    #[must_use]
    pub fn checksum(mut self, checksum: Option<Checksum>) -> Self {
        self.checksum = checksum;
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub(super) fn evaluate(&self, host: &mut Host) -> Result<Evaluation> {
        let current = host.resolved_path(&self.dest)?;
        if let Some(info) = &current
            && info.kind != PathKind::File
        {
            return Err(conflict(&self.dest, PathKind::File, info.kind));
        }

        let stale = match (&current, &self.checksum) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(_), Some(checksum)) => {
                host.file_digest(&self.dest, checksum.algorithm)?.as_deref()
                    != Some(checksum.digest.as_str())
            }
        };

        let mut actions = Vec::new();
        if stale {
            actions.push(Action::Fetch {
                url: self.url.clone(),
                dest: self.dest.clone(),
                checksum: self.checksum.clone(),
            });
        }
        if let Some(mode) = self.mode {
            let mode_matches = !stale && current.as_ref().is_some_and(|i| i.mode == mode);
            if !mode_matches {
                actions.push(Action::shell(format!("chmod {mode:o} {}", quote(&self.dest))));
            }
        }
        Ok(Evaluation::change(actions))
    }
}
