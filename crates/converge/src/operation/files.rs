//! Filesystem operations: directories, files, lines and symlinks.

use super::Evaluation;
use crate::action::Action;
use crate::error::{Error, Result};
use crate::fact::{PathInfo, PathKind};
use crate::host::Host;
use crate::transport::quote;
use fetchkit::Algorithm;
use fetchkit::checksum::digest;

pub(super) fn conflict(path: &str, expected: PathKind, found: PathKind) -> Error {
    Error::Config(format!("{path} should be a {expected} but is a {found}"))
}

/// chown/chgrp/chmod actions needed to bring `current` to the wanted
/// ownership and mode. `None` for `current` means the path is about to be
/// created.
fn ownership_actions(
    path: &str,
    current: Option<&PathInfo>,
    user: Option<&str>,
    group: Option<&str>,
    mode: Option<u32>,
) -> Vec<Action> {
    let q = quote(path);
    let mut actions = Vec::new();

    let user = user.filter(|u| current.is_none_or(|i| i.user != *u));
    let group = group.filter(|g| current.is_none_or(|i| i.group != *g));
    match (user, group) {
        (Some(u), Some(g)) => actions.push(Action::shell(format!("chown {u}:{g} {q}"))),
        (Some(u), None) => actions.push(Action::shell(format!("chown {u} {q}"))),
        (None, Some(g)) => actions.push(Action::shell(format!("chgrp {g} {q}"))),
        (None, None) => {}
    }

    if let Some(mode) = mode
        && current.is_none_or(|i| i.mode != mode)
    {
        actions.push(Action::shell(format!("chmod {mode:o} {q}")));
    }
    actions
}

/// A directory that must exist (or not).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    pub path: String,
    pub user: Option<String>,
    pub group: Option<String>,
    pub mode: Option<u32>,
    pub present: bool,
}

impl Directory {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            user: None,
            group: None,
            mode: None,
            present: true,
        }
    }

    #[must_use]
    pub fn owner(mut self, user: impl Into<String>, group: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.group = Some(group.into());
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    #[must_use]
    pub fn absent(mut self) -> Self {
        self.present = false;
        self
    }

    pub(super) fn evaluate(&self, host: &mut Host) -> Result<Evaluation> {
        let current = host.path(&self.path)?;
        let q = quote(&self.path);

        match (self.present, current) {
            (false, None) => Ok(Evaluation::unchanged()),
            (false, Some(info)) if info.kind == PathKind::Directory => {
                Ok(Evaluation::change(vec![Action::shell(format!("rm -rf {q}"))]))
            }
            (_, Some(info)) if info.kind != PathKind::Directory => {
                Err(conflict(&self.path, PathKind::Directory, info.kind))
            }
            (true, None) => {
                let mut actions = vec![Action::shell(format!("mkdir -p {q}"))];
                actions.extend(ownership_actions(
                    &self.path,
                    None,
                    self.user.as_deref(),
                    self.group.as_deref(),
                    self.mode,
                ));
                Ok(Evaluation::change(actions))
            }
            (_, Some(info)) => Ok(Evaluation::change(ownership_actions(
                &self.path,
                Some(&info),
                self.user.as_deref(),
                self.group.as_deref(),
                self.mode,
            ))),
        }
    }
}

/// A regular file that must exist (or not), optionally with exact content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub path: String,
    pub content: Option<Vec<u8>>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub mode: Option<u32>,
    pub present: bool,
}

impl File {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: None,
            user: None,
            group: None,
            mode: None,
            present: true,
        }
    }

    #[must_use]
    pub fn content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = Some(content.into());
        self
    }

    #[must_use]
    pub fn owner(mut self, user: impl Into<String>, group: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.group = Some(group.into());
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    #[must_use]
    pub fn absent(mut self) -> Self {
        self.present = false;
        self
    }

    pub(super) fn evaluate(&self, host: &mut Host) -> Result<Evaluation> {
        let current = host.path(&self.path)?;
        let q = quote(&self.path);

        let info = match (self.present, current) {
            (false, None) => return Ok(Evaluation::unchanged()),
            (false, Some(info)) if info.kind == PathKind::Directory => {
                return Err(conflict(&self.path, PathKind::File, info.kind));
            }
            (false, Some(_)) => {
                return Ok(Evaluation::change(vec![Action::shell(format!("rm -f {q}"))]));
            }
            (true, Some(info)) if info.kind != PathKind::File => {
                return Err(conflict(&self.path, PathKind::File, info.kind));
            }
            (true, current) => current,
        };

        let mut actions = Vec::new();
        match (&self.content, &info) {
            (Some(content), None) => actions.push(Action::write_file(&self.path, content.clone())),
            (None, None) => actions.push(Action::shell(format!("touch {q}"))),
            (Some(content), Some(_)) => {
                let wanted = digest(Algorithm::Sha256, content);
                if host.file_digest(&self.path, Algorithm::Sha256)?.as_deref() != Some(wanted.as_str()) {
                    actions.push(Action::write_file(&self.path, content.clone()));
                }
            }
            (None, Some(_)) => {}
        }
        actions.extend(ownership_actions(
            &self.path,
            info.as_ref(),
            self.user.as_deref(),
            self.group.as_deref(),
            self.mode,
        ));
        Ok(Evaluation::change(actions))
    }
}

/// Compute the new content of a file so that `line` is present (or absent).
///
/// Returns `None` when `lines` already satisfies the request. With
/// `replace`, every line equal to it is substituted by `line`; if none is
/// found, `line` is appended.
#[must_use]
pub fn converge_lines(
    lines: &[String],
    line: &str,
    replace: Option<&str>,
    present: bool,
) -> Option<Vec<String>> {
    let has_line = lines.iter().any(|l| l == line);

    if !present {
        return has_line.then(|| lines.iter().filter(|l| *l != line).cloned().collect());
    }
    if has_line {
        return None;
    }
    if let Some(old) = replace
        && lines.iter().any(|l| l == old)
    {
        return Some(
            lines
                .iter()
                .map(|l| if l == old { line.to_string() } else { l.clone() })
                .collect(),
        );
    }
    let mut updated = lines.to_vec();
    updated.push(line.to_string());
    Some(updated)
}

/// A whole line that must be present in (or absent from) a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub path: String,
    pub line: String,
    pub replace: Option<String>,
    pub present: bool,
}

impl Line {
    pub fn new(path: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line: line.into(),
            replace: None,
            present: true,
        }
    }

    /// Substitute lines equal to `old` instead of appending.
    #[must_use]
    pub fn replacing(mut self, old: impl Into<String>) -> Self {
        self.replace = Some(old.into());
        self
    }

    #[must_use]
    pub fn absent(mut self) -> Self {
        self.present = false;
        self
    }

    pub(super) fn evaluate(&self, host: &mut Host) -> Result<Evaluation> {
        let updated = match host.file_lines(&self.path)? {
            None if self.present => vec![self.line.clone()],
            None => return Ok(Evaluation::unchanged()),
            Some(lines) => {
                match converge_lines(&lines, &self.line, self.replace.as_deref(), self.present) {
                    Some(updated) => updated,
                    None => return Ok(Evaluation::unchanged()),
                }
            }
        };

        let mut content = updated.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        Ok(Evaluation::change(vec![Action::write_file(
            &self.path,
            content,
        )]))
    }
}

/// A symlink that must point at `target` (or not exist).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symlink {
    pub path: String,
    pub target: String,
    pub present: bool,
}

impl Symlink {
    pub fn new(path: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            target: target.into(),
            present: true,
        }
    }

    #[must_use]
    pub fn absent(mut self) -> Self {
        self.present = false;
        self
    }

    pub(super) fn evaluate(&self, host: &mut Host) -> Result<Evaluation> {
        let q = quote(&self.path);
        let current = host.path(&self.path)?;

        if let Some(info) = &current
            && info.kind == PathKind::Directory
        {
            return Err(conflict(&self.path, PathKind::Symlink, info.kind));
        }

        if !self.present {
            return Ok(match current {
                Some(info) if info.kind == PathKind::Symlink => {
                    Evaluation::change(vec![Action::shell(format!("rm -f {q}"))])
                }
                Some(info) => return Err(conflict(&self.path, PathKind::Symlink, info.kind)),
                None => Evaluation::unchanged(),
            });
        }

        if host.link(&self.path)?.as_deref() == Some(self.target.as_str()) {
            return Ok(Evaluation::unchanged());
        }
        Ok(Evaluation::change(vec![Action::shell(format!(
            "ln -sfn {} {q}",
            quote(&self.target)
        ))]))
    }
}
