//! Corrective actions produced by operations.

use fetchkit::Checksum;
use std::fmt;

/// One step that moves a host toward its desired state.
///
/// Actions carry no conditional logic; deciding whether to run them is the
/// operation's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run a shell command; a non-zero exit fails the operation.
    Shell(String),
    /// Replace the content of a file, keeping its mode and owner.
    WriteFile { path: String, content: Vec<u8> },
    /// Download `url` to `dest`, verifying `checksum` when given.
    Fetch {
        url: String,
        dest: String,
        checksum: Option<Checksum>,
    },
}

impl Action {
    pub fn shell(command: impl Into<String>) -> Self {
        Self::Shell(command.into())
    }

    pub fn write_file(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self::WriteFile {
            path: path.into(),
            content: content.into(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shell(command) => write!(f, "{command}"),
            Self::WriteFile { path, content } => {
                write!(f, "write {path} ({} bytes)", content.len())
            }
            Self::Fetch {
                url,
                dest,
                checksum: Some(checksum),
            } => write!(f, "fetch {url} -> {dest} ({checksum})"),
            Self::Fetch { url, dest, .. } => write!(f, "fetch {url} -> {dest}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Action::shell("apk add curl").to_string(), "apk add curl");
        assert_eq!(
            Action::write_file("/etc/motd", "hi\n").to_string(),
            "write /etc/motd (3 bytes)"
        );
        let fetch = Action::Fetch {
            url: "https://example.com/kind".into(),
            dest: "/usr/local/bin/kind".into(),
            checksum: None,
        };
        assert_eq!(
            fetch.to_string(),
            "fetch https://example.com/kind -> /usr/local/bin/kind"
        );
    }
}
