//! Command transports.
//!
//! A transport runs one shell command on a host and hands back its output.
//! It knows nothing about facts or operations.

use crate::error::{Error, Result};
use crate::types::CommandOutput;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Exit status ssh uses for its own failures.
const SSH_CONNECTION_FAILURE: i32 = 255;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long the pipe threads of a killed command get to finish. Anything
/// still holding the pipes after that (a backgrounded grandchild) keeps its
/// thread alive past the call.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn join_within<T>(handle: thread::JoinHandle<T>, deadline: Instant) -> Option<T> {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(POLL_INTERVAL);
    }
    handle.join().ok()
}

/// Executes shell commands on a single host.
pub trait Transport: Send {
    /// Name of the host this transport talks to.
    fn host(&self) -> &str;

    /// Run `command` through the host's shell, optionally feeding `stdin`.
    ///
    /// A non-zero exit is not an error here; callers decide what it means.
    fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<CommandOutput>;
}

/// Quote a single shell word.
#[must_use]
pub fn quote(s: &str) -> String {
    shell_escape::unix::escape(s.into()).into_owned()
}

/// Runs commands through `sh -c`, either locally or behind a connector
/// prefix such as `ssh root@host`.
#[derive(Debug, Clone)]
pub struct ShellTransport {
    host: String,
    connector: Vec<String>,
    timeout: Option<Duration>,
}

impl ShellTransport {
    /// Transport for the machine we are running on.
    pub fn local() -> Self {
        Self {
            host: "localhost".to_string(),
            connector: Vec::new(),
            timeout: None,
        }
    }

    /// Transport that prefixes every command with `connector`.
    ///
    /// The command is passed as one trailing argument, which is what
    /// `ssh user@host` expects.
    pub fn with_connector(host: impl Into<String>, connector: Vec<String>) -> Self {
        Self {
            host: host.into(),
            connector,
            timeout: None,
        }
    }

    /// Kill commands that run longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn command(&self, command: &str) -> Command {
        match self.connector.split_first() {
            Some((program, args)) => {
                let mut cmd = Command::new(program);
                cmd.args(args).arg(command);
                cmd
            }
            None => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(command);
                cmd
            }
        }
    }

    fn is_ssh(&self) -> bool {
        self.connector
            .first()
            .and_then(|p| Path::new(p).file_name())
            .is_some_and(|name| name == "ssh")
    }
}

impl Transport for ShellTransport {
    fn host(&self) -> &str {
        &self.host
    }

    fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<CommandOutput> {
        log::debug!("[{}] $ {}", self.host, command);

        let mut child = self
            .command(command)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::connectivity(&self.host, format!("failed to spawn: {e}")))?;

        let writer = match (child.stdin.take(), stdin) {
            (Some(mut pipe), Some(data)) => {
                let data = data.to_vec();
                Some(thread::spawn(move || pipe.write_all(&data)))
            }
            _ => None,
        };
        let stdout_reader = child.stdout.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                buf
            })
        });
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                buf
            })
        });

        let status = match self.timeout {
            None => Some(child.wait()),
            Some(timeout) => wait_until(&mut child, Instant::now() + timeout).transpose(),
        };
        let status = match status {
            Some(status) => status.map_err(|e| Error::connectivity(&self.host, e.to_string()))?,
            None => {
                let _ = child.kill();
                let _ = child.wait();

                let grace = Instant::now() + DRAIN_GRACE;
                let mut abandoned = writer.is_some_and(|h| join_within(h, grace).is_none());
                for reader in [stdout_reader, stderr_reader].into_iter().flatten() {
                    abandoned |= join_within(reader, grace).is_none();
                }
                if abandoned {
                    log::debug!("[{}] pipes still open after kill: {command}", self.host);
                }
                return Err(Error::Timeout {
                    command: command.to_string(),
                    after: self.timeout.unwrap_or_default(),
                });
            }
        };

        if let Some(writer) = writer
            && let Ok(Err(e)) = writer.join()
        {
            // The command may legitimately stop reading early.
            log::debug!("[{}] stdin write ended early: {e}", self.host);
        }
        let stdout = stdout_reader
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        let stderr = stderr_reader
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        let output = CommandOutput {
            stdout,
            stderr,
            exit_code: status.code().unwrap_or(-1),
        };

        if self.is_ssh() && output.exit_code == SSH_CONNECTION_FAILURE {
            return Err(Error::connectivity(
                &self.host,
                output.stderr_str().trim().to_string(),
            ));
        }

        Ok(output)
    }
}

/// Scripted transport for tests.
///
/// Responses are matched by command prefix; the most recently added rule
/// wins. Unmatched commands succeed with empty output. Every command is
/// recorded.
#[derive(Clone, Default)]
pub struct MockTransport {
    host: String,
    rules: Arc<Mutex<VecDeque<(String, CommandOutput)>>>,
    log: Arc<Mutex<Vec<(String, Option<Vec<u8>>)>>>,
    unreachable: bool,
}

impl MockTransport {
    /// Create a mock transport for `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// A transport whose every command fails with a connectivity error.
    pub fn unreachable(host: impl Into<String>) -> Self {
        Self {
            unreachable: true,
            ..Self::new(host)
        }
    }

    /// Respond to commands starting with `prefix`.
    pub fn on(&self, prefix: impl Into<String>, output: CommandOutput) -> &Self {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_front((prefix.into(), output));
        self
    }

    /// Respond to commands starting with `prefix` with successful `stdout`.
    pub fn on_ok(&self, prefix: impl Into<String>, stdout: impl Into<Vec<u8>>) -> &Self {
        self.on(prefix, CommandOutput::ok(stdout))
    }

    /// Commands executed so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(cmd, _)| cmd.clone())
            .collect()
    }

    /// Stdin fed to the first command starting with `prefix`.
    pub fn stdin_of(&self, prefix: &str) -> Option<Vec<u8>> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(cmd, _)| cmd.starts_with(prefix))
            .and_then(|(_, input)| input.clone())
    }

    /// Whether any executed command starts with `prefix`.
    pub fn ran(&self, prefix: &str) -> bool {
        self.commands().iter().any(|c| c.starts_with(prefix))
    }
}

impl Transport for MockTransport {
    fn host(&self) -> &str {
        &self.host
    }

    fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<CommandOutput> {
        if self.unreachable {
            return Err(Error::connectivity(&self.host, "connection refused"));
        }
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((command.to_string(), stdin.map(<[u8]>::to_vec)));

        let rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rules
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("two words"), "'two words'");
        assert_eq!(quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_local_exec_captures_output() {
        let transport = ShellTransport::local();
        let out = transport.exec("echo out; echo err >&2; exit 3", None).unwrap();
        assert_eq!(out.stdout_str(), "out\n");
        assert_eq!(out.stderr_str(), "err\n");
        assert_eq!(out.exit_code, 3);
    }

    #[test]
    fn test_local_exec_feeds_stdin() {
        let transport = ShellTransport::local();
        let out = transport.exec("cat", Some(b"hello")).unwrap();
        assert_eq!(out.stdout, b"hello");
    }

    #[test]
    fn test_local_exec_times_out() {
        let transport = ShellTransport::local().with_timeout(Duration::from_millis(100));
        let err = transport.exec("sleep 5", None).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[test]
    fn test_timeout_does_not_wait_for_background_jobs() {
        let transport = ShellTransport::local().with_timeout(Duration::from_millis(100));
        let started = Instant::now();
        let err = transport.exec("sleep 10 & sleep 10", None).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_connector_prefix() {
        let transport = ShellTransport::with_connector(
            "box",
            vec!["sh".to_string(), "-c".to_string()],
        );
        let out = transport.exec("echo via connector", None).unwrap();
        assert_eq!(out.stdout_str().trim(), "via connector");
        assert_eq!(transport.host(), "box");
    }

    #[test]
    fn test_missing_connector_is_connectivity() {
        let transport = ShellTransport::with_connector(
            "box",
            vec!["/nonexistent/connector".to_string()],
        );
        let err = transport.exec("true", None).unwrap_err();
        assert!(matches!(err, Error::Connectivity { .. }));
    }

    #[test]
    fn test_mock_latest_rule_wins() {
        let mock = MockTransport::new("box");
        mock.on_ok("apk info", "curl\n");
        mock.on_ok("apk info", "curl\nbash\n");

        let out = mock.exec("apk info", None).unwrap();
        assert_eq!(out.stdout_str(), "curl\nbash\n");

        let unmatched = mock.exec("true", None).unwrap();
        assert!(unmatched.success());
        assert_eq!(mock.commands(), vec!["apk info", "true"]);
    }

    #[test]
    fn test_mock_records_stdin() {
        let mock = MockTransport::new("box");
        mock.exec("cat > /etc/motd", Some(b"hi")).unwrap();
        assert_eq!(mock.stdin_of("cat >"), Some(b"hi".to_vec()));
    }

    #[test]
    fn test_mock_unreachable() {
        let mock = MockTransport::unreachable("box");
        let err = mock.exec("true", None).unwrap_err();
        assert!(matches!(err, Error::Connectivity { .. }));
        assert!(mock.commands().is_empty());
    }
}
