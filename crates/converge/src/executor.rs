//! Execution engine: converges hosts one operation at a time, and fleets of
//! hosts in parallel.

use crate::action::Action;
use crate::condition::ChangeTracker;
use crate::context::{NoProgress, ProgressCallback};
use crate::error::{Error, Result};
use crate::host::Host;
use crate::operation::Operation;
use crate::transport::quote;
use crate::types::{ExecuteOptions, OperationReport, Outcome, RunResult, RunStatus};
use fetchkit::Fetcher;
use fetchkit::checksum::digest;
use rayon::prelude::*;
use std::sync::Arc;

/// Applies operations to hosts.
pub struct Executor {
    fetcher: Arc<dyn Fetcher>,
    options: ExecuteOptions,
}

impl Executor {
    /// Create an executor that downloads through `fetcher`.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            options: ExecuteOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ExecuteOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn options(&self) -> &ExecuteOptions {
        &self.options
    }

    /// Converge one host.
    ///
    /// Operations run strictly in order. The first error halts the run;
    /// nothing already applied is rolled back and the remaining operations
    /// are listed as not run.
    pub fn run(
        &self,
        host: &mut Host,
        operations: &[Operation],
        progress: &mut dyn ProgressCallback,
    ) -> RunResult {
        let mut result = RunResult::new(host.name());
        let mut tracker = ChangeTracker::new();

        result.status = RunStatus::Running;
        progress.on_run_start(host.name(), operations.len());

        for (index, operation) in operations.iter().enumerate() {
            progress.on_operation_start(host.name(), &operation.name);

            match self.run_operation(host, operation, &tracker) {
                Ok(report) => {
                    tracker.record(&operation.name, report.changed());
                    progress.on_operation_complete(host.name(), &report);
                    result.reports.push(report);
                }
                Err(cause) => {
                    let error = Error::operation(&operation.name, cause);
                    log::warn!("[{}] {error}", host.name());

                    let report = OperationReport::new(
                        &operation.name,
                        Outcome::Failed {
                            error: error.root().to_string(),
                            category: error.category(),
                        },
                    );
                    progress.on_operation_complete(host.name(), &report);
                    result.reports.push(report);
                    result.not_run = operations[index + 1..]
                        .iter()
                        .map(|op| op.name.clone())
                        .collect();
                    result.error = Some(error);
                    result.status = RunStatus::Failed;
                    progress.on_run_complete(&result);
                    return result;
                }
            }
        }

        result.status = RunStatus::Succeeded;
        progress.on_run_complete(&result);
        result
    }

    /// Converge one host without progress reporting.
    pub fn run_simple(&self, host: &mut Host, operations: &[Operation]) -> RunResult {
        self.run(host, operations, &mut NoProgress)
    }

    /// Converge many hosts on a pool of `jobs` threads.
    ///
    /// `deploy` declares each host's operations and may read its facts.
    /// A failure on one host never affects another. Results keep the order
    /// of `hosts`.
    pub fn run_fleet<D, F, P>(
        &self,
        hosts: Vec<Host>,
        deploy: D,
        make_progress: F,
    ) -> Result<Vec<RunResult>>
    where
        D: Fn(&mut Host) -> Result<Vec<Operation>> + Sync,
        F: Fn(&Host) -> P + Sync,
        P: ProgressCallback,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs.max(1))
            .build()
            .map_err(|e| Error::Config(format!("failed to create thread pool: {e}")))?;

        Ok(pool.install(|| {
            hosts
                .into_par_iter()
                .map(|mut host| {
                    let mut progress = make_progress(&host);
                    match deploy(&mut host) {
                        Ok(operations) => self.run(&mut host, &operations, &mut progress),
                        Err(e) => {
                            log::warn!("[{}] cannot declare deploy: {e}", host.name());
                            let result = RunResult::failed_before_start(host.name(), e);
                            progress.on_run_complete(&result);
                            result
                        }
                    }
                })
                .collect()
        }))
    }

    fn run_operation(
        &self,
        host: &mut Host,
        operation: &Operation,
        tracker: &ChangeTracker,
    ) -> Result<OperationReport> {
        if let Some(condition) = &operation.when
            && !condition.evaluate(host, tracker)?
        {
            log::debug!("[{}] {}: skipped", host.name(), operation.name);
            return Ok(OperationReport::new(
                &operation.name,
                Outcome::Skipped {
                    reason: format!("condition not met: {condition}"),
                },
            ));
        }

        let evaluation = operation.evaluate(host, tracker)?;
        if !evaluation.changed {
            log::debug!("[{}] {}: no change", host.name(), operation.name);
            return Ok(OperationReport::new(&operation.name, Outcome::NoChange));
        }

        let planned: Vec<String> = evaluation.actions.iter().map(ToString::to_string).collect();
        if self.options.dry_run {
            return Ok(
                OperationReport::new(&operation.name, Outcome::WouldChange).with_actions(planned)
            );
        }

        for action in &evaluation.actions {
            self.apply(host, action)?;
        }
        for invalidation in operation.affected() {
            host.invalidate(&invalidation);
        }

        log::info!("[{}] {}: changed", host.name(), operation.name);
        Ok(OperationReport::new(&operation.name, Outcome::Changed).with_actions(planned))
    }

    fn apply(&self, host: &Host, action: &Action) -> Result<()> {
        match action {
            Action::Shell(command) => {
                host.run_checked(command, None)?;
            }
            Action::WriteFile { path, content } => {
                host.run_checked(&format!("cat > {}", quote(path)), Some(content))?;
            }
            Action::Fetch {
                url,
                dest,
                checksum,
            } => {
                let bytes = self
                    .fetcher
                    .fetch(url)
                    .map_err(|source| Error::Download { source })?;
                if let Some(expected) = checksum
                    && !expected.matches(&bytes)
                {
                    return Err(Error::Integrity {
                        url: url.clone(),
                        expected: expected.digest.clone(),
                        actual: digest(expected.algorithm, &bytes),
                    });
                }
                host.run_checked(&format!("cat > {}", quote(dest)), Some(&bytes))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::OsFamily;
    use crate::condition::Condition;
    use crate::error::ErrorCategory;
    use crate::operation::{Directory, Download, File, Line, Packages, Shell, Symlink};
    use crate::transport::{MockTransport, ShellTransport};
    use fetchkit::{Algorithm, Checksum, MockFetcher};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::Mutex;

    fn local_host() -> Host {
        Host::new("localhost", OsFamily::Debian, ShellTransport::local())
    }

    fn executor() -> Executor {
        Executor::new(Arc::new(MockFetcher::new()))
    }

    fn path(dir: &Path, name: &str) -> String {
        dir.join(name).to_string_lossy().into_owned()
    }

    fn outcomes(result: &RunResult) -> Vec<Outcome> {
        result.reports.iter().map(|r| r.outcome.clone()).collect()
    }

    fn filesystem_ops(dir: &Path) -> Vec<Operation> {
        vec![
            Operation::new("conf dir", Directory::new(path(dir, "etc")).mode(0o750)),
            Operation::new(
                "config",
                File::new(path(dir, "etc/app.conf"))
                    .content("port=8080\n")
                    .mode(0o600),
            ),
            Operation::new("setting", Line::new(path(dir, "etc/extra.conf"), "debug=false")),
            Operation::new(
                "current",
                Symlink::new(path(dir, "current"), path(dir, "etc/app.conf")),
            ),
        ]
    }

    #[test]
    fn test_second_run_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ops = filesystem_ops(dir.path());
        let executor = executor();

        let first = executor.run_simple(&mut local_host(), &ops);
        assert!(first.is_success(), "{:?}", first.error);
        assert_eq!(outcomes(&first), vec![Outcome::Changed; 4]);

        let second = executor.run_simple(&mut local_host(), &ops);
        assert!(second.is_success());
        assert_eq!(outcomes(&second), vec![Outcome::NoChange; 4]);
    }

    #[test]
    fn test_host_reaches_declared_state() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor();
        executor.run_simple(&mut local_host(), &filesystem_ops(dir.path()));

        let conf = dir.path().join("etc/app.conf");
        assert_eq!(fs::read_to_string(&conf).unwrap(), "port=8080\n");
        assert_eq!(
            fs::read_to_string(dir.path().join("etc/extra.conf")).unwrap(),
            "debug=false\n"
        );
        assert_eq!(
            fs::read_link(dir.path().join("current")).unwrap(),
            conf
        );

        let mut host = local_host();
        let info = host.path(&conf.to_string_lossy()).unwrap().unwrap();
        assert_eq!(info.mode, 0o600);
        let info = host.path(&path(dir.path(), "etc")).unwrap().unwrap();
        assert_eq!(info.mode, 0o750);
    }

    #[test]
    fn test_later_operation_sees_earlier_change() {
        let dir = tempfile::tempdir().unwrap();
        let file = path(dir.path(), "motd");
        let ops = vec![
            Operation::new("absent first", Line::new(&file, "hello").absent()),
            Operation::new("create", File::new(&file).content("hello\n")),
            Operation::new("still there", Line::new(&file, "hello")),
        ];

        let result = executor().run_simple(&mut local_host(), &ops);
        assert_eq!(
            outcomes(&result),
            vec![Outcome::NoChange, Outcome::Changed, Outcome::NoChange]
        );
    }

    #[test]
    fn test_line_substitution() {
        let dir = tempfile::tempdir().unwrap();
        let file = path(dir.path(), "concourse.conf");
        fs::write(&file, "a\n#test_local_user=\"NO\"\nb\n").unwrap();

        let ops = vec![Operation::new(
            "enable local user",
            Line::new(&file, "test_local_user=\"YES\"").replacing("#test_local_user=\"NO\""),
        )];
        let executor = executor();

        let first = executor.run_simple(&mut local_host(), &ops);
        assert_eq!(outcomes(&first), vec![Outcome::Changed]);
        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "a\ntest_local_user=\"YES\"\nb\n"
        );

        let second = executor.run_simple(&mut local_host(), &ops);
        assert_eq!(outcomes(&second), vec![Outcome::NoChange]);
    }

    #[test]
    fn test_line_restores_commented_default() {
        let dir = tempfile::tempdir().unwrap();
        let file = path(dir.path(), "concourse.conf");
        fs::write(&file, "a\ntest_local_user=\"YES\"\nb\n").unwrap();

        let ops = vec![Operation::new(
            "disable local user",
            Line::new(&file, "#test_local_user=\"NO\"").replacing("test_local_user=\"YES\""),
        )];
        let executor = executor();

        let first = executor.run_simple(&mut local_host(), &ops);
        assert_eq!(outcomes(&first), vec![Outcome::Changed]);
        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "a\n#test_local_user=\"NO\"\nb\n"
        );

        let second = executor.run_simple(&mut local_host(), &ops);
        assert_eq!(outcomes(&second), vec![Outcome::NoChange]);
    }

    #[test]
    fn test_failure_halts_run() {
        let dir = tempfile::tempdir().unwrap();
        let marker = path(dir.path(), "marker");
        let ops = vec![
            Operation::new("first", Shell::new(["true"])),
            Operation::new("second", Shell::new(["echo broken >&2; exit 3"])),
            Operation::new("third", Shell::new([format!("touch {marker}")])),
        ];

        let result = executor().run_simple(&mut local_host(), &ops);
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.reports.len(), 2);
        assert_eq!(result.failed_operation(), Some("second"));
        assert_eq!(result.not_run, vec!["third"]);
        assert!(!Path::new(&marker).exists());

        let error = result.error.unwrap();
        assert_eq!(error.operation_name(), Some("second"));
        assert!(matches!(
            error.root(),
            Error::Command { exit_code: 3, stderr, .. } if stderr == "broken"
        ));
    }

    #[test]
    fn test_when_condition_follows_earlier_change() {
        let dir = tempfile::tempdir().unwrap();
        let archive = path(dir.path(), "release.tgz");
        let extracted = path(dir.path(), "extracted");
        let ops = vec![
            Operation::new("download", File::new(&archive).content("tarball")),
            Operation::new("extract", Shell::new([format!("touch {extracted}")]))
                .when(Condition::changed("download")),
        ];
        let executor = executor();

        let first = executor.run_simple(&mut local_host(), &ops);
        assert_eq!(outcomes(&first), vec![Outcome::Changed, Outcome::Changed]);
        assert!(Path::new(&extracted).exists());

        let second = executor.run_simple(&mut local_host(), &ops);
        assert_eq!(second.reports[0].outcome, Outcome::NoChange);
        assert!(matches!(second.reports[1].outcome, Outcome::Skipped { .. }));
    }

    #[test]
    fn test_dry_run_applies_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = path(dir.path(), "new");
        let ops = vec![
            Operation::new("dir", Directory::new(&target)),
            Operation::new("follow-up", Shell::new(["true"])).when(Condition::changed("dir")),
        ];
        let executor = executor().with_options(ExecuteOptions {
            dry_run: true,
            ..ExecuteOptions::default()
        });

        let result = executor.run_simple(&mut local_host(), &ops);
        assert_eq!(
            outcomes(&result),
            vec![Outcome::WouldChange, Outcome::WouldChange]
        );
        assert_eq!(result.reports[0].actions, vec![format!("mkdir -p {target}")]);
        assert!(!Path::new(&target).exists());
    }

    #[test]
    fn test_download_verifies_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let dest = path(dir.path(), "kind");
        let url = "https://example.com/kind-linux-amd64";
        let fetcher = MockFetcher::new();
        fetcher.add_body(url, b"binary".to_vec());
        let checksum = Checksum::new(Algorithm::Sha256, &digest(Algorithm::Sha256, b"binary"));

        let ops = vec![Operation::new(
            "kind",
            Download::new(url, &dest).checksum(checksum).mode(0o755),
        )];
        let executor = Executor::new(Arc::new(fetcher.clone()));

        let first = executor.run_simple(&mut local_host(), &ops);
        assert!(first.is_success(), "{:?}", first.error);
        assert_eq!(fs::read(&dest).unwrap(), b"binary");

        let second = executor.run_simple(&mut local_host(), &ops);
        assert_eq!(outcomes(&second), vec![Outcome::NoChange]);
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[test]
    fn test_download_through_symlink_converges() {
        let dir = tempfile::tempdir().unwrap();
        let target = path(dir.path(), "kind-v0.28.0");
        let dest = path(dir.path(), "kind");
        fs::write(&target, b"binary").unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o755)).unwrap();
        std::os::unix::fs::symlink(&target, &dest).unwrap();

        let url = "https://example.com/kind-linux-amd64";
        let fetcher = MockFetcher::new();
        fetcher.add_body(url, b"binary".to_vec());
        let executor = Executor::new(Arc::new(fetcher.clone()));

        let plain = vec![Operation::new("kind", Download::new(url, &dest).mode(0o755))];
        for _ in 0..2 {
            let result = executor.run_simple(&mut local_host(), &plain);
            assert_eq!(outcomes(&result), vec![Outcome::NoChange]);
        }

        let checksum = Checksum::new(Algorithm::Sha256, &digest(Algorithm::Sha256, b"binary"));
        let verified = vec![Operation::new("kind", Download::new(url, &dest).checksum(checksum))];
        let result = executor.run_simple(&mut local_host(), &verified);
        assert_eq!(outcomes(&result), vec![Outcome::NoChange]);
        assert!(fetcher.requests().is_empty());
    }

    #[test]
    fn test_download_onto_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let dest = path(dir.path(), "kind");
        fs::create_dir(&dest).unwrap();

        let ops = vec![Operation::new(
            "kind",
            Download::new("https://example.com/kind-linux-amd64", &dest),
        )];
        let result = executor().run_simple(&mut local_host(), &ops);
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.error.unwrap().category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_download_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let dest = path(dir.path(), "concourse.tgz");
        let url = "https://example.com/concourse.tgz";
        let fetcher = MockFetcher::new();
        fetcher.add_body(url, b"tampered".to_vec());
        let checksum = Checksum::new(Algorithm::Sha1, &digest(Algorithm::Sha1, b"original"));

        let ops = vec![Operation::new("fetch", Download::new(url, &dest).checksum(checksum))];
        let result = Executor::new(Arc::new(fetcher)).run_simple(&mut local_host(), &ops);

        assert_eq!(result.status, RunStatus::Failed);
        let error = result.error.unwrap();
        assert_eq!(error.category(), ErrorCategory::Integrity);
        assert!(!Path::new(&dest).exists());
    }

    #[test]
    fn test_fleet_isolates_failures() {
        let healthy = MockTransport::new("web-1");
        healthy.on_ok("apk info", "curl\n");
        let hosts = vec![
            Host::new("web-0", OsFamily::Alpine, MockTransport::unreachable("web-0")),
            Host::new("web-1", OsFamily::Alpine, healthy),
        ];

        let results = executor()
            .run_fleet(
                hosts,
                |_host| Ok(vec![Operation::new("tools", Packages::new(["curl"]))]),
                |_host| NoProgress,
            )
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].host, "web-0");
        assert_eq!(results[0].status, RunStatus::Failed);
        assert!(matches!(
            results[0].reports[0].outcome,
            Outcome::Failed {
                category: ErrorCategory::Connectivity,
                ..
            }
        ));
        assert_eq!(results[1].status, RunStatus::Succeeded);
        assert_eq!(outcomes(&results[1]), vec![Outcome::NoChange]);
    }

    #[test]
    fn test_fleet_deploy_error_fails_only_that_host() {
        let hosts = vec![
            Host::new("a", OsFamily::Debian, MockTransport::new("a")),
            Host::new("b", OsFamily::Debian, MockTransport::new("b")),
        ];

        let results = executor()
            .run_fleet(
                hosts,
                |host| {
                    if host.name() == "a" {
                        Err(Error::Config("no IPv4 address on enp1s0".into()))
                    } else {
                        Ok(vec![Operation::new("noop", Shell::new(["true"]))])
                    }
                },
                |_host| NoProgress,
            )
            .unwrap();

        assert_eq!(results[0].status, RunStatus::Failed);
        assert!(results[0].reports.is_empty());
        assert!(results[1].is_success());
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl ProgressCallback for Recorder {
        fn on_run_start(&mut self, host: &str, operations: usize) {
            self.0.lock().unwrap().push(format!("start {host} {operations}"));
        }
        fn on_operation_start(&mut self, _host: &str, name: &str) {
            self.0.lock().unwrap().push(format!("op {name}"));
        }
        fn on_operation_complete(&mut self, _host: &str, report: &OperationReport) {
            self.0.lock().unwrap().push(format!("done {}", report.name));
        }
        fn on_run_complete(&mut self, result: &RunResult) {
            self.0.lock().unwrap().push(format!("end {:?}", result.status));
        }
    }

    #[test]
    fn test_progress_events() {
        let mut recorder = Recorder::default();
        let mut host = Host::new("box", OsFamily::Alpine, MockTransport::new("box"));
        let ops = vec![Operation::new("noop", Shell::new(["true"]))];

        executor().run(&mut host, &ops, &mut recorder);

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["start box 1", "op noop", "done noop", "end Succeeded"]
        );
    }
}
