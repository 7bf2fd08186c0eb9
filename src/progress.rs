//! Progress indicators: one spinner line per host.

use colored::Colorize;
use converge::{OperationReport, Outcome, ProgressCallback, RunResult};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Shared container for the per-host bars of a fleet run
pub struct FleetProgress {
    bars: MultiProgress,
    quiet: bool,
}

impl FleetProgress {
    pub fn new(quiet: bool) -> Self {
        Self {
            bars: MultiProgress::new(),
            quiet,
        }
    }

    /// Progress reporter for one host
    pub fn host(&self, host: &str) -> HostProgress {
        let bar = if self.quiet {
            ProgressBar::hidden()
        } else {
            self.bars.add(ProgressBar::new(0))
        };
        bar.set_style(bar_style());
        bar.set_prefix(host.to_string());
        HostProgress { bar }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

/// Spinner for a single host's run
pub struct HostProgress {
    bar: ProgressBar,
}

impl ProgressCallback for HostProgress {
    fn on_run_start(&mut self, _host: &str, operations: usize) {
        self.bar.set_length(operations as u64);
        self.bar.enable_steady_tick(Duration::from_millis(120));
    }

    fn on_operation_start(&mut self, _host: &str, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn on_operation_complete(&mut self, host: &str, report: &OperationReport) {
        if let Outcome::Failed { error, .. } = &report.outcome {
            self.bar.suspend(|| {
                eprintln!("  {} [{}] {}: {}", "✗".red(), host, report.name, error);
            });
        }
        self.bar.inc(1);
    }

    fn on_run_complete(&mut self, result: &RunResult) {
        let message = if result.is_success() {
            format!("{} done", "✓".green())
        } else {
            format!("{} failed", "✗".red())
        };
        self.bar.finish_with_message(message);
    }
}
