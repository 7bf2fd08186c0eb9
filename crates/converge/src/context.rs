//! Callback traits used by the executor.
//!
//! These keep the engine free of any particular terminal UI.

use crate::types::{OperationReport, RunResult};

/// Receives progress updates for one host's run.
pub trait ProgressCallback: Send {
    /// Called before the first operation.
    fn on_run_start(&mut self, host: &str, operations: usize);

    /// Called before an operation is evaluated.
    fn on_operation_start(&mut self, host: &str, name: &str);

    /// Called once an operation has an outcome.
    fn on_operation_complete(&mut self, host: &str, report: &OperationReport);

    /// Called when the run reaches a terminal state.
    fn on_run_complete(&mut self, result: &RunResult);
}

/// Progress callback that ignores everything.
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&mut self, _host: &str, _operations: usize) {}
    fn on_operation_start(&mut self, _host: &str, _name: &str) {}
    fn on_operation_complete(&mut self, _host: &str, _report: &OperationReport) {}
    fn on_run_complete(&mut self, _result: &RunResult) {}
}

/// Asks the user before changes are applied.
pub trait ConfirmCallback {
    /// Returns `true` when the user agrees.
    fn confirm(&mut self, prompt: &str) -> std::io::Result<bool>;
}

/// Confirm callback that always says yes.
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> std::io::Result<bool> {
        Ok(true)
    }
}
