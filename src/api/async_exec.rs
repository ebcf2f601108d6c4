//! Background execution of a whole algorithm.

use std::thread::JoinHandle;

use crate::api::algorithm::AlgorithmRunner;
use crate::error::{FrameworkError, Result};
use crate::kernel::progress::{CancellationToken, ProgressReporter};

/// The runner handed back by [`AsyncExecution::join`] with its outcome.
#[derive(Debug)]
pub struct AsyncResult {
    pub algorithm: AlgorithmRunner,
    pub outcome: Result<bool>,
}

/// Handle to an algorithm running on a worker thread.
#[derive(Debug)]
pub struct AsyncExecution {
    name: String,
    handle: JoinHandle<AsyncResult>,
    cancel: CancellationToken,
    progress: ProgressReporter,
}

impl AsyncExecution {
    pub(crate) fn spawn(mut runner: AlgorithmRunner) -> Self {
        let name = runner.name().to_string();
        let cancel = runner.cancellation_token();
        let progress = runner.progress_reporter().clone();
        runner.reset_run_signals();
        let handle = std::thread::spawn(move || {
            let outcome = runner.execute_prepared();
            AsyncResult {
                algorithm: runner,
                outcome,
            }
        });
        AsyncExecution {
            name,
            handle,
            cancel,
            progress,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Latest reported progress fraction.
    pub fn progress(&self) -> f64 {
        self.progress.current()
    }

    /// Ask the running algorithm to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the algorithm finishes.
    pub fn join(self) -> Result<AsyncResult> {
        self.handle
            .join()
            .map_err(|_| FrameworkError::computation(format!("{} panicked on its worker thread", self.name)))
    }
}
