//! Shared progress of the active run, polled by the HTTP layer.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::types::ProcessingError;

/// Thread-safe progress counters plus a cooperative stop flag.
///
/// The orchestrator is the only writer while a run is active; handlers read snapshots and may
/// request a stop, which is honored before the next file starts.
#[derive(Debug, Default)]
pub struct RunProgress {
    total: AtomicUsize,
    completed: AtomicUsize,
    is_running: AtomicBool,
    stop_requested: AtomicBool,
    stopped: AtomicBool,
    labels: Mutex<ProgressLabels>,
}

#[derive(Debug, Default)]
struct ProgressLabels {
    current_file: Option<String>,
    error: Option<String>,
}

impl RunProgress {
    /// Create an idle progress tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a run as started, resetting counters. Fails while another run is active.
    pub fn try_begin(&self) -> Result<(), ProcessingError> {
        self.is_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ProcessingError::AlreadyRunning)?;
        self.total.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.stop_requested.store(false, Ordering::Release);
        self.stopped.store(false, Ordering::Relaxed);
        *self.labels() = ProgressLabels::default();
        Ok(())
    }

    /// Record how many files the run will process.
    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
    }

    /// Record the file currently being processed.
    pub fn start_file(&self, name: &str) {
        self.labels().current_file = Some(name.to_string());
    }

    /// Record that the current file reached a terminal status.
    pub fn finish_file(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.labels().current_file = None;
    }

    /// Ask the active run to stop before its next file. Returns whether a run was active.
    pub fn request_stop(&self) -> bool {
        let running = self.is_running.load(Ordering::Acquire);
        if running {
            self.stop_requested.store(true, Ordering::Release);
        }
        running
    }

    /// Whether a stop has been requested for the active run.
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Mark the run finished, recording whether it stopped early and any run-level error.
    pub fn finish(&self, stopped: bool, error: Option<String>) {
        self.stopped.store(stopped, Ordering::Relaxed);
        {
            let mut labels = self.labels();
            labels.current_file = None;
            labels.error = error;
        }
        self.is_running.store(false, Ordering::Release);
    }

    /// Whether a run is currently active.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Return a snapshot of the current progress.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let labels = self.labels();
        ProgressSnapshot {
            total: self.total.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            current_file: labels.current_file.clone(),
            is_running: self.is_running.load(Ordering::Acquire),
            stopped: self.stopped.load(Ordering::Relaxed),
            error: labels.error.clone(),
        }
    }

    fn labels(&self) -> MutexGuard<'_, ProgressLabels> {
        self.labels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Immutable view of run progress returned by `GET /process/status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ProgressSnapshot {
    /// Files the run will process.
    pub total: usize,
    /// Files that reached a terminal status.
    pub completed: usize,
    /// Name of the file being processed, if any.
    pub current_file: Option<String>,
    /// Whether a run is active.
    pub is_running: bool,
    /// Whether the last run stopped early on request.
    pub stopped: bool,
    /// Run-level failure, e.g. a listing error.
    pub error: Option<String>,
}
