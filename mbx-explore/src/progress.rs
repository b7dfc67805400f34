//! Progress reporting

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::info;

/// Receives status lines and completion percentages
///
/// Both methods may be called from concurrent workers.
pub trait ProgressReporter: Send + Sync {
    fn status(&self, _message: &str) {}

    /// Percentage in `0.0..=100.0`
    fn progress(&self, _percent: f64) {}
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

/// Forwards to tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn status(&self, message: &str) {
        info!("{}", message);
    }

    fn progress(&self, percent: f64) {
        info!(percent = format!("{:.0}", percent), "Progress");
    }
}

/// Completed-over-total counter shared by batch workers
///
/// Reports never go backwards even when workers finish out of order, and
/// 100% is reported exactly once.
#[derive(Debug)]
pub struct ProgressCounter {
    total: usize,
    completed: AtomicUsize,
    reported: Mutex<usize>,
}

impl ProgressCounter {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            reported: Mutex::new(0),
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Record one finished item and report the new percentage
    pub fn complete_one(&self, reporter: &dyn ProgressReporter) {
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;

        let mut reported = self.reported.lock().unwrap_or_else(|p| p.into_inner());
        if done > *reported {
            *reported = done;
            reporter.progress(percent(done, self.total));
        }
    }
}

fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        (done.min(total) as f64 / total as f64) * 100.0
    }
}
