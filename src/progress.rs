//! Cooperative cancellation and progress feedback.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle for reporting progress and requesting cancellation.
///
/// The worker thread polls [`Progress::check`] at its suspension points
/// (between top-level elements, between clusters, between Ogg pages and
/// before each parse phase). The abort flag may be set from any thread;
/// everything else on this type is meant for the single worker thread.
#[derive(Clone, Default)]
pub struct Progress {
    aborted: Arc<AtomicBool>,
    callback: Option<Arc<dyn Fn(&str, f64) + Send + Sync>>,
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

impl Progress {
    /// Creates a handle with no status callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a handle invoking `callback` with a status line and a
    /// completion fraction in `0.0..=1.0` whenever either changes.
    pub fn with_callback(callback: impl Fn(&str, f64) + Send + Sync + 'static) -> Self {
        Self {
            aborted: Arc::new(AtomicBool::new(false)),
            callback: Some(Arc::new(callback)),
        }
    }

    /// Requests cancellation. Safe to call from any thread.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Clears the abort flag so the handle can be reused.
    pub fn reset(&self) {
        self.aborted.store(false, Ordering::Relaxed);
    }

    /// Raises [`Error::OperationAborted`] if cancellation has been requested.
    /// Called at every suspension point.
    pub fn check(&self) -> Result<()> {
        if self.is_aborted() {
            Err(Error::OperationAborted)
        } else {
            Ok(())
        }
    }

    /// Reports a new status line.
    pub fn status(&self, status: &str) {
        if let Some(cb) = &self.callback {
            cb(status, -1.0);
        }
    }

    /// Reports a completion fraction for the current status.
    pub fn percentage(&self, fraction: f64) {
        if let Some(cb) = &self.callback {
            cb("", fraction);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_is_visible_through_clones() {
        let progress = Progress::new();
        let clone = progress.clone();
        assert!(progress.check().is_ok());
        clone.abort();
        assert!(matches!(progress.check(), Err(Error::OperationAborted)));
        progress.reset();
        assert!(clone.check().is_ok());
    }
}
