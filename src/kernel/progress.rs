//! Progress reporting and cooperative cancellation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

// ---------------------------------------------------------------------------
// CancellationToken
// ---------------------------------------------------------------------------

/// Shared flag polled at checkpoints inside long-running loops.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// ProgressReporter
// ---------------------------------------------------------------------------

/// Observer callback receiving `(fraction, message)`.
pub type ProgressCallback = Arc<dyn Fn(f64, &str) + Send + Sync>;

#[derive(Default)]
struct ProgressState {
    last: Mutex<f64>,
    observers: RwLock<Vec<ProgressCallback>>,
}

/// Reports a monotonically non-decreasing fraction in `[0, 1]`.
///
/// A reporter created with [`ProgressReporter::sub_range`] maps its own
/// `[0, 1]` onto `[start, end]` of the parent and forwards every report.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    state: Arc<ProgressState>,
    start: f64,
    end: f64,
    parent: Option<Box<ProgressReporter>>,
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("current", &self.current())
            .field("start", &self.start)
            .field("end", &self.end)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

impl ProgressReporter {
    pub fn new() -> Self {
        ProgressReporter {
            end: 1.0,
            ..Self::default()
        }
    }

    /// A child reporter covering `[start, end]` of this one.
    pub fn sub_range(&self, start: f64, end: f64) -> Self {
        let start = start.clamp(0.0, 1.0);
        ProgressReporter {
            state: Arc::default(),
            start,
            end: end.clamp(start, 1.0),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn add_observer(&self, callback: ProgressCallback) {
        self.state.observers.write().push(callback);
    }

    /// Last fraction reported through this reporter.
    pub fn current(&self) -> f64 {
        *self.state.last.lock()
    }

    /// Report `fraction` of this reporter's range; returns the value emitted.
    pub fn report(&self, fraction: f64, message: &str) -> f64 {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        let value = {
            let mut last = self.state.last.lock();
            if fraction > *last {
                *last = fraction;
            }
            *last
        };
        for observer in self.state.observers.read().iter() {
            observer(value, message);
        }
        if let Some(parent) = &self.parent {
            parent.report(self.start + (self.end - self.start) * value, message);
        }
        value
    }

    /// Start again from zero; parents are left untouched.
    pub fn reset(&self) {
        *self.state.last.lock() = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_never_decrease() {
        let p = ProgressReporter::new();
        assert_eq!(p.report(0.5, ""), 0.5);
        assert_eq!(p.report(0.2, "backwards"), 0.5);
        assert_eq!(p.report(2.0, ""), 1.0);
    }

    #[test]
    fn sub_range_maps_into_parent() {
        let parent = ProgressReporter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        parent.add_observer(Arc::new(move |v, _| sink.lock().push(v)));

        let child = parent.sub_range(0.5, 1.0);
        child.report(0.5, "half of child");
        child.report(1.0, "done");
        assert_eq!(*seen.lock(), vec![0.75, 1.0]);
        assert_eq!(parent.current(), 1.0);
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!other.is_cancelled());
    }
}
