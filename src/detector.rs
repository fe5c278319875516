//! The detector/reporter: owns the live graph, the process-wide
//! "a deadlock has been seen" flag, and the single user callback.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::graph::{DeadlockReport, Graph, Mode, WaitOutcome};
use crate::ids::{LockId, ThreadId};
use crate::log;

/// A user-supplied callback invoked, on the thread that discovered the
/// cycle, the moment a deadlock is detected.
pub type Callback = Box<dyn Fn(&DeadlockReport) + Send + Sync + 'static>;

pub(crate) struct Detector {
    graph: Graph,
    seen: AtomicBool,
    callback: parking_lot::Mutex<Option<Callback>>,
}

impl Detector {
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
            seen: AtomicBool::new(false),
            callback: parking_lot::Mutex::new(None),
        }
    }

    pub fn set_callback(&self, callback: Callback) {
        *self.callback.lock() = Some(callback);
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn is_deadlock_detected(&self) -> bool {
        self.seen.load(Ordering::Acquire)
    }

    pub fn reset_deadlock_flag(&self) {
        self.seen.store(false, Ordering::Release);
    }

    /// Registers a wait edge and, if it closes a cycle, fires the callback
    /// and logs the report. Returns the same outcome the underlying graph
    /// call produced, so engines can decide what (if anything) to do beyond
    /// reporting — per the detector's observe-don't-prevent contract, the
    /// answer is always "proceed to block regardless".
    pub fn guard_wait(&self, tid: ThreadId, lid: LockId, mode: Mode) -> WaitOutcome {
        let outcome = self.graph.on_about_to_wait(tid, lid, mode);
        if let WaitOutcome::Deadlock(report) = &outcome {
            self.report(report);
        }
        outcome
    }

    /// Same as [`Self::guard_wait`] but for the condvar-reacquire bracket.
    pub fn guard_condvar_reacquire(&self, tid: ThreadId, mutex_lid: LockId) -> WaitOutcome {
        let outcome = self.graph.on_condvar_reacquire(tid, mutex_lid);
        if let WaitOutcome::Deadlock(report) = &outcome {
            self.report(report);
        }
        outcome
    }

    fn report(&self, report: &DeadlockReport) {
        self.seen.store(true, Ordering::Release);
        tracing::error!(
            thread_cycle = ?report.thread_cycle,
            thread_waiting_for_locks = ?report.thread_waiting_for_locks,
            "deadlock detected"
        );
        log::record_deadlock(report);
        if let Some(callback) = self.callback.lock().as_ref() {
            callback(report);
        }
    }
}
