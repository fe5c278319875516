//! The condvar engine
//!
//! A condvar wait releases the associated mutex and suspends; that
//! suspended period contributes no edge to the wait-for graph at all — a
//! thread asleep in a condvar is waiting for a notification, not for a lock,
//! and the detector does not model "will this ever be notified". The two
//! points that do touch the graph are the release (immediately, same as any
//! other unlock) and the reacquire once woken (a normal, contributing wait
//! edge on the mutex).
//!
//! The waiter-registration-before-release ordering below exists for the
//! classic reason any condvar needs it: there must be no window between "we
//! gave up the lock" and "we are listed as waiting" in which a notify can be
//! missed.

use std::sync::Arc;

use crate::config;
use crate::error::{Error, Result};
use crate::graph::{Mode, WaitOutcome};
use crate::ids;
use crate::log;
use crate::registry::Kind;

use super::mutex::{Mutex, MutexGuard};

/// Outcome of [`Condvar::wait_timeout`], mirroring
/// `std::sync::WaitTimeoutResult`'s shape so callers can write the same
/// `if result.timed_out() { ... }` idiom they already know.
#[derive(Debug, Clone, Copy)]
pub struct WaitTimeoutResult(bool);

impl WaitTimeoutResult {
    /// Returns `true` if the wait was ended by the timeout elapsing rather
    /// than by a notification.
    pub fn timed_out(&self) -> bool {
        self.0
    }
}

struct Latch {
    signaled: parking_lot::Mutex<bool>,
    ready: parking_lot::Condvar,
}

impl Latch {
    fn new() -> Self {
        Self {
            signaled: parking_lot::Mutex::new(false),
            ready: parking_lot::Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.ready.wait(&mut signaled);
        }
    }

    fn wait_timeout(&self, timeout: std::time::Duration) -> bool {
        let mut signaled = self.signaled.lock();
        let deadline = std::time::Instant::now() + timeout;
        while !*signaled {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let result = self.ready.wait_for(&mut signaled, deadline - now);
            if result.timed_out() && !*signaled {
                return false;
            }
        }
        true
    }

    fn signal(&self) {
        *self.signaled.lock() = true;
        self.ready.notify_one();
    }
}

/// A condition variable whose suspend/reacquire cycle is reported to the
/// detector.
pub struct Condvar {
    lid: crate::ids::LockId,
    waiters: parking_lot::Mutex<Vec<Arc<Latch>>>,
}

impl Condvar {
    /// Creates a new tracked condvar.
    ///
    /// # Panics
    ///
    /// Panics if [`crate::init`] has not been called yet.
    pub fn new() -> Self {
        let state = config::state();
        let creator = ids::current_tid();
        let lid = state.registry.create(Kind::Condvar, creator);
        Self {
            lid,
            waiters: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Atomically releases `guard`'s mutex and blocks until notified, then
    /// reacquires the same mutex before returning.
    ///
    /// Like `std::sync::Condvar::wait`, spurious wakeups are not exposed to
    /// the caller here — this implementation only wakes a waiter in
    /// response to an actual `notify_one`/`notify_all` — but callers should
    /// still re-check their predicate in a loop, since multiple waiters can
    /// be woken by `notify_all` for a condition only one of them satisfies.
    pub fn wait<'a, T: ?Sized>(&self, guard: MutexGuard<'a, T>) -> Result<MutexGuard<'a, T>> {
        let mutex = guard.mutex;
        let mutex_lid = mutex.lid();
        let tid = guard.tid;

        if !config::state().detector.graph().is_holder(tid, mutex_lid) {
            return Err(Error::CondvarMutexNotHeld {
                thread: tid,
                mutex: mutex_lid,
            });
        }

        let latch = Arc::new(Latch::new());
        self.waiters.lock().push(latch.clone());

        let (mutex, tid, raw) = guard.into_raw();
        let state = config::state();
        state.detector.graph().on_condvar_release(tid, mutex_lid);
        log::record_released(tid, mutex_lid);
        state.registry.destroy_if_orphaned(mutex_lid, state.detector.graph());
        drop(raw);

        latch.wait();

        self.reacquire(state, mutex, tid, mutex_lid)
    }

    /// Same as [`Self::wait`], but gives up and reacquires the mutex after
    /// `timeout` if no notification arrives first. Returns whether the wait
    /// timed out.
    pub fn wait_timeout<'a, T: ?Sized>(
        &self,
        guard: MutexGuard<'a, T>,
        timeout: std::time::Duration,
    ) -> Result<(MutexGuard<'a, T>, WaitTimeoutResult)> {
        let mutex = guard.mutex;
        let mutex_lid = mutex.lid();
        let tid = guard.tid;

        if !config::state().detector.graph().is_holder(tid, mutex_lid) {
            return Err(Error::CondvarMutexNotHeld {
                thread: tid,
                mutex: mutex_lid,
            });
        }

        let latch = Arc::new(Latch::new());
        self.waiters.lock().push(latch.clone());

        let (mutex, tid, raw) = guard.into_raw();
        let state = config::state();
        state.detector.graph().on_condvar_release(tid, mutex_lid);
        log::record_released(tid, mutex_lid);
        state.registry.destroy_if_orphaned(mutex_lid, state.detector.graph());
        drop(raw);

        let notified = latch.wait_timeout(timeout);

        self.reacquire(state, mutex, tid, mutex_lid)
            .map(|guard| (guard, WaitTimeoutResult(!notified)))
    }

    fn reacquire<'a, T: ?Sized>(
        &self,
        state: &'static crate::config::State,
        mutex: &'a Mutex<T>,
        tid: crate::ids::ThreadId,
        mutex_lid: crate::ids::LockId,
    ) -> Result<MutexGuard<'a, T>> {
        // Reported regardless of outcome — the thread proceeds to the real
        // reacquire either way (see module docs and `DESIGN.md`).
        let _: WaitOutcome = state.detector.guard_condvar_reacquire(tid, mutex_lid);
        let fresh = mutex.raw_lock();
        state.detector.graph().on_acquired(tid, mutex_lid, Mode::Exclusive);
        log::record_acquired(tid, mutex_lid);
        Ok(mutex.wrap_guard(tid, fresh))
    }

    /// Wakes one waiting thread, if any.
    pub fn notify_one(&self) {
        if let Some(latch) = self.waiters.lock().pop() {
            latch.signal();
        }
    }

    /// Wakes every waiting thread.
    pub fn notify_all(&self) {
        for latch in self.waiters.lock().drain(..) {
            latch.signal();
        }
    }

    /// Explicitly destroys this condvar, failing with
    /// [`crate::Error::StillInUse`] if a thread is still waiting on it.
    /// Ordinary `Drop` does the same removal best-effort.
    pub fn destroy(self) -> Result<()> {
        let state = config::state();
        state.registry.destroy(self.lid, state.detector.graph())
    }
}

impl Drop for Condvar {
    fn drop(&mut self) {
        if let Some(state) = config::try_state() {
            let _ = state.registry.destroy(self.lid, state.detector.graph());
        }
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Arc as StdArc;
    use std::sync::Once;
    use std::time::Duration;

    static INIT: Once = Once::new();

    fn ensure_init() {
        INIT.call_once(|| {
            let _ = config::init(Config::new());
        });
    }

    #[test]
    fn notify_without_waiters_is_a_no_op() {
        ensure_init();
        let cv = Condvar::new();
        cv.notify_one();
        cv.notify_all();
    }

    #[test]
    fn dropping_a_condvar_removes_it_from_the_registry() {
        ensure_init();
        let lid = {
            let cv = Condvar::new();
            cv.lid
        };
        assert!(matches!(
            config::state().registry.resolve(lid),
            Err(Error::NullHandle(_))
        ));
    }

    #[test]
    fn wait_timeout_without_notify_reports_timed_out() {
        ensure_init();
        let m = StdArc::new(Mutex::new(false));
        let cv = StdArc::new(Condvar::new());
        let guard = m.lock().unwrap();
        let (_guard, result) = cv.wait_timeout(guard, Duration::from_millis(20)).unwrap();
        assert!(result.timed_out());
    }

    #[test]
    fn notify_one_wakes_a_single_waiter() {
        ensure_init();
        let pair = StdArc::new((Mutex::new(false), Condvar::new()));
        let waiter_pair = pair.clone();
        let handle = std::thread::spawn(move || {
            let (m, cv) = &*waiter_pair;
            let mut guard = m.lock().unwrap();
            while !*guard {
                guard = cv.wait(guard).unwrap();
            }
        });

        std::thread::sleep(Duration::from_millis(20));
        let (m, cv) = &*pair;
        *m.lock().unwrap() = true;
        cv.notify_one();
        handle.join().unwrap();
    }

    #[test]
    fn notify_all_wakes_every_waiter() {
        ensure_init();
        let pair = StdArc::new((Mutex::new(0), Condvar::new()));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let pair = pair.clone();
                std::thread::spawn(move || {
                    let (m, cv) = &*pair;
                    let mut guard = m.lock().unwrap();
                    while *guard == 0 {
                        guard = cv.wait(guard).unwrap();
                    }
                })
            })
            .collect();

        std::thread::sleep(Duration::from_millis(20));
        let (m, cv) = &*pair;
        *m.lock().unwrap() = 1;
        cv.notify_all();
        for h in handles {
            h.join().unwrap();
        }
    }
}
