//! The mutex engine: a generic, RAII mutex whose lock/unlock
//! path runs through the wait-for graph before ever touching the real
//! `parking_lot::Mutex` underneath.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};

use crate::config;
use crate::error::{Error, Result};
use crate::graph::Mode;
use crate::ids::{self, LockId, ThreadId};
use crate::log;
use crate::registry::Kind;

/// A mutex whose acquisitions and releases are reported to the detector.
///
/// `Mutex<T>` owns its data directly (no `UnsafeCell` wrapping is visible to
/// callers) and hands out [`MutexGuard`] on `lock`/`try_lock`, exactly like
/// `std::sync::Mutex` or `parking_lot::Mutex`. The one visible difference:
/// both methods return a [`crate::error::Result`], since a reentrant
/// re-lock from the same thread is a reported error rather than a real
/// self-deadlock.
pub struct Mutex<T: ?Sized> {
    pub(crate) lid: LockId,
    inner: parking_lot::Mutex<UnsafeCellWrapper<T>>,
}

// `parking_lot::Mutex` already requires `T: Send` for `Sync`; the wrapper
// exists only so `MutexGuard` can hand out `&mut T` through the inner guard
// without a second layer of `RefCell`-style borrow checking.
pub(crate) struct UnsafeCellWrapper<T: ?Sized>(UnsafeCell<T>);
unsafe impl<T: ?Sized + Send> Send for UnsafeCellWrapper<T> {}

unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates a new tracked mutex wrapping `value`.
    ///
    /// # Panics
    ///
    /// Panics if [`crate::init`] has not been called yet — tracked
    /// primitives cannot be registered with a detector that does not exist.
    pub fn new(value: T) -> Self {
        let state = config::state();
        let creator = ids::current_tid();
        let lid = state.registry.create(Kind::Mutex, creator);
        Self {
            lid,
            inner: parking_lot::Mutex::new(UnsafeCellWrapper(UnsafeCell::new(value))),
        }
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Blocks until the lock is acquired.
    ///
    /// Reports a cycle to the detector the instant one forms, but — matching
    /// the primitive it wraps — still goes on to block afterward; the
    /// detector observes, it does not arbitrate (see `DESIGN.md`). The one
    /// exception is re-locking a mutex already held by the calling thread:
    /// that can never succeed against the real lock either, so it is
    /// refused immediately as [`Error::Reentrant`] rather than actually
    /// blocking forever.
    pub fn lock(&self) -> Result<MutexGuard<'_, T>> {
        let state = config::state();
        let tid = ids::current_tid();
        let already_held = state.detector.graph().exclusive_holder(self.lid) == Some(tid);

        log::record_wait(tid, self.lid);
        state.detector.guard_wait(tid, self.lid, Mode::Exclusive);

        if already_held {
            // The wait edge just inserted is fictional — this thread never
            // actually blocks, it returns an error instead. Clear it via the
            // same path a real acquisition would take, rather than leaving a
            // stale "waiting for a lock it already holds" edge behind.
            state.detector.graph().on_acquired(tid, self.lid, Mode::Exclusive);
            return Err(Error::Reentrant {
                thread: tid,
                lock: self.lid,
            });
        }

        crate::stress::maybe_jitter();
        let raw = self.inner.lock();
        state.detector.graph().on_acquired(tid, self.lid, Mode::Exclusive);
        log::record_acquired(tid, self.lid);
        Ok(MutexGuard {
            mutex: self,
            tid,
            guard: Some(raw),
        })
    }

    /// Attempts to acquire the lock without blocking.
    ///
    /// `try_lock` never creates a wait edge — it cannot block, so it cannot
    /// contribute to a cycle.
    pub fn try_lock(&self) -> Result<Option<MutexGuard<'_, T>>> {
        let state = config::state();
        let tid = ids::current_tid();
        if state.detector.graph().exclusive_holder(self.lid) == Some(tid) {
            return Err(Error::Reentrant {
                thread: tid,
                lock: self.lid,
            });
        }
        match self.inner.try_lock() {
            Some(raw) => {
                state.detector.graph().on_acquired(tid, self.lid, Mode::Exclusive);
                log::record_acquired(tid, self.lid);
                Ok(Some(MutexGuard {
                    mutex: self,
                    tid,
                    guard: Some(raw),
                }))
            }
            None => Ok(None),
        }
    }

    pub(crate) fn lid(&self) -> LockId {
        self.lid
    }

    /// Explicitly destroys this lock, failing with [`Error::StillInUse`] if
    /// it is somehow still held or waited on. Ordinary `Drop` does the same
    /// removal best-effort when a `Mutex` simply goes out of scope; this
    /// exists for callers that want to observe that failure instead of
    /// having it silently ignored.
    pub fn destroy(self) -> Result<()> {
        let state = config::state();
        state.registry.destroy(self.lid, state.detector.graph())
    }

    pub(crate) fn raw_lock(&self) -> parking_lot::MutexGuard<'_, UnsafeCellWrapper<T>> {
        self.inner.lock()
    }

    pub(crate) fn wrap_guard<'a>(
        &'a self,
        tid: ThreadId,
        raw: parking_lot::MutexGuard<'a, UnsafeCellWrapper<T>>,
    ) -> MutexGuard<'a, T> {
        MutexGuard {
            mutex: self,
            tid,
            guard: Some(raw),
        }
    }
}

/// RAII guard returned by [`Mutex::lock`] / [`Mutex::try_lock`].
///
/// Releasing the lock — whether by dropping the guard or reaching the end of
/// its scope — reports the release to the detector before the real lock is
/// unlocked underneath it.
pub struct MutexGuard<'a, T: ?Sized> {
    pub(crate) mutex: &'a Mutex<T>,
    pub(crate) tid: ThreadId,
    pub(crate) guard: Option<parking_lot::MutexGuard<'a, UnsafeCellWrapper<T>>>,
}

impl<'a, T: ?Sized> MutexGuard<'a, T> {
    /// Splits the guard into its raw parts without running the releasing
    /// `Drop` impl. Used internally by the condvar engine, which needs to
    /// release the real lock itself at a precise point in its wait protocol.
    pub(crate) fn into_raw(
        mut self,
    ) -> (
        &'a Mutex<T>,
        ThreadId,
        parking_lot::MutexGuard<'a, UnsafeCellWrapper<T>>,
    ) {
        let raw = self.guard.take().expect("guard populated until drop");
        (self.mutex, self.tid, raw)
    }
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: the inner `parking_lot::MutexGuard` proves exclusive
        // access to the cell for the guard's lifetime.
        unsafe { &*self.guard.as_ref().unwrap().0.0.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: same as `Deref`, with the guard additionally proving no
        // other reference is live.
        unsafe { &mut *self.guard.as_ref().unwrap().0.0.get() }
    }
}

impl<T: ?Sized> Drop for Mutex<T> {
    fn drop(&mut self) {
        if let Some(state) = config::try_state() {
            let _ = state.registry.destroy(self.lid, state.detector.graph());
        }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(raw) = self.guard.take() {
            drop(raw);
            if let Some(state) = config::try_state() {
                state
                    .detector
                    .graph()
                    .on_released(self.tid, self.mutex.lid, Mode::Exclusive);
                log::record_released(self.tid, self.mutex.lid);
                state
                    .registry
                    .destroy_if_orphaned(self.mutex.lid, state.detector.graph());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn ensure_init() {
        INIT.call_once(|| {
            let _ = config::init(Config::new());
        });
    }

    #[test]
    fn lock_then_unlock_round_trips() {
        ensure_init();
        let m = Mutex::new(5);
        {
            let mut guard = m.lock().unwrap();
            *guard += 1;
        }
        assert_eq!(*m.lock().unwrap(), 6);
    }

    #[test]
    fn try_lock_fails_while_held() {
        ensure_init();
        let m = Mutex::new(0);
        let _guard = m.lock().unwrap();
        // try_lock from the same thread would need to observe the lock as
        // held by someone else to return Ok(None); same-thread re-entry is
        // instead reported as Reentrant.
        assert!(matches!(m.try_lock(), Err(Error::Reentrant { .. })));
    }

    #[test]
    fn try_lock_succeeds_when_free() {
        ensure_init();
        let m = Mutex::new(0);
        assert!(m.try_lock().unwrap().is_some());
    }

    #[test]
    fn relocking_from_the_same_thread_is_reentrant() {
        ensure_init();
        let m = Mutex::new(0);
        let _outer = m.lock().unwrap();
        assert!(matches!(m.lock(), Err(Error::Reentrant { .. })));
    }

    #[test]
    fn destroyed_handle_is_not_resolvable_again() {
        ensure_init();
        let m = Mutex::new(0);
        let lid = m.lid;
        m.destroy().unwrap();
        assert!(matches!(
            config::state().registry.resolve(lid),
            Err(Error::NullHandle(_))
        ));
    }

    #[test]
    fn dropping_a_mutex_removes_it_from_the_registry() {
        ensure_init();
        let lid = {
            let m = Mutex::new(0);
            m.lid
        };
        assert!(matches!(
            config::state().registry.resolve(lid),
            Err(Error::NullHandle(_))
        ));
    }

    #[test]
    fn two_threads_contend_without_a_false_deadlock_report() {
        ensure_init();
        use std::sync::Arc;
        let m = Arc::new(Mutex::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = m.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        *m.lock().unwrap() += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*m.lock().unwrap(), 400);
    }
}
