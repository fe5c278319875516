//! The read-write lock engine
//!
//! Conflict detection is mode-aware: a writer waiter conflicts with every
//! current holder (readers and writer alike), while a reader waiter
//! conflicts only with a writer holder — concurrent readers never form an
//! edge between each other, matching [`crate::graph::Mode`]'s semantics.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};

use crate::config;
use crate::error::{Error, Result};
use crate::graph::Mode;
use crate::ids::{self, LockId, ThreadId};
use crate::log;
use crate::registry::Kind;

/// A reader-writer lock whose acquisitions and releases are reported to the
/// detector.
pub struct RwLock<T: ?Sized> {
    pub(crate) lid: LockId,
    inner: parking_lot::RwLock<UnsafeCell<T>>,
}

unsafe impl<T: ?Sized + Send> Send for RwLock<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    /// Creates a new tracked rwlock wrapping `value`.
    ///
    /// # Panics
    ///
    /// Panics if [`crate::init`] has not been called yet.
    pub fn new(value: T) -> Self {
        let state = config::state();
        let creator = ids::current_tid();
        let lid = state.registry.create(Kind::RwLock, creator);
        Self {
            lid,
            inner: parking_lot::RwLock::new(UnsafeCell::new(value)),
        }
    }
}

impl<T: ?Sized> RwLock<T> {
    /// Blocks until a shared (read) lock is acquired.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, T>> {
        let state = config::state();
        let tid = ids::current_tid();
        log::record_wait(tid, self.lid);
        state.detector.guard_wait(tid, self.lid, Mode::Shared);
        crate::stress::maybe_jitter();
        let raw = self.inner.read();
        state.detector.graph().on_acquired(tid, self.lid, Mode::Shared);
        log::record_acquired(tid, self.lid);
        Ok(RwLockReadGuard {
            lock: self,
            tid,
            guard: Some(raw),
        })
    }

    /// Blocks until the exclusive (write) lock is acquired.
    ///
    /// There is no "upgrade" path from a read guard to a write guard — a
    /// thread that holds a read lock and then calls `write` waits like any
    /// other writer, which conflicts with its own held read lock and is
    /// reported as a (trivial) self-cycle, exactly like a reentrant mutex
    /// lock. This crate does not special-case upgrades.
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, T>> {
        let state = config::state();
        let tid = ids::current_tid();
        log::record_wait(tid, self.lid);
        state.detector.guard_wait(tid, self.lid, Mode::Exclusive);
        crate::stress::maybe_jitter();
        let raw = self.inner.write();
        state.detector.graph().on_acquired(tid, self.lid, Mode::Exclusive);
        log::record_acquired(tid, self.lid);
        Ok(RwLockWriteGuard {
            lock: self,
            tid,
            guard: Some(raw),
        })
    }

    /// Attempts to acquire a shared lock without blocking.
    pub fn try_read(&self) -> Result<Option<RwLockReadGuard<'_, T>>> {
        let state = config::state();
        let tid = ids::current_tid();
        match self.inner.try_read() {
            Some(raw) => {
                state.detector.graph().on_acquired(tid, self.lid, Mode::Shared);
                log::record_acquired(tid, self.lid);
                Ok(Some(RwLockReadGuard {
                    lock: self,
                    tid,
                    guard: Some(raw),
                }))
            }
            None => Ok(None),
        }
    }

    /// Attempts to acquire the exclusive lock without blocking.
    pub fn try_write(&self) -> Result<Option<RwLockWriteGuard<'_, T>>> {
        let state = config::state();
        let tid = ids::current_tid();
        match self.inner.try_write() {
            Some(raw) => {
                state.detector.graph().on_acquired(tid, self.lid, Mode::Exclusive);
                log::record_acquired(tid, self.lid);
                Ok(Some(RwLockWriteGuard {
                    lock: self,
                    tid,
                    guard: Some(raw),
                }))
            }
            None => Ok(None),
        }
    }

    /// Explicitly destroys this lock, failing with [`crate::Error::StillInUse`]
    /// if it is somehow still held or waited on. Ordinary `Drop` does the
    /// same removal best-effort when an `RwLock` simply goes out of scope.
    pub fn destroy(self) -> Result<()> {
        let state = config::state();
        state.registry.destroy(self.lid, state.detector.graph())
    }
}

impl<T: ?Sized> Drop for RwLock<T> {
    fn drop(&mut self) {
        if let Some(state) = config::try_state() {
            let _ = state.registry.destroy(self.lid, state.detector.graph());
        }
    }
}

/// RAII guard for a shared (read) acquisition.
pub struct RwLockReadGuard<'a, T: ?Sized> {
    lock: &'a RwLock<T>,
    tid: ThreadId,
    guard: Option<parking_lot::RwLockReadGuard<'a, UnsafeCell<T>>>,
}

impl<T: ?Sized> Deref for RwLockReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: a live `parking_lot::RwLockReadGuard` proves shared access.
        unsafe { &*self.guard.as_ref().unwrap().get() }
    }
}

impl<T: ?Sized> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(raw) = self.guard.take() {
            drop(raw);
            if let Some(state) = config::try_state() {
                state.detector.graph().on_released(self.tid, self.lock.lid, Mode::Shared);
                log::record_released(self.tid, self.lock.lid);
                state
                    .registry
                    .destroy_if_orphaned(self.lock.lid, state.detector.graph());
            }
        }
    }
}

/// RAII guard for an exclusive (write) acquisition.
pub struct RwLockWriteGuard<'a, T: ?Sized> {
    lock: &'a RwLock<T>,
    tid: ThreadId,
    guard: Option<parking_lot::RwLockWriteGuard<'a, UnsafeCell<T>>>,
}

impl<T: ?Sized> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.guard.as_ref().unwrap().get() }
    }
}

impl<T: ?Sized> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.guard.as_ref().unwrap().get() }
    }
}

impl<T: ?Sized> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(raw) = self.guard.take() {
            drop(raw);
            if let Some(state) = config::try_state() {
                state.detector.graph().on_released(self.tid, self.lock.lid, Mode::Exclusive);
                log::record_released(self.tid, self.lock.lid);
                state
                    .registry
                    .destroy_if_orphaned(self.lock.lid, state.detector.graph());
            }
        }
    }
}
