//! The live wait-for graph and its cycle detector
//!
//! Mirrors the shape of a classic runtime lock-dependency checker: a single
//! lock guards a small adjacency structure, every edge insertion runs a DFS
//! looking for a path back to its own source, and the search happens while
//! still holding that lock so no other thread can observe a half-updated
//! graph. The difference from a held-lock *class* graph is that this one
//! tracks live per-thread, per-lock-instance edges instead of static lock
//! classes, and a conflicting edge is reported rather than panicked on.
//!
//! Allocation failure while mutating the graph is the one fatal case: the
//! global allocator's default handler aborts the process rather than
//! unwinding through half-updated adjacency state, which is exactly the
//! guarantee needed here — there is no recovery path that leaves the graph
//! consistent, so none is attempted.

pub mod report;

use std::collections::{HashMap, HashSet};

use crate::ids::{LockId, ThreadId};

pub use report::DeadlockReport;

/// The mode under which a thread is holding or waiting for a lock.
///
/// `Condvar` is mechanically identical to `Exclusive` for conflict purposes
/// (reacquiring the associated mutex after a wake is always an exclusive
/// acquisition) but is kept as a distinct tag so reports and logs can tell a
/// plain mutex wait from a post-wait reacquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Mode {
    /// Exclusive acquisition: a `Mutex::lock` or `RwLock::write`.
    Exclusive,
    /// Shared acquisition: an `RwLock::read`.
    Shared,
    /// Reacquiring a mutex after a condvar wait.
    Condvar,
}

impl Mode {
    fn conflicts_with_any_holder(self) -> bool {
        !matches!(self, Mode::Shared)
    }
}

/// Outcome of registering a new wait edge.
pub enum WaitOutcome {
    /// No cycle was formed; the caller may proceed to block on the real
    /// primitive.
    Proceed,
    /// A cycle closed back to the waiting thread. The edge is left in place
    /// — the caller still proceeds to block, matching the real primitive's
    /// behavior (see `DESIGN.md`, Open Question resolution).
    Deadlock(DeadlockReport),
}

#[derive(Default)]
struct Hold {
    readers: HashSet<ThreadId>,
    writer: Option<ThreadId>,
}

impl Hold {
    fn is_empty(&self) -> bool {
        self.readers.is_empty() && self.writer.is_none()
    }

    fn holds(&self, tid: ThreadId) -> bool {
        self.writer == Some(tid) || self.readers.contains(&tid)
    }

    fn conflicting_holders(&self, mode: Mode) -> Vec<ThreadId> {
        if mode.conflicts_with_any_holder() {
            self.readers.iter().copied().chain(self.writer).collect()
        } else {
            self.writer.into_iter().collect()
        }
    }
}

#[derive(Default)]
struct Inner {
    holds: HashMap<LockId, Hold>,
    waits: HashMap<ThreadId, (LockId, Mode)>,
}

/// The process-wide live wait-for graph.
///
/// A single `parking_lot::Mutex` serializes every mutation and the DFS that
/// follows it; the lock is released before any callback or blocking
/// acquisition runs, so the detector can never deadlock on itself.
pub(crate) struct Graph {
    inner: parking_lot::Mutex<Inner>,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            inner: parking_lot::Mutex::new(Inner::default()),
        }
    }

    /// Registers that `tid` is about to block waiting for `lid` under `mode`,
    /// and checks whether this closes a cycle back to `tid`.
    ///
    /// A thread has at most one outstanding wait edge; a second call from
    /// the same thread before the first is cleared replaces the earlier
    /// edge.
    pub fn on_about_to_wait(&self, tid: ThreadId, lid: LockId, mode: Mode) -> WaitOutcome {
        let mut inner = self.inner.lock();
        inner.waits.insert(tid, (lid, mode));
        match Self::find_cycle(&inner, tid) {
            Some(report) => WaitOutcome::Deadlock(report),
            None => WaitOutcome::Proceed,
        }
    }

    /// Records that `tid` has acquired `lid` under `mode`, clearing its wait
    /// edge and adding the hold edge.
    pub fn on_acquired(&self, tid: ThreadId, lid: LockId, mode: Mode) {
        let mut inner = self.inner.lock();
        inner.waits.remove(&tid);
        let hold = inner.holds.entry(lid).or_default();
        match mode {
            Mode::Shared => {
                hold.readers.insert(tid);
            }
            Mode::Exclusive | Mode::Condvar => {
                hold.writer = Some(tid);
            }
        }
    }

    /// Records that `tid` released `lid`, which it held under `mode`.
    pub fn on_released(&self, tid: ThreadId, lid: LockId, mode: Mode) {
        let mut inner = self.inner.lock();
        Self::release_locked(&mut inner, tid, lid, mode);
    }

    fn release_locked(inner: &mut Inner, tid: ThreadId, lid: LockId, mode: Mode) {
        if let Some(hold) = inner.holds.get_mut(&lid) {
            match mode {
                Mode::Shared => {
                    hold.readers.remove(&tid);
                }
                Mode::Exclusive | Mode::Condvar => {
                    if hold.writer == Some(tid) {
                        hold.writer = None;
                    }
                }
            }
            if hold.is_empty() {
                inner.holds.remove(&lid);
            }
        }
    }

    /// Returns whether `tid` currently holds `lid`, in any mode.
    pub fn is_holder(&self, tid: ThreadId, lid: LockId) -> bool {
        self.inner
            .lock()
            .holds
            .get(&lid)
            .is_some_and(|hold| hold.holds(tid))
    }

    /// Returns the current exclusive holder of `lid`, if any.
    pub fn exclusive_holder(&self, lid: LockId) -> Option<ThreadId> {
        self.inner.lock().holds.get(&lid).and_then(|h| h.writer)
    }

    /// Returns whether `lid` is currently held by anyone or waited on by
    /// anyone — the condition that forbids destroying it outright.
    pub fn is_in_use(&self, lid: LockId) -> bool {
        let inner = self.inner.lock();
        inner.holds.contains_key(&lid) || inner.waits.values().any(|(wait_lid, _)| *wait_lid == lid)
    }

    /// Brackets the start of a condvar suspension: releases the associated
    /// mutex without registering any new wait edge. A thread asleep in a
    /// condvar is not waiting for a lock in the wait-for-graph sense — it is
    /// waiting for a notification, an event the graph does not model.
    pub fn on_condvar_release(&self, tid: ThreadId, mutex_lid: LockId) {
        self.on_released(tid, mutex_lid, Mode::Exclusive);
    }

    /// Brackets the end of a condvar suspension: the thread attempts to
    /// reacquire the mutex, which is a normal contributing wait edge and can
    /// by itself complete a cycle.
    pub fn on_condvar_reacquire(&self, tid: ThreadId, mutex_lid: LockId) -> WaitOutcome {
        self.on_about_to_wait(tid, mutex_lid, Mode::Condvar)
    }

    /// Removes every trace of `tid` from the graph: its wait edge (if any)
    /// and every hold edge it owns. Used when a thread exits without
    /// explicitly releasing everything it held.
    pub fn remove_thread(&self, tid: ThreadId) {
        let mut inner = self.inner.lock();
        inner.waits.remove(&tid);
        for hold in inner.holds.values_mut() {
            hold.readers.remove(&tid);
            if hold.writer == Some(tid) {
                hold.writer = None;
            }
        }
        inner.holds.retain(|_, hold| !hold.is_empty());
    }

    /// Removes every trace of `lid` from the graph. Used when a lock is
    /// destroyed.
    pub fn remove_lock(&self, lid: LockId) {
        let mut inner = self.inner.lock();
        inner.holds.remove(&lid);
        inner.waits.retain(|_, (wait_lid, _)| *wait_lid != lid);
    }

    /// Searches for a path, starting and ending at `origin`, formed by
    /// alternating wait and conflicting-hold edges.
    ///
    /// The graph is acyclic before a new wait edge is inserted (every prior
    /// insertion was itself checked), so any cycle the new edge creates must
    /// pass through `origin` — it suffices to search for a return path to
    /// `origin` specifically, rather than for cycles anywhere in the graph.
    fn find_cycle(inner: &Inner, origin: ThreadId) -> Option<DeadlockReport> {
        let mut path = vec![origin];
        let mut visiting = HashSet::new();
        visiting.insert(origin);
        Self::dfs(inner, origin, origin, &mut path, &mut visiting)
    }

    fn dfs(
        inner: &Inner,
        origin: ThreadId,
        current: ThreadId,
        path: &mut Vec<ThreadId>,
        visiting: &mut HashSet<ThreadId>,
    ) -> Option<DeadlockReport> {
        let (lid, mode) = *inner.waits.get(&current)?;
        let Some(hold) = inner.holds.get(&lid) else {
            return None;
        };
        for next in hold.conflicting_holders(mode) {
            if next == origin {
                return Some(Self::build_report(inner, path));
            }
            if !visiting.insert(next) {
                continue;
            }
            path.push(next);
            if let Some(report) = Self::dfs(inner, origin, next, path, visiting) {
                return Some(report);
            }
            path.pop();
            visiting.remove(&next);
        }
        None
    }

    fn build_report(inner: &Inner, path: &[ThreadId]) -> DeadlockReport {
        let thread_cycle = path.to_vec();
        let thread_waiting_for_locks = path
            .iter()
            .map(|tid| {
                let (lid, _) = inner.waits[tid];
                (*tid, lid)
            })
            .collect();
        DeadlockReport::new(thread_cycle, thread_waiting_for_locks)
    }
}
