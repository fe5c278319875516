//! Process-unique identifiers for threads and tracked locks.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

/// A process-unique thread identifier.
///
/// Stable for the lifetime of the thread. `0` is reserved for "no parent".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct ThreadId(pub(crate) u64);

impl ThreadId {
    /// The sentinel used for "no parent thread".
    pub const NONE: Self = Self(0);

    /// Returns the raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A process-unique lock identifier, assigned at creation by the resource registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct LockId(pub(crate) u64);

impl LockId {
    /// Returns the raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for LockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_TID: Cell<Option<ThreadId>> = const { Cell::new(None) };
}

/// Returns the stable [`ThreadId`] for the calling OS thread, assigning one
/// on first use.
///
/// Unlike [`crate::register_thread_spawn`], this does not register a
/// parent/child relationship — it is the fallback path for threads that
/// interact with tracked primitives without having been explicitly
/// registered.
pub fn current_tid() -> ThreadId {
    CURRENT_TID.with(|cell| {
        if let Some(tid) = cell.get() {
            return tid;
        }
        let tid = ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
        cell.set(Some(tid));
        tid
    })
}

/// Assigns a fresh, never-reused [`ThreadId`] for explicit spawn registration.
///
/// Does not touch the calling thread's own cached id; the caller is expected
/// to hand this id to the child thread, which will adopt it via
/// [`adopt_tid`].
pub(crate) fn allocate_tid() -> ThreadId {
    ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
}

/// Makes `tid` the calling thread's cached identity.
///
/// Used by the child side of an explicit spawn registration so that
/// subsequent calls to [`current_tid`] on that thread return the assigned id
/// instead of minting a new one.
pub fn adopt_tid(tid: ThreadId) {
    CURRENT_TID.with(|cell| cell.set(Some(tid)));
}

/// Allocates a fresh, never-reused [`LockId`].
pub(crate) fn allocate_lid() -> LockId {
    LockId(NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed))
}
