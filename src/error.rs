//! Error taxonomy for the detector's public API.

use crate::ids::{LockId, ThreadId};

/// Errors returned by the detector's public API.
///
/// Ordered roughly by severity: configuration errors, invalid
/// handles/arguments, contract violations. Detected deadlocks are *not*
/// represented here — they are reported via the callback, not as an `Err`.
/// Allocation failure is not represented either: it is fatal and aborts the
/// process rather than returning.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `init` was called more than once.
    #[error("the detector has already been initialized")]
    AlreadyInitialized,

    /// The log path supplied to `init` could not be opened for append, or
    /// the open sink failed to flush.
    #[error("invalid log path: {0}")]
    InvalidLogPath(std::io::Error),

    /// The structured logger failed to install (e.g. a global subscriber
    /// was already set by the host application).
    #[error("logger initialization failed: {0}")]
    LoggerInit(String),

    /// A lock handle was null / the lock it refers to has already been
    /// destroyed.
    #[error("lock handle {0:?} does not refer to a live lock")]
    NullHandle(LockId),

    /// The handle resolved to a descriptor of a different variant than the
    /// operation expected (e.g. calling `read_lock` on a `Mutex`).
    #[error("lock {0:?} is not the expected primitive kind")]
    TypeMismatch(LockId),

    /// `unlock`/`read_unlock`/`write_unlock` was called by a thread that is
    /// not the current holder.
    #[error("thread {thread:?} is not the current holder of lock {lock:?}")]
    NotHolder {
        /// The thread that attempted the release.
        thread: ThreadId,
        /// The lock it attempted to release.
        lock: LockId,
    },

    /// `Condvar::wait` was called without the calling thread holding the
    /// associated mutex exclusively.
    #[error("thread {thread:?} called condvar wait without holding mutex {mutex:?}")]
    CondvarMutexNotHeld {
        /// The thread that attempted the wait.
        thread: ThreadId,
        /// The mutex it was expected to hold.
        mutex: LockId,
    },

    /// A lock is being destroyed while it still has holders or waiters, and
    /// this is not happening as part of creator-thread exit cleanup.
    #[error("lock {0:?} is still in use (held or waited on)")]
    StillInUse(LockId),

    /// The calling thread attempted to re-lock a mutex it already holds.
    #[error("thread {thread:?} attempted to re-lock mutex {lock:?} it already holds")]
    Reentrant {
        /// The thread that attempted the re-lock.
        thread: ThreadId,
        /// The mutex already held.
        lock: LockId,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
