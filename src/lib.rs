//! Runtime deadlock detection for tracked mutexes, rwlocks, and condvars.
//!
//! This crate intercepts every lock/unlock/wait/notify on its own
//! [`Mutex`], [`RwLock`], and [`Condvar`] types and maintains a live
//! wait-for graph between threads and the locks they hold or are waiting
//! for. Every time a thread is about to block, the graph is checked for a
//! cycle *before* the real blocking call happens; if one is found, the
//! configured callback fires immediately with a [`DeadlockReport`]
//! describing exactly which threads and locks are involved.
//!
//! The detector observes — it never changes what actually happens to the
//! blocked thread. A reported deadlock that really is one still blocks
//! forever, exactly as it would with an untracked mutex; the callback is
//! the mechanism for noticing that before your test suite (or your pager)
//! does.
//!
//! # Getting started
//!
//! ```no_run
//! tangle::init(tangle::Config::new().with_callback(|report| {
//!     eprintln!("deadlock: {}", report.to_json());
//! }))
//! .unwrap();
//!
//! let mutex = tangle::Mutex::new(0);
//! {
//!     let mut guard = mutex.lock().unwrap();
//!     *guard += 1;
//! }
//! ```
//!
//! # What this does not do
//!
//! It does not prevent deadlocks, does not detect livelock or priority
//! inversion, and says nothing about correctness of locks it was never told
//! about. See the module docs on [`graph`] for the detection algorithm and
//! [`error`] for the error taxonomy.

mod config;
mod detector;
mod error;
mod graph;
mod ids;
mod log;
mod registry;
pub mod stress;
mod sync;

pub use config::{
    Config, current_thread_id, flush_logs, init, is_deadlock_detected, register_thread_exit,
    register_thread_spawn, reset_deadlock_flag,
};
pub use error::{Error, Result};
pub use graph::DeadlockReport;
pub use ids::{LockId, ThreadId};
pub use sync::{
    Condvar, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, WaitTimeoutResult,
};

/// Spawns a thread and registers its parent/child relationship and exit
/// cleanup automatically.
///
/// Equivalent to calling [`std::thread::spawn`] and then
/// [`register_thread_spawn`]/[`register_thread_exit`] by hand around `f` —
/// provided because forgetting the exit half leaks the thread's held-lock
/// bookkeeping until the next full scan, and there is no such scan (this
/// detector is purely event-driven).
pub fn spawn<F, T>(f: F) -> std::thread::JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let parent = ids::current_tid();
    let tid = ids::allocate_tid();
    register_thread_spawn(tid, parent);
    std::thread::spawn(move || {
        ids::adopt_tid(tid);
        let result = f();
        register_thread_exit(tid);
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn ensure_init() {
        INIT.call_once(|| {
            let _ = init(Config::new());
        });
    }

    #[test]
    fn spawn_registers_parent_and_cleans_up_on_exit() {
        ensure_init();
        let handle = spawn(|| current_thread_id());
        let child_tid = handle.join().unwrap();
        assert_ne!(child_tid, current_thread_id());
    }
}
