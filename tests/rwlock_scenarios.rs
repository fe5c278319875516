//! RwLock-specific scenarios: an "upgrade" that is really just a second
//! writer waiting on itself, concurrent readers never conflicting, and a
//! writer correctly waiting on every current reader.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Barrier, Once};
use std::time::{Duration, Instant};

use tangle::{Config, RwLock};

static INIT: Once = Once::new();

/// Flipped by the single process-wide callback registered in
/// [`ensure_init`]. Every scenario in this file shares one detector, so
/// they must all observe the same flag rather than each wiring up its own
/// `Arc` that only the first-to-call-`ensure_init` test ever gets
/// connected to.
static DETECTED: AtomicBool = AtomicBool::new(false);

/// Serializes the scenarios in this file against each other. They all
/// reset and read the same process-global `DETECTED`/deadlock-flag state,
/// so two of them running concurrently — the default under `cargo test` —
/// would otherwise each observe the other's result.
static TEST_SERIAL: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn ensure_init() {
    INIT.call_once(|| {
        tangle::init(Config::new().with_callback(|_report| {
            DETECTED.store(true, Ordering::SeqCst);
        }))
        .unwrap();
    });
}

fn begin_scenario() -> std::sync::MutexGuard<'static, ()> {
    ensure_init();
    let guard = TEST_SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    DETECTED.store(false, Ordering::SeqCst);
    tangle::reset_deadlock_flag();
    guard
}

fn wait_for(timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if DETECTED.load(Ordering::SeqCst) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    DETECTED.load(Ordering::SeqCst)
}

#[test]
fn holding_a_read_lock_then_writing_is_a_self_deadlock() {
    let _guard = begin_scenario();

    let lock = Arc::new(RwLock::new(0));
    let lock_clone = lock.clone();
    std::thread::spawn(move || {
        let _read = lock_clone.read().unwrap();
        // No special-cased upgrade path: this waits like any other writer,
        // which conflicts with the read lock this very thread is holding.
        let _write = lock_clone.write();
    });

    assert!(wait_for(Duration::from_secs(5)));
}

#[test]
fn multiple_readers_never_conflict_with_each_other() {
    let _guard = begin_scenario();

    let lock = Arc::new(RwLock::new(0));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let lock = lock.clone();
            std::thread::spawn(move || {
                let _r = lock.read().unwrap();
                std::thread::sleep(Duration::from_millis(10));
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert!(!wait_for(Duration::from_millis(200)));
}

#[test]
fn writer_waits_for_every_current_reader() {
    let _guard = begin_scenario();

    let lock = Arc::new(RwLock::new(0));
    let barrier = Arc::new(Barrier::new(3));

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let lock = lock.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                let _r = lock.read().unwrap();
                barrier.wait();
                std::thread::sleep(Duration::from_millis(30));
            })
        })
        .collect();

    let writer_lock = lock.clone();
    let writer_barrier = barrier.clone();
    let writer = std::thread::spawn(move || {
        writer_barrier.wait();
        let _w = writer_lock.write().unwrap();
    });

    for h in readers {
        h.join().unwrap();
    }
    writer.join().unwrap();

    assert!(!DETECTED.load(Ordering::SeqCst));
}
