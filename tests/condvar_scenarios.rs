//! Condvar-specific scenarios: a clean producer/consumer handoff that must
//! never falsely report a deadlock, and a genuine cycle formed across the
//! reacquire-after-wait edge.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Barrier, Once};
use std::time::{Duration, Instant};

use tangle::{Condvar, Config, Mutex};

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
fn clean_producer_consumer_handoff_never_reports_a_deadlock() {
    let _guard = begin_scenario();

    let state = Arc::new((Mutex::new(false), Condvar::new()));
    let consumer_state = state.clone();
    let consumer = std::thread::spawn(move || {
        let (m, cv) = &*consumer_state;
        let mut ready = m.lock().unwrap();
        while !*ready {
            ready = cv.wait(ready).unwrap();
        }
    });

    std::thread::sleep(Duration::from_millis(20));
    let (m, cv) = &*state;
    *m.lock().unwrap() = true;
    cv.notify_one();
    consumer.join().unwrap();

    assert!(!DETECTED.load(Ordering::SeqCst));
}

#[test]
fn spurious_style_notify_before_predicate_is_true_does_not_misfire() {
    let _guard = begin_scenario();

    let state = Arc::new((Mutex::new(0), Condvar::new()));
    let consumer_state = state.clone();
    let consumer = std::thread::spawn(move || {
        let (m, cv) = &*consumer_state;
        let mut count = m.lock().unwrap();
        while *count < 2 {
            count = cv.wait(count).unwrap();
        }
    });

    let (m, cv) = &*state;
    // First notify doesn't satisfy the consumer's predicate; it must loop
    // back into wait() rather than proceeding or misreporting.
    std::thread::sleep(Duration::from_millis(10));
    *m.lock().unwrap() += 1;
    cv.notify_one();

    std::thread::sleep(Duration::from_millis(10));
    *m.lock().unwrap() += 1;
    cv.notify_one();

    consumer.join().unwrap();
    assert!(!DETECTED.load(Ordering::SeqCst));
}

#[test]
fn reacquire_after_wait_can_close_a_cycle() {
    let _guard = begin_scenario();

    // Thread 1: holds `other`, waits on the condvar releasing `mx`, then
    // (once woken) tries to reacquire `mx`.
    // Thread 2: takes `mx`, then waits for `other` — held by thread 1 the
    // whole time. The two threads' reacquire/hold edges close the cycle.
    let mx = Arc::new(Mutex::new(false));
    let other = Arc::new(Mutex::new(()));
    let cv = Arc::new(Condvar::new());
    let barrier = Arc::new(Barrier::new(2));

    {
        let mx = mx.clone();
        let other = other.clone();
        let cv = cv.clone();
        let barrier = barrier.clone();
        std::thread::spawn(move || {
            let _other_guard = other.lock().unwrap();
            let mut ready = mx.lock().unwrap();
            barrier.wait();
            while !*ready {
                ready = cv.wait(ready).unwrap();
            }
        });
    }
    {
        let mx = mx.clone();
        let other = other.clone();
        let cv = cv.clone();
        let barrier = barrier.clone();
        std::thread::spawn(move || {
            barrier.wait();
            std::thread::sleep(Duration::from_millis(20));
            let mut ready = mx.lock().unwrap();
            *ready = true;
            cv.notify_one();
            // Deliberately keep holding `mx` while also waiting for
            // `other` — this is what makes thread 1's reacquire of `mx`
            // conflict with thread 2, closing the cycle.
            let _other_guard = other.lock();
            drop(ready);
        });
    }

    assert!(wait_for(Duration::from_secs(5)));
}
