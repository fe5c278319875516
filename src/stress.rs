//! Optional stress-testing hooks
//!
//! These inject a small random delay right before a tracked primitive
//! attempts its real blocking acquisition, widening the window in which
//! genuinely racy lock orderings interleave — useful for coaxing out a
//! deadlock that only shows up once in a thousand runs. They have no effect
//! on correctness or on the graph: the jitter happens entirely outside the
//! detector's bookkeeping.
//!
//! Configuration is one-shot and must happen before [`crate::init`]; once
//! the detector is running, the jitter mode is frozen for the rest of the
//! process, the same way the detector's own configuration is.

use std::time::Duration;

use once_cell::sync::OnceCell;
use rand::Rng;

use crate::config;
use crate::error::{Error, Result};

enum StressMode {
    Disabled,
    Random { probability: f64, min: Duration, max: Duration },
    Component { min: Duration, max: Duration },
}

static MODE: OnceCell<StressMode> = OnceCell::new();

fn set_mode(mode: StressMode) -> Result<()> {
    if config::try_state().is_some() {
        return Err(Error::AlreadyInitialized);
    }
    MODE.set(mode).map_err(|_| Error::AlreadyInitialized)
}

/// Enables jitter: before each blocking acquisition, with probability
/// `probability` (clamped to `[0.0, 1.0]`), sleep for a random duration in
/// `[min_us, max_us]` microseconds.
pub fn enable_random(probability: f64, min_us: u64, max_us: u64) -> Result<()> {
    set_mode(StressMode::Random {
        probability: probability.clamp(0.0, 1.0),
        min: Duration::from_micros(min_us),
        max: Duration::from_micros(max_us.max(min_us)),
    })
}

/// Enables a fixed-probability-one delay: every blocking acquisition sleeps
/// a random duration in `[min_us, max_us]` microseconds, with no chance of
/// skipping it. Useful for deterministically widening every acquisition's
/// window rather than just a sampled fraction of them.
pub fn enable_component(min_us: u64, max_us: u64) -> Result<()> {
    set_mode(StressMode::Component {
        min: Duration::from_micros(min_us),
        max: Duration::from_micros(max_us.max(min_us)),
    })
}

/// Disables jitter. Equivalent to never calling [`enable_random`]; provided
/// so callers can express "explicitly off" in configuration rather than
/// relying on the implicit default.
pub fn disable() -> Result<()> {
    set_mode(StressMode::Disabled)
}

/// Called by the sync engines right before a real blocking acquisition.
/// A no-op unless [`enable_random`] was configured before `init`.
pub(crate) fn maybe_jitter() {
    match MODE.get() {
        Some(StressMode::Random { probability, min, max }) => {
            let mut rng = rand::thread_rng();
            if rng.gen_bool(*probability) {
                std::thread::sleep(sample_delay(&mut rng, *min, *max));
            }
        }
        Some(StressMode::Component { min, max }) => {
            let mut rng = rand::thread_rng();
            std::thread::sleep(sample_delay(&mut rng, *min, *max));
        }
        Some(StressMode::Disabled) | None => {}
    }
}

fn sample_delay(rng: &mut impl Rng, min: Duration, max: Duration) -> Duration {
    if max > min {
        Duration::from_micros(rng.gen_range(min.as_micros()..=max.as_micros()) as u64)
    } else {
        min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_is_a_no_op_when_unconfigured() {
        // MODE may already be set by another test in this binary; this just
        // checks the call never panics either way.
        maybe_jitter();
    }

    #[test]
    fn probability_is_clamped_to_a_valid_range() {
        match (StressMode::Random {
            probability: 5.0_f64.clamp(0.0, 1.0),
            min: Duration::from_micros(1),
            max: Duration::from_micros(2),
        }) {
            StressMode::Random { probability, .. } => assert_eq!(probability, 1.0),
            StressMode::Disabled | StressMode::Component { .. } => unreachable!(),
        }
    }

    #[test]
    fn sample_delay_falls_back_to_min_when_range_is_empty() {
        let mut rng = rand::thread_rng();
        let d = sample_delay(&mut rng, Duration::from_micros(5), Duration::from_micros(5));
        assert_eq!(d, Duration::from_micros(5));
    }
}
