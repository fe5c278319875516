//! Initialization and global state.
//!
//! The detector is process-wide and initialized exactly once: everything
//! before that call is inert, everything after it runs through the same
//! [`State`] singleton.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

use crate::detector::{Callback, Detector};
use crate::error::{Error, Result};
use crate::graph::DeadlockReport;
use crate::ids::{self, ThreadId};
use crate::log::{self, Sink};
use crate::registry::Registry;
use crate::registry::thread::ThreadRegistry;

const DEFAULT_TRACING_FILTER: &str = "tangle=info";

/// Configuration accepted by [`init`].
#[derive(Default)]
pub struct Config {
    log_path: Option<PathBuf>,
    callback: Option<Callback>,
    tracing_filter: Option<String>,
}

impl Config {
    /// Starts an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables the optional line-delimited JSON event log at `path`.
    #[must_use]
    pub fn with_log_path(mut self, path: impl AsRef<Path>) -> Self {
        self.log_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Registers the callback invoked on deadlock detection.
    #[must_use]
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DeadlockReport) + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Sets the `tracing` filter directive used by the subscriber this crate
    /// installs on [`init`]. Overrides the `TANGLE_LOG` environment
    /// variable, which is otherwise the default source.
    #[must_use]
    pub fn with_tracing_filter(mut self, filter: impl Into<String>) -> Self {
        self.tracing_filter = Some(filter.into());
        self
    }
}

pub(crate) struct State {
    pub detector: Detector,
    pub registry: Registry,
    pub threads: ThreadRegistry,
}

static STATE: OnceCell<State> = OnceCell::new();

/// Initializes the detector. May be called at most once per process; a
/// second call returns [`Error::AlreadyInitialized`] rather than replacing
/// the existing configuration.
///
/// Installs a `tracing` subscriber filtered by [`Config::with_tracing_filter`]
/// if set, else by the `TANGLE_LOG` environment variable, else a crate
/// default. A malformed filter directive is returned as
/// [`Error::LoggerInit`]; a subscriber already installed by the host
/// application is left in place (`try_init` is best-effort here, not fatal —
/// the host's own logging setup always wins).
pub fn init(config: Config) -> Result<()> {
    if STATE.get().is_some() {
        return Err(Error::AlreadyInitialized);
    }

    let filter_directive = config
        .tracing_filter
        .clone()
        .or_else(|| std::env::var("TANGLE_LOG").ok())
        .unwrap_or_else(|| DEFAULT_TRACING_FILTER.to_string());
    let filter = EnvFilter::try_new(&filter_directive)
        .map_err(|e| Error::LoggerInit(e.to_string()))?;
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    if let Some(path) = &config.log_path {
        let sink = Sink::open(path).map_err(Error::InvalidLogPath)?;
        log::install_sink(sink);
    }

    let detector = Detector::new();
    if let Some(callback) = config.callback {
        detector.set_callback(callback);
    }
    let state = State {
        detector,
        registry: Registry::new(),
        threads: ThreadRegistry::new(),
    };

    if STATE.set(state).is_err() {
        return Err(Error::AlreadyInitialized);
    }

    tracing::info!("detector initialized");
    Ok(())
}

pub(crate) fn state() -> &'static State {
    STATE.get().expect("tangle::init must be called before use")
}

pub(crate) fn try_state() -> Option<&'static State> {
    STATE.get()
}

/// Returns whether the process has detected a deadlock since the last
/// [`reset_deadlock_flag`] call (or since [`init`], if never reset).
pub fn is_deadlock_detected() -> bool {
    try_state().is_some_and(|s| s.detector.is_deadlock_detected())
}

/// Clears the "a deadlock has been seen" flag.
pub fn reset_deadlock_flag() {
    if let Some(s) = try_state() {
        s.detector.reset_deadlock_flag();
    }
}

/// Returns the calling thread's stable [`ThreadId`].
pub fn current_thread_id() -> ThreadId {
    ids::current_tid()
}

/// Registers that `tid` was spawned by `parent`, establishing the
/// parent/child relationship consulted on thread exit.
pub fn register_thread_spawn(tid: ThreadId, parent: ThreadId) {
    if let Some(s) = try_state() {
        s.threads.register_spawn(tid, parent);
    }
}

/// Registers that `tid` has exited, releasing everything it held and
/// destroying any lock it created that is no longer referenced.
pub fn register_thread_exit(tid: ThreadId) {
    if let Some(s) = try_state() {
        s.threads.register_exit(tid, &s.registry, s.detector.graph());
    }
}

/// Flushes the optional event log file to disk. A no-op returning `Ok(())`
/// if no log path was configured.
pub fn flush_logs() -> Result<()> {
    log::flush().map_err(Error::InvalidLogPath)
}
