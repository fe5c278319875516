//! The event log: an always-on `tracing` facade plus an optional
//! line-delimited JSON file sink.
//!
//! Every tracked operation emits a `tracing` event regardless of
//! configuration — the file sink is an additional, opt-in record of the same
//! events aimed at post-mortem tooling rather than a live console.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::graph::DeadlockReport;
use crate::ids::{LockId, ThreadId};

/// One line of the optional event log.
#[derive(Serialize)]
struct Event<'a> {
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tid: Option<ThreadId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lid: Option<LockId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a DeadlockReport>,
    ts: String,
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("unknown"))
}

/// A buffered, append-only sink for the event log's JSON lines.
///
/// Kept deliberately simple: one file, opened once, flushed on request or on
/// drop. There is no rotation or size cap — the event log is meant to cover a
/// single run of the host program, not to be a long-lived append log.
pub(crate) struct Sink {
    writer: parking_lot::Mutex<BufWriter<File>>,
}

impl Sink {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::options().create(true).append(true).open(path)?;
        Ok(Self {
            writer: parking_lot::Mutex::new(BufWriter::new(file)),
        })
    }

    fn write_event(&self, event: &Event<'_>) {
        let Ok(line) = serde_json::to_string(event) else {
            return;
        };
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "{line}");
    }

    pub fn flush(&self) -> io::Result<()> {
        self.writer.lock().flush()
    }
}

static SINK: parking_lot::RwLock<Option<Sink>> = parking_lot::RwLock::new(None);

pub(crate) fn install_sink(sink: Sink) {
    *SINK.write() = Some(sink);
}

/// Flushes the optional file sink, if one is installed. A no-op otherwise.
pub fn flush() -> io::Result<()> {
    match SINK.read().as_ref() {
        Some(sink) => sink.flush(),
        None => Ok(()),
    }
}

fn emit(event: Event<'_>) {
    if let Some(sink) = SINK.read().as_ref() {
        sink.write_event(&event);
    }
}

pub(crate) fn record_lock_created(lid: LockId, creator: ThreadId) {
    tracing::debug!(?lid, ?creator, "lock created");
    emit(Event {
        event: "lock_created",
        tid: Some(creator),
        lid: Some(lid),
        report: None,
        ts: now_rfc3339(),
    });
}

pub(crate) fn record_lock_destroyed(lid: LockId) {
    tracing::debug!(?lid, "lock destroyed");
    emit(Event {
        event: "lock_destroyed",
        tid: None,
        lid: Some(lid),
        report: None,
        ts: now_rfc3339(),
    });
}

pub(crate) fn record_wait(tid: ThreadId, lid: LockId) {
    tracing::trace!(?tid, ?lid, "thread waiting");
    emit(Event {
        event: "wait",
        tid: Some(tid),
        lid: Some(lid),
        report: None,
        ts: now_rfc3339(),
    });
}

pub(crate) fn record_acquired(tid: ThreadId, lid: LockId) {
    tracing::trace!(?tid, ?lid, "lock acquired");
    emit(Event {
        event: "acquired",
        tid: Some(tid),
        lid: Some(lid),
        report: None,
        ts: now_rfc3339(),
    });
}

pub(crate) fn record_released(tid: ThreadId, lid: LockId) {
    tracing::trace!(?tid, ?lid, "lock released");
    emit(Event {
        event: "released",
        tid: Some(tid),
        lid: Some(lid),
        report: None,
        ts: now_rfc3339(),
    });
}

pub(crate) fn record_thread_spawn(tid: ThreadId, parent: ThreadId) {
    tracing::debug!(?tid, ?parent, "thread spawn registered");
    emit(Event {
        event: "thread_spawn",
        tid: Some(tid),
        lid: None,
        report: None,
        ts: now_rfc3339(),
    });
}

pub(crate) fn record_thread_exit(tid: ThreadId) {
    tracing::debug!(?tid, "thread exit registered");
    emit(Event {
        event: "thread_exit",
        tid: Some(tid),
        lid: None,
        report: None,
        ts: now_rfc3339(),
    });
}

pub(crate) fn record_deadlock(report: &DeadlockReport) {
    emit(Event {
        event: "deadlock",
        tid: None,
        lid: None,
        report: Some(report),
        ts: now_rfc3339(),
    });
}
