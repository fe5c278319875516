//! The deadlock report payload

use crate::ids::{LockId, ThreadId};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// The structured description of a detected cycle, handed to the user
/// callback and (if enabled) appended to the event log.
///
/// Serializes to exactly this JSON schema:
///
/// ```json
/// {
///   "thread_cycle": [1, 2],
///   "thread_waiting_for_locks": [[1, 7], [2, 4]],
///   "timestamp": "2024-01-01T00:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct DeadlockReport {
    /// Thread IDs on the cycle, in traversal order. Closes back to the first
    /// element: the last thread is waiting on a lock held by the first.
    pub thread_cycle: Vec<ThreadId>,
    /// For each thread on the cycle (same order as `thread_cycle`), the lock
    /// it was waiting for when the cycle was discovered.
    pub thread_waiting_for_locks: Vec<(ThreadId, LockId)>,
    /// Wall-clock time the cycle was discovered, RFC 3339 / ISO-8601 UTC.
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: OffsetDateTime,
}

fn serialize_timestamp<S>(ts: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let formatted = ts
        .format(&Rfc3339)
        .map_err(|e| serde::ser::Error::custom(e.to_string()))?;
    serializer.serialize_str(&formatted)
}

impl DeadlockReport {
    pub(crate) fn new(
        thread_cycle: Vec<ThreadId>,
        thread_waiting_for_locks: Vec<(ThreadId, LockId)>,
    ) -> Self {
        Self {
            thread_cycle,
            thread_waiting_for_locks,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Serializes this report to the normative JSON schema.
    ///
    /// # Panics
    ///
    /// Panics if serialization fails, which would only happen if `serde_json`
    /// itself were broken — every field here is a plain integer, pair of
    /// integers, or pre-validated timestamp string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("DeadlockReport always serializes")
    }
}
