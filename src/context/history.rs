//! Change history records.
//!
//! Every write to a [`ContextStore`](super::ContextStore) appends exactly one
//! [`HistoryRecord`] to an ordered log. The log is a total order over all
//! writes: for any single key, the order of its records matches the key's
//! version order, and a reader can never observe a value whose record has
//! not yet been appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry in the append-only change log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Position in the log, starting at 0.
    pub seq: u64,

    /// Key that was written.
    pub key: String,

    /// Value the key held before this write, if any.
    pub old_value: Option<Value>,

    /// Value written.
    pub new_value: Value,

    /// Per-key version produced by this write (1 for the first write).
    pub version: u64,

    /// Attribution: who performed the write (usually a step name).
    pub who: String,

    /// When the write happened.
    pub timestamp: DateTime<Utc>,
}

impl HistoryRecord {
    /// Whether this record created the key.
    pub fn is_initial(&self) -> bool {
        self.old_value.is_none()
    }
}
