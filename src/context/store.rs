//! Shared, attributed key/value state.
//!
//! The [`ContextStore`] is the single shared-mutation surface between
//! concurrently executing steps. Current values live in a concurrent map so
//! reads never contend with each other; all writes serialize on the change
//! log lock, and the map update happens while that lock is held. This gives
//! three guarantees at once: writes to a key are linearizable, per-key
//! version order matches log order, and no reader can observe a value whose
//! history record has not been appended.
//!
//! Cross-key snapshot consistency is deliberately not provided;
//! [`ContextStore::snapshot`] documents the caveat.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};

use super::history::HistoryRecord;

/// Current state of a single key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Dot-segmented key, e.g. `fetch.result`.
    pub key: String,

    /// Current value.
    pub value: Value,

    /// Who performed the most recent write.
    pub who: String,

    /// Monotonically increasing write counter for this key, starting at 1.
    pub version: u64,
}

/// Thread-safe key/value store with change attribution and ordered history.
#[derive(Debug, Default)]
pub struct ContextStore {
    entries: DashMap<String, ContextEntry>,
    log: Mutex<Vec<HistoryRecord>>,
}

impl ContextStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a value, attributing the change to `who`.
    ///
    /// Appends the history record before publishing the new value, under a
    /// single lock, so concurrent writers to the same key serialize and the
    /// log stays consistent with version order.
    pub fn set(&self, key: impl Into<String>, value: Value, who: impl Into<String>) {
        let key = key.into();
        let who = who.into();

        let mut log = self.log.lock().expect("context log lock poisoned");
        let previous = self.entries.get(&key).map(|e| e.value().clone());
        let version = previous.as_ref().map_or(1, |e| e.version + 1);

        let seq = log.len() as u64;
        log.push(HistoryRecord {
            seq,
            key: key.clone(),
            old_value: previous.map(|e| e.value),
            new_value: value.clone(),
            version,
            who: who.clone(),
            timestamp: Utc::now(),
        });

        self.entries.insert(
            key.clone(),
            ContextEntry {
                key,
                value,
                who,
                version,
            },
        );
    }

    /// Get the current value for a key.
    ///
    /// Fails with [`EngineError::KeyNotFound`] when the key is absent.
    pub fn get(&self, key: &str) -> Result<Value> {
        self.try_get(key)
            .ok_or_else(|| EngineError::KeyNotFound { key: key.into() })
    }

    /// Get the current value, or `default` when the key is absent.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.try_get(key).unwrap_or(default)
    }

    /// Get the current value, or `None` when the key is absent.
    pub fn try_get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|e| e.value.clone())
    }

    /// Get the full entry (value plus attribution) for a key.
    pub fn entry(&self, key: &str) -> Option<ContextEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current values for every key equal to `prefix` or nested under it.
    ///
    /// Prefixes follow dot segmentation: `a.b` matches `a.b` and `a.b.c`,
    /// never `a.bc`.
    pub fn entries_with_prefix(&self, prefix: &str) -> BTreeMap<String, Value> {
        let nested = format!("{}.", prefix);
        self.entries
            .iter()
            .filter(|e| e.key() == prefix || e.key().starts_with(&nested))
            .map(|e| (e.key().clone(), e.value.clone()))
            .collect()
    }

    /// A copy of the full change log, in write order.
    pub fn history(&self) -> Vec<HistoryRecord> {
        self.log.lock().expect("context log lock poisoned").clone()
    }

    /// Number of writes recorded so far.
    pub fn history_len(&self) -> usize {
        self.log.lock().expect("context log lock poisoned").len()
    }

    /// Current value of every key, sorted by key.
    ///
    /// Keys are read one at a time; a concurrent writer may land between
    /// reads, so the snapshot is not a cross-key consistent cut.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value.clone()))
            .collect()
    }

    /// Write every pair from `values`, attributing all of them to `who`.
    pub fn seed<I>(&self, values: I, who: &str)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        for (key, value) in values {
            self.set(key, value, who);
        }
    }
}
