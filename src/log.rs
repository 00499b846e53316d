//! The replicated command log: an in-memory vector mirrored onto a
//! `DataStore`, indexed from 1 with a term-0 sentinel at index 0.

use crate::error::{RaftError, Result};
use crate::store::DataStore;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// A single key/value write proposed by a client and replicated through
/// the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub key: String,
    pub value: String,
}

/// `LogEntry`'s JSON form uses capitalized field names to match the
/// persisted layout the original engine wrote (`Key`/`Value`/`Term`),
/// which other tooling in the cluster may already depend on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "Term")]
    pub term: u64,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

impl LogEntry {
    pub fn new(term: u64, key: String, value: String) -> Self {
        Self { term, key, value }
    }

    fn sentinel() -> Self {
        Self::new(0, String::new(), String::new())
    }

    /// The replicated write this entry carries, per the data model's
    /// `command: {key, value}` framing.
    pub fn command(&self) -> Command {
        Command { key: self.key.clone(), value: self.value.clone() }
    }
}

/// Ordered sequence of `LogEntry`, index 1-based with a term-0 sentinel
/// occupying index 0 so `log.at(log.length()).term` is always defined.
pub struct Log {
    store: Arc<dyn DataStore>,
    entries: Mutex<Vec<LogEntry>>,
}

impl Log {
    /// Rebuilds the in-memory view from the backing store at startup,
    /// scanning forward from index 1 until the first missing entry.
    pub fn load(store: Arc<dyn DataStore>) -> Result<Self> {
        let mut entries = vec![LogEntry::sentinel()];
        entries.extend(store.scan(1, u64::MAX)?);
        Ok(Self { store, entries: Mutex::new(entries) })
    }

    pub fn length(&self) -> u64 {
        (self.entries.lock().expect("log lock poisoned").len() - 1) as u64
    }

    /// Returns the entry at `index`. Panics on out-of-range indices;
    /// callers are expected to bounds-check against `length()` first.
    pub fn at(&self, index: u64) -> LogEntry {
        self.entries
            .lock()
            .expect("log lock poisoned")
            .get(index as usize)
            .cloned()
            .unwrap_or_else(|| panic!("log index {index} out of range"))
    }

    /// Persists `entry` at decimal key `index`, then makes it visible
    /// in the in-memory vector. Persist-before-memory ordering is
    /// mandatory so no reader observes an entry that isn't durable.
    pub fn set(&self, index: u64, entry: LogEntry) -> Result<()> {
        let mut entries = self.entries.lock().expect("log lock poisoned");
        if index == 0 {
            return Err(RaftError::InvalidOperation("cannot overwrite the sentinel at index 0".into()));
        }
        if index > entries.len() as u64 {
            return Err(RaftError::InvalidOperation(format!(
                "log.set would leave a gap: index {index} is beyond length {}",
                entries.len() - 1
            )));
        }

        self.store.put(&index.to_string(), &serde_json::to_string(&entry)?)?;

        if index as usize == entries.len() {
            entries.push(entry);
        } else {
            entries[index as usize] = entry;
        }
        Ok(())
    }

    /// Removes every entry at index ≥ `from`, in memory and in the
    /// backing store, by writing an empty value forward from `from`
    /// until the first already-empty key: a real deletion, not a
    /// rewrite-in-place.
    pub fn truncate_from(&self, from: u64) -> Result<()> {
        let mut entries = self.entries.lock().expect("log lock poisoned");
        if from == 0 {
            return Err(RaftError::InvalidOperation("cannot truncate the sentinel at index 0".into()));
        }
        if (from as usize) < entries.len() {
            entries.truncate(from as usize);
        }

        let mut index = from;
        loop {
            match self.store.get(&index.to_string())? {
                None => break,
                Some(_) => {
                    self.store.put(&index.to_string(), "")?;
                    index += 1;
                }
            }
        }
        Ok(())
    }
}
