//! Durable key-value capability the rest of the engine is built on.
//!
//! `DataStore` is the only thing `Log` and the `Applier` know about
//! persistence; everything above this trait is agnostic to which
//! concrete store backs it.

mod sled_store;

pub use sled_store::SledDataStore;

use crate::error::Result;
use crate::log::LogEntry;
use std::collections::HashMap;
use std::sync::Mutex;

/// A durable key-value mapping with a range scan tuned for reading a
/// contiguous run of JSON-encoded log entries.
pub trait DataStore: Send + Sync {
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Returns `None` when the key has no value ("empty" in the design's
    /// vocabulary), not an error.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Decodes entries at decimal keys `first..=last`, stopping at the
    /// first missing key and returning the prefix read so far.
    fn scan(&self, first: u64, last: u64) -> Result<Vec<LogEntry>> {
        let mut entries = Vec::new();
        for index in first..=last {
            let Some(raw) = self.get(&index.to_string())? else {
                break;
            };
            if raw.is_empty() {
                break;
            }
            entries.push(serde_json::from_str(&raw)?);
        }
        Ok(entries)
    }
}

/// In-memory test double. Matches the shape of the production store
/// closely enough that handler tests exercise the same code paths.
#[derive(Default)]
pub struct InMemoryDataStore {
    map: Mutex<HashMap<String, String>>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataStore for InMemoryDataStore {
    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.map
            .lock()
            .expect("data store lock poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .map
            .lock()
            .expect("data store lock poisoned")
            .get(key)
            .cloned()
            .filter(|v| !v.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_on_missing_key_is_empty() {
        let store = InMemoryDataStore::new();
        assert_eq!(store.get("nope").unwrap(), None);
    }

    #[test]
    fn put_then_get_round_trips() {
        let store = InMemoryDataStore::new();
        store.put("CurrentTerm", "3").unwrap();
        assert_eq!(store.get("CurrentTerm").unwrap(), Some("3".to_string()));
    }

    #[test]
    fn scan_stops_at_first_gap() {
        let store = InMemoryDataStore::new();
        store
            .put("1", &serde_json::to_string(&LogEntry::new(1, "a".into(), "A".into())).unwrap())
            .unwrap();
        store
            .put("2", &serde_json::to_string(&LogEntry::new(1, "b".into(), "B".into())).unwrap())
            .unwrap();
        // index 3 intentionally absent

        let entries = store.scan(1, 5).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "a");
        assert_eq!(entries[1].key, "b");
    }

    #[test]
    fn scan_treats_explicit_empty_value_as_absent() {
        let store = InMemoryDataStore::new();
        store
            .put("1", &serde_json::to_string(&LogEntry::new(1, "a".into(), "A".into())).unwrap())
            .unwrap();
        store.put("2", "").unwrap();
        store
            .put("3", &serde_json::to_string(&LogEntry::new(1, "c".into(), "C".into())).unwrap())
            .unwrap();

        let entries = store.scan(1, 5).unwrap();
        assert_eq!(entries.len(), 1);
    }
}
