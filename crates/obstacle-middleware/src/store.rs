//! Keyed, last-write-wins store shared between producers and listeners.
//!
//! Values are handed out as [`Arc`]s so a listener can hold on to a result
//! after the producer has overwritten or evicted it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use obstacle_types::Timestamp;
use tracing::debug;

use crate::key::{KeyError, shared_data_key};

#[derive(Debug)]
struct Entry<T> {
    timestamp: Timestamp,
    value: Arc<T>,
}

/// Thread-safe map from shared-data key to value.
#[derive(Debug)]
pub struct SharedDataStore<T> {
    entries: RwLock<HashMap<String, Entry<T>>>,
}

impl<T> Default for SharedDataStore<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> SharedDataStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` under `key`, replacing any previous value.
    ///
    /// Returns the value that was replaced.
    pub fn add(&self, key: String, timestamp: Timestamp, value: T) -> Option<Arc<T>> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let previous = entries.insert(
            key,
            Entry {
                timestamp,
                value: Arc::new(value),
            },
        );
        previous.map(|e| e.value)
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).map(|e| Arc::clone(&e.value))
    }

    /// Look a value up by the pair it was published under.
    pub fn get_by_stamp(&self, timestamp: Timestamp, device_id: &str) -> Result<Option<Arc<T>>, KeyError> {
        let key = shared_data_key(timestamp, device_id)?;
        Ok(self.get(&key))
    }

    pub fn remove(&self, key: &str) -> Option<Arc<T>> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key).map(|e| e.value)
    }

    /// Drop every entry stamped before `cutoff`.  Returns how many went.
    pub fn evict_older_than(&self, cutoff: Timestamp) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, e| e.timestamp >= cutoff);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, cutoff, "evicted stale shared data");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins() {
        let store = SharedDataStore::new();
        assert!(store.add("k".into(), 1.0, "first").is_none());
        let replaced = store.add("k".into(), 1.0, "second");
        assert_eq!(replaced.as_deref(), Some(&"first"));
        assert_eq!(store.get("k").as_deref(), Some(&"second"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn lookup_by_stamp_uses_derived_key() {
        let store = SharedDataStore::new();
        let key = shared_data_key(12.34, "front").unwrap();
        store.add(key, 12.34, 7_u32);
        assert_eq!(store.get_by_stamp(12.34, "front").unwrap().as_deref(), Some(&7));
        assert!(store.get_by_stamp(12.35, "front").unwrap().is_none());
        assert!(store.get_by_stamp(12.34, "").is_err());
    }

    #[test]
    fn eviction_keeps_recent_entries() {
        let store = SharedDataStore::new();
        store.add("a".into(), 1.0, ());
        store.add("b".into(), 2.0, ());
        store.add("c".into(), 3.0, ());
        assert_eq!(store.evict_older_than(2.0), 1);
        assert!(store.get("a").is_none());
        assert!(store.get("b").is_some());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn removed_value_outlives_store_entry() {
        let store = SharedDataStore::new();
        store.add("k".into(), 1.0, String::from("payload"));
        let held = store.get("k").unwrap();
        assert!(store.remove("k").is_some());
        assert!(store.is_empty());
        assert_eq!(held.as_str(), "payload");
    }
}
