//! In-memory tracked-market registry.
//!
//! Maps full ids (`"{platform}:{native_id}"`) to tracking metadata.
//! Entries are created on track, never mutated, and destroyed only by
//! untracking or process exit. Market snapshots are not stored here —
//! reads re-fetch through the adapters.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct WatchEntry {
    pub alias: Option<String>,
    pub tracked_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct Watchlist {
    entries: RwLock<HashMap<String, WatchEntry>>,
}

impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a market. Re-tracking an id replaces its entry.
    pub fn insert(&self, full_id: String, alias: Option<String>) -> WatchEntry {
        let entry = WatchEntry {
            alias,
            tracked_at: Utc::now(),
        };
        self.entries
            .write()
            .expect("watchlist lock poisoned")
            .insert(full_id, entry.clone());
        entry
    }

    /// Remove a tracked market. Returns whether it was present.
    pub fn remove(&self, full_id: &str) -> bool {
        self.entries
            .write()
            .expect("watchlist lock poisoned")
            .remove(full_id)
            .is_some()
    }

    pub fn contains(&self, full_id: &str) -> bool {
        self.entries
            .read()
            .expect("watchlist lock poisoned")
            .contains_key(full_id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("watchlist lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current entries, so callers can re-fetch without
    /// holding the lock across network calls.
    pub fn snapshot(&self) -> Vec<(String, WatchEntry)> {
        self.entries
            .read()
            .expect("watchlist lock poisoned")
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_snapshot() {
        let list = Watchlist::new();
        assert!(list.is_empty());

        list.insert("manifold:m1".to_string(), Some("btc bet".to_string()));
        list.insert("kalshi:T1".to_string(), None);

        assert_eq!(list.len(), 2);
        assert!(list.contains("manifold:m1"));

        let snapshot = list.snapshot();
        assert_eq!(snapshot.len(), 2);
        let (_, entry) = snapshot
            .iter()
            .find(|(id, _)| id == "manifold:m1")
            .unwrap();
        assert_eq!(entry.alias.as_deref(), Some("btc bet"));
    }

    #[test]
    fn test_remove() {
        let list = Watchlist::new();
        list.insert("predictit:7053".to_string(), None);
        assert!(list.remove("predictit:7053"));
        assert!(!list.remove("predictit:7053"));
        assert!(list.is_empty());
    }

    #[test]
    fn test_retrack_replaces_entry() {
        let list = Watchlist::new();
        list.insert("kalshi:T1".to_string(), None);
        list.insert("kalshi:T1".to_string(), Some("renamed".to_string()));

        assert_eq!(list.len(), 1);
        let snapshot = list.snapshot();
        assert_eq!(snapshot[0].1.alias.as_deref(), Some("renamed"));
    }
}
