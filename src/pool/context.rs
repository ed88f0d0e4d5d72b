//! Per-session key/value context, scoped to a session's lifetime.
//!
//! Entries are timestamped at write time. When the health sweep replaces a
//! session, its context is copied (not moved) to the replacement, so an
//! in-flight step holding the old session keeps reading consistent data.

use crate::models::session::SessionId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One stored context value and when it was written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub value: Value,
    pub stored_at: DateTime<Utc>,
}

/// Concurrent map of session-scoped context.
///
/// Single-owner access per session is guaranteed by the pool hand-off (at
/// most one step holds a session), so no per-entry locking is needed beyond
/// the map's own sharding.
#[derive(Debug, Default)]
pub struct ContextStore {
    entries: DashMap<SessionId, HashMap<String, ContextEntry>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under `key` for the session
    pub fn store(&self, session_id: SessionId, key: impl Into<String>, value: Value) {
        let entry = ContextEntry {
            value,
            stored_at: Utc::now(),
        };
        self.entries
            .entry(session_id)
            .or_default()
            .insert(key.into(), entry);
    }

    /// Read a value for the session
    pub fn get(&self, session_id: SessionId, key: &str) -> Option<Value> {
        self.entries
            .get(&session_id)
            .and_then(|map| map.get(key).map(|e| e.value.clone()))
    }

    /// Read every entry for the session
    pub fn get_all(&self, session_id: SessionId) -> HashMap<String, ContextEntry> {
        self.entries
            .get(&session_id)
            .map(|map| map.clone())
            .unwrap_or_default()
    }

    /// Remove a single key, or all context for the session when `key` is None
    pub fn clear(&self, session_id: SessionId, key: Option<&str>) {
        match key {
            Some(key) => {
                if let Some(mut map) = self.entries.get_mut(&session_id) {
                    map.remove(key);
                }
            }
            None => {
                self.entries.remove(&session_id);
            }
        }
    }

    /// Copy all context from one session to another, preserving timestamps
    pub fn copy(&self, from: SessionId, to: SessionId) {
        let copied = self
            .entries
            .get(&from)
            .map(|map| map.clone())
            .unwrap_or_default();
        if !copied.is_empty() {
            self.entries.insert(to, copied);
        }
    }

    /// Drop all context for a closed session
    pub fn remove(&self, session_id: SessionId) {
        self.entries.remove(&session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn store_and_get_round_trip() {
        let store = ContextStore::new();
        let session = SessionId::new();

        store.store(session, "last_search_filters", json!({"remote": true}));
        assert_eq!(
            store.get(session, "last_search_filters"),
            Some(json!({"remote": true}))
        );
        assert_eq!(store.get(session, "missing"), None);
    }

    #[test]
    fn copy_preserves_entries_for_both_sessions() {
        let store = ContextStore::new();
        let old = SessionId::new();
        let new = SessionId::new();

        store.store(old, "page", json!(3));
        store.copy(old, new);

        assert_eq!(store.get(new, "page"), Some(json!(3)));
        // Copied, not moved: the old session still reads its context
        assert_eq!(store.get(old, "page"), Some(json!(3)));
    }

    #[test]
    fn clear_scopes_to_key_or_session() {
        let store = ContextStore::new();
        let session = SessionId::new();

        store.store(session, "a", json!(1));
        store.store(session, "b", json!(2));

        store.clear(session, Some("a"));
        assert_eq!(store.get(session, "a"), None);
        assert_eq!(store.get(session, "b"), Some(json!(2)));

        store.clear(session, None);
        assert_eq!(store.get(session, "b"), None);
    }
}
