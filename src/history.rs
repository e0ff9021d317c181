//! In-memory session history, explicitly owned by the application state.
//!
//! Lifecycle: created at startup, cleared on explicit user action, discarded
//! at process exit. Nothing is persisted.

use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// One recorded interaction.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

/// Shared, in-memory history of the running session.
#[derive(Debug, Clone, Default)]
pub struct SessionHistory {
    inner: Arc<RwLock<Vec<HistoryEntry>>>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, returning its id.
    pub fn record(&self, label: impl Into<String>, content_hash: Option<String>) -> Uuid {
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            label: label.into(),
            content_hash,
        };
        let id = entry.id;
        self.inner.write().unwrap().push(entry);
        id
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.inner.read().unwrap().clone()
    }

    /// Remove everything; returns how many entries were dropped.
    pub fn clear(&self) -> usize {
        let mut entries = self.inner.write().unwrap();
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
