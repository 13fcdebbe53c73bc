//! Undo/redo history for review operations
//!
//! Each entry stores the document text and its diff areas before and after
//! one operation, so undo can restore both together.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::tracker::DiffArea;

/// Document text plus the areas tracked over it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HistorySnapshot {
    pub text: String,
    pub areas: Vec<DiffArea>,
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    label: &'static str,
    before: HistorySnapshot,
    after: HistorySnapshot,
}

#[derive(Debug, Default)]
struct Stacks {
    undo: Vec<HistoryEntry>,
    redo: Vec<HistoryEntry>,
}

/// Bounded per-document undo/redo stacks
#[derive(Debug)]
pub struct History {
    limit: usize,
    documents: BTreeMap<String, Stacks>,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            documents: BTreeMap::new(),
        }
    }

    /// Record a finished operation; clears anything that could be redone
    pub fn record(&mut self, uri: &str, label: &'static str, before: HistorySnapshot, after: HistorySnapshot) {
        if self.limit == 0 {
            return;
        }
        if before == after {
            log::debug!("skipping no-op {} in history of {}", label, uri);
            return;
        }

        let stacks = self.documents.entry(uri.to_string()).or_default();
        stacks.redo.clear();
        stacks.undo.push(HistoryEntry { label, before, after });
        if stacks.undo.len() > self.limit {
            let excess = stacks.undo.len() - self.limit;
            stacks.undo.drain(..excess);
        }
    }

    /// Pop the latest operation and return the state to restore
    pub fn undo(&mut self, uri: &str) -> Option<HistorySnapshot> {
        let stacks = self.documents.get_mut(uri)?;
        let entry = stacks.undo.pop()?;
        log::debug!("undoing {} in {}", entry.label, uri);
        let snapshot = entry.before.clone();
        stacks.redo.push(entry);
        Some(snapshot)
    }

    pub fn redo(&mut self, uri: &str) -> Option<HistorySnapshot> {
        let stacks = self.documents.get_mut(uri)?;
        let entry = stacks.redo.pop()?;
        log::debug!("redoing {} in {}", entry.label, uri);
        let snapshot = entry.after.clone();
        stacks.undo.push(entry);
        Some(snapshot)
    }

    pub fn can_undo(&self, uri: &str) -> bool {
        self.documents.get(uri).is_some_and(|s| !s.undo.is_empty())
    }

    pub fn can_redo(&self, uri: &str) -> bool {
        self.documents.get(uri).is_some_and(|s| !s.redo.is_empty())
    }

    /// Labels of undoable operations, oldest first
    pub fn labels(&self, uri: &str) -> Vec<&'static str> {
        self.documents
            .get(uri)
            .map(|s| s.undo.iter().map(|e| e.label).collect())
            .unwrap_or_default()
    }

    pub fn clear(&mut self, uri: &str) {
        self.documents.remove(uri);
    }
}
