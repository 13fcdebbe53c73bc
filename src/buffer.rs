//! Line-oriented document model
//!
//! `LineEdit` is the unit of change the engine exchanges with its host:
//! a run of whole lines replaced by new text.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;

use crate::diff::{line_count, normalize, split_lines, splice_lines};
use crate::lock::EditLock;

/// Replace the lines in `lines` with `inserted_text`.
///
/// Inserted text counts as whole lines; a missing final newline is supplied
/// when more lines follow the edit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LineEdit {
    pub lines: Range<usize>,
    pub inserted_text: String,
}

impl LineEdit {
    /// Replace lines `start_line..=end_line`
    pub fn replace_lines(start_line: usize, end_line: usize, inserted_text: impl Into<String>) -> Self {
        Self {
            lines: start_line..(end_line + 1).max(start_line),
            inserted_text: inserted_text.into(),
        }
    }

    /// Insert before `line` without removing anything
    pub fn insert_lines(line: usize, inserted_text: impl Into<String>) -> Self {
        Self {
            lines: line..line,
            inserted_text: inserted_text.into(),
        }
    }

    pub fn removed_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn inserted_lines(&self) -> usize {
        line_count(&self.inserted_text)
    }

    /// Net change in line count
    pub fn delta(&self) -> isize {
        self.inserted_lines() as isize - self.removed_lines() as isize
    }

    pub fn is_pure_insertion(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Text of one open document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    text: String,
}

impl Buffer {
    pub fn new(text: &str) -> Self {
        Self {
            text: normalize(text),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn line_count(&self) -> usize {
        line_count(&self.text)
    }

    /// Lines in `range`, clamped to the buffer
    pub fn slice(&self, range: Range<usize>) -> String {
        slice_lines(&self.text, range)
    }

    pub fn apply(&mut self, edit: &LineEdit) -> Result<()> {
        let count = self.line_count();
        if edit.lines.start > edit.lines.end || edit.lines.end > count {
            anyhow::bail!(
                "edit {}..{} out of bounds for {} lines",
                edit.lines.start,
                edit.lines.end,
                count
            );
        }
        self.text = splice_lines(&self.text, edit.lines.clone(), &normalize(&edit.inserted_text));
        Ok(())
    }
}

/// Lines of `text` in `range`, clamped
pub fn slice_lines(text: &str, range: Range<usize>) -> String {
    let lines = split_lines(text);
    let end = range.end.min(lines.len());
    let start = range.start.min(end);
    lines[start..end].concat()
}

/// The editor side of the engine: live text and the ability to edit it
pub trait DocumentHost {
    /// Full text of the document, or `None` when it is not open
    fn read(&self, uri: &str) -> Option<String>;

    /// Apply an edit to the live document
    fn apply_edit(&mut self, uri: &str, edit: &LineEdit) -> Result<()>;
}

/// In-memory host.
///
/// Edits made while the shared edit lock names the document are treated as
/// programmatic; all others are queued as change events for the engine.
#[derive(Debug, Default)]
pub struct MemoryHost {
    buffers: BTreeMap<String, Buffer>,
    lock: EditLock,
    pending: Vec<(String, LineEdit)>,
}

impl MemoryHost {
    pub fn new(lock: EditLock) -> Self {
        Self {
            buffers: BTreeMap::new(),
            lock,
            pending: Vec::new(),
        }
    }

    pub fn open(&mut self, uri: &str, text: &str) {
        self.buffers.insert(uri.to_string(), Buffer::new(text));
    }

    pub fn close(&mut self, uri: &str) -> bool {
        self.pending.retain(|(pending_uri, _)| pending_uri != uri);
        self.buffers.remove(uri).is_some()
    }

    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }

    pub fn buffer(&self, uri: &str) -> Option<&Buffer> {
        self.buffers.get(uri)
    }

    /// Change events from user edits, oldest first
    pub fn take_changes(&mut self) -> Vec<(String, LineEdit)> {
        std::mem::take(&mut self.pending)
    }
}

impl DocumentHost for MemoryHost {
    fn read(&self, uri: &str) -> Option<String> {
        self.buffers.get(uri).map(|b| b.text().to_string())
    }

    fn apply_edit(&mut self, uri: &str, edit: &LineEdit) -> Result<()> {
        let buffer = self
            .buffers
            .get_mut(uri)
            .with_context(|| format!("Document not open: {}", uri))?;
        buffer
            .apply(edit)
            .with_context(|| format!("Failed to edit {}", uri))?;

        if !self.lock.is_writing(uri) {
            self.pending.push((uri.to_string(), edit.clone()));
        }
        Ok(())
    }
}
