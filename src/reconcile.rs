//! Diff-area reconciliation
//!
//! Re-diffs every tracked area against the live document, hands the result
//! to the host as render state, and resolves individual blocks on accept or
//! reject.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::buffer::{slice_lines, DocumentHost, LineEdit};
use crate::config::Config;
use crate::diff::{line_count, splice_lines, DiffBlock, LineDiffer, LineRange};
use crate::history::{History, HistorySnapshot};
use crate::lock::EditLock;
use crate::render::{self, DocumentRender};
use crate::tracker::{AreaId, CoordinateSpace, DiffArea, DiffRegionTracker};

pub type DiffId = u64;

/// A diff block bound to the area it was computed for.
///
/// Ids are never reused, so an id held by stale UI resolves to nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedDiff {
    pub diff_id: DiffId,
    pub area_id: AreaId,
    pub block: DiffBlock,
}

impl TrackedDiff {
    /// Lines of the live document this diff covers
    pub fn document_range(&self, area: &DiffArea) -> LineRange {
        self.block.current_range.offset(area.current.start_line)
    }
}

/// Outcome of an accept/reject/stream request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Applied,
    /// The id no longer refers to anything; nothing was changed
    Stale,
}

type Listener = Box<dyn FnMut(&DocumentRender)>;

pub struct DiffAreaReconciler {
    pub(crate) tracker: DiffRegionTracker,
    pub(crate) differ: LineDiffer,
    pub(crate) lock: EditLock,
    pub(crate) history: History,
    /// State captured when a rewrite began, recorded once it ends
    pub(crate) pending_history: BTreeMap<AreaId, HistorySnapshot>,
    diffs: BTreeMap<String, Vec<TrackedDiff>>,
    next_diff_id: DiffId,
    listeners: Vec<Listener>,
}

impl std::fmt::Debug for DiffAreaReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffAreaReconciler")
            .field("tracker", &self.tracker)
            .field("diffs", &self.diffs)
            .field("next_diff_id", &self.next_diff_id)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for DiffAreaReconciler {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl DiffAreaReconciler {
    pub fn new(differ: LineDiffer, history_limit: usize) -> Self {
        Self {
            tracker: DiffRegionTracker::new(),
            differ,
            lock: EditLock::new(),
            history: History::new(history_limit),
            pending_history: BTreeMap::new(),
            diffs: BTreeMap::new(),
            next_diff_id: 0,
            listeners: Vec::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.differ(), config.history_limit)
    }

    /// Handle for hosts to tell programmatic edits from user edits
    pub fn edit_lock(&self) -> EditLock {
        self.lock.clone()
    }

    pub fn tracker(&self) -> &DiffRegionTracker {
        &self.tracker
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Called with the new render state after every refresh
    pub fn subscribe(&mut self, listener: impl FnMut(&DocumentRender) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn areas(&self, uri: &str) -> &[DiffArea] {
        self.tracker.areas(uri)
    }

    pub fn diffs(&self, uri: &str) -> &[TrackedDiff] {
        self.diffs.get(uri).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Documents with tracked areas or displayed diffs
    pub fn documents(&self) -> Vec<String> {
        let mut uris: Vec<String> = self
            .tracker
            .documents()
            .map(str::to_string)
            .chain(self.diffs.keys().cloned())
            .collect();
        uris.sort();
        uris.dedup();
        uris
    }

    pub fn find_diff(&self, diff_id: DiffId) -> Option<(&str, &TrackedDiff)> {
        self.diffs.iter().find_map(|(uri, diffs)| {
            diffs
                .iter()
                .find(|d| d.diff_id == diff_id)
                .map(|d| (uri.as_str(), d))
        })
    }

    /// Start reviewing `lines` of `uri` against `snapshot`, or against the
    /// lines' current text when no snapshot is given.
    pub fn create_area(
        &mut self,
        host: &impl DocumentHost,
        uri: &str,
        lines: LineRange,
        snapshot: Option<&str>,
    ) -> Result<DiffArea> {
        let text = read_document(host, uri)?;
        check_bounds(uri, &text, lines)?;

        let before = self.snapshot_of(uri, &text);
        let mut snapshot = match snapshot {
            Some(snapshot) => snapshot.to_string(),
            None => slice_lines(&text, lines.as_range()),
        };
        terminate_snapshot(&mut snapshot, &text, &lines);
        let area = self.tracker.create_area(uri, lines, &snapshot)?;
        let after = self.snapshot_of(uri, &text);
        self.history.record(uri, "create area", before, after);

        self.refresh(host, uri);
        Ok(area)
    }

    /// Feed a user edit of `uri` into area tracking.
    ///
    /// Edits made while the edit lock names `uri` are the engine's own and are
    /// ignored.
    pub fn handle_change(&mut self, host: &impl DocumentHost, uri: &str, edit: &LineEdit) {
        if self.lock.is_writing(uri) {
            log::debug!("ignoring programmatic edit of {} at {:?}", uri, edit.lines);
            return;
        }
        if self.tracker.areas(uri).is_empty() && self.diffs(uri).is_empty() {
            return;
        }

        let collapsed = self
            .tracker
            .adjust_for_change(uri, CoordinateSpace::Current, edit);
        for id in collapsed {
            self.pending_history.remove(&id);
        }
        self.refresh(host, uri);
    }

    /// Recompute the diffs of every area of `uri` and notify listeners.
    ///
    /// A document the host no longer has is forgotten.
    pub fn refresh(&mut self, host: &impl DocumentHost, uri: &str) -> &[TrackedDiff] {
        let Some(text) = host.read(uri) else {
            log::debug!("{} is no longer open; dropping its review state", uri);
            self.close_document(uri);
            return &[];
        };

        for area in self.tracker.areas_mut(uri) {
            if terminate_snapshot(&mut area.original_snapshot, &text, &area.current) {
                log::debug!("lines now follow diff area {} in {}; terminated its snapshot", area.id, uri);
            }
        }

        let mut tracked = Vec::new();
        for area in self.tracker.areas(uri) {
            let current = slice_lines(&text, area.current.as_range());
            for block in self.differ.diff(&area.original_snapshot, &current) {
                tracked.push(TrackedDiff {
                    diff_id: self.next_diff_id,
                    area_id: area.id,
                    block,
                });
                self.next_diff_id += 1;
            }
        }
        log::debug!(
            "refreshed {}: {} areas, {} diffs",
            uri,
            self.tracker.areas(uri).len(),
            tracked.len()
        );

        let state = render::build(uri, self.tracker.areas(uri), &tracked);
        self.diffs.insert(uri.to_string(), tracked);
        for listener in &mut self.listeners {
            listener(&state);
        }
        self.diffs(uri)
    }

    /// Promote the current text of a diff into its area's snapshot
    pub fn accept(&mut self, host: &impl DocumentHost, diff_id: DiffId) -> Result<Resolution> {
        let Some((uri, diff, area)) = self.lookup(diff_id) else {
            return Ok(Resolution::Stale);
        };
        let Some(text) = host.read(&uri) else {
            log::warn!("cannot accept diff {}: {} is no longer open", diff_id, uri);
            self.close_document(&uri);
            return Ok(Resolution::Stale);
        };
        let before = self.snapshot_of(&uri, &text);

        let block = &diff.block;
        if let Some(tracked) = self.tracker.area_mut(&uri, area.id) {
            tracked.original_snapshot = splice_lines(
                &tracked.original_snapshot,
                block.original_range.as_range(),
                &block.current_text,
            );
            terminate_snapshot(&mut tracked.original_snapshot, &text, &tracked.current);
        }
        let original_edit = LineEdit {
            lines: block.original_range.offset(area.original.start_line).as_range(),
            inserted_text: block.current_text.clone(),
        };
        self.tracker
            .adjust_area_for_change(&uri, area.id, CoordinateSpace::Original, &original_edit);
        self.forget_diff(&uri, diff_id);
        self.resolve_if_clean(&uri, area.id, &text);

        let after = self.snapshot_of(&uri, &text);
        self.history.record(&uri, "accept", before, after);
        log::debug!("accepted diff {} of area {} in {}", diff_id, area.id, uri);
        self.refresh(host, &uri);
        Ok(Resolution::Applied)
    }

    /// Revert the live text of a diff back to its area's snapshot
    pub fn reject(&mut self, host: &mut impl DocumentHost, diff_id: DiffId) -> Result<Resolution> {
        let Some((uri, diff, area)) = self.lookup(diff_id) else {
            return Ok(Resolution::Stale);
        };
        let Some(text) = host.read(&uri) else {
            log::warn!("cannot reject diff {}: {} is no longer open", diff_id, uri);
            self.close_document(&uri);
            return Ok(Resolution::Stale);
        };
        let before = self.snapshot_of(&uri, &text);

        let edit = LineEdit {
            lines: diff.document_range(&area).as_range(),
            inserted_text: diff.block.original_text.clone(),
        };
        self.write(host, &uri, &edit, Some(area.id))?;
        self.forget_diff(&uri, diff_id);

        let text = read_document(host, &uri)?;
        self.resolve_if_clean(&uri, area.id, &text);

        let after = self.snapshot_of(&uri, &text);
        self.history.record(&uri, "reject", before, after);
        log::debug!("rejected diff {} of area {} in {}", diff_id, area.id, uri);
        self.refresh(host, &uri);
        Ok(Resolution::Applied)
    }

    /// Accept every diff of `uri`, one block at a time
    pub fn accept_all(&mut self, host: &impl DocumentHost, uri: &str) -> Result<usize> {
        let mut accepted = 0;
        while let Some(diff_id) = self.diffs(uri).first().map(|d| d.diff_id) {
            if self.accept(host, diff_id)? == Resolution::Stale {
                break;
            }
            accepted += 1;
        }
        Ok(accepted)
    }

    /// Reject every diff of `uri`, last block first so earlier ranges stay valid
    pub fn reject_all(&mut self, host: &mut impl DocumentHost, uri: &str) -> Result<usize> {
        let mut rejected = 0;
        while let Some(diff_id) = self.diffs(uri).last().map(|d| d.diff_id) {
            if self.reject(host, diff_id)? == Resolution::Stale {
                break;
            }
            rejected += 1;
        }
        Ok(rejected)
    }

    /// Restore `uri` to the state before the latest recorded operation
    pub fn undo(&mut self, host: &mut impl DocumentHost, uri: &str) -> Result<bool> {
        let Some(snapshot) = self.history.undo(uri) else {
            log::debug!("nothing to undo in {}", uri);
            return Ok(false);
        };
        self.restore(host, uri, snapshot)?;
        Ok(true)
    }

    pub fn redo(&mut self, host: &mut impl DocumentHost, uri: &str) -> Result<bool> {
        let Some(snapshot) = self.history.redo(uri) else {
            log::debug!("nothing to redo in {}", uri);
            return Ok(false);
        };
        self.restore(host, uri, snapshot)?;
        Ok(true)
    }

    /// Drop all review state for `uri`
    pub fn close_document(&mut self, uri: &str) {
        for area in self.tracker.areas(uri) {
            self.pending_history.remove(&area.id);
        }
        let areas = self.tracker.close_document(uri);
        self.diffs.remove(uri);
        self.history.clear(uri);
        if areas > 0 {
            log::debug!("closed {} with {} diff areas", uri, areas);
        }
    }

    /// Apply `edit` to the host under the edit lock, then re-anchor areas
    pub(crate) fn write(
        &mut self,
        host: &mut impl DocumentHost,
        uri: &str,
        edit: &LineEdit,
        owner: Option<AreaId>,
    ) -> Result<Vec<AreaId>> {
        {
            let _guard = self.lock.acquire(uri);
            host.apply_edit(uri, edit)?;
        }
        let collapsed =
            self.tracker
                .adjust_for_owned_change(uri, CoordinateSpace::Current, edit, owner);
        for id in &collapsed {
            self.pending_history.remove(id);
        }
        Ok(collapsed)
    }

    pub(crate) fn snapshot_of(&self, uri: &str, text: &str) -> HistorySnapshot {
        HistorySnapshot {
            text: text.to_string(),
            areas: self.tracker.areas(uri).to_vec(),
        }
    }

    /// Drop area `id` once its snapshot matches the live text
    pub(crate) fn resolve_if_clean(&mut self, uri: &str, id: AreaId, text: &str) -> bool {
        let clean = self.tracker.area(uri, id).is_some_and(|area| {
            !area.is_streaming() && area.original_snapshot == slice_lines(text, area.current.as_range())
        });
        if clean {
            self.tracker.remove_area(uri, id);
            if let Some(diffs) = self.diffs.get_mut(uri) {
                diffs.retain(|d| d.area_id != id);
            }
            log::debug!("diff area {} in {} fully resolved", id, uri);
        }
        clean
    }

    fn restore(&mut self, host: &mut impl DocumentHost, uri: &str, snapshot: HistorySnapshot) -> Result<()> {
        let text = read_document(host, uri)?;
        let edit = LineEdit {
            lines: 0..line_count(&text),
            inserted_text: snapshot.text,
        };
        {
            let _guard = self.lock.acquire(uri);
            host.apply_edit(uri, &edit)
                .with_context(|| format!("Failed to restore {}", uri))?;
        }
        self.tracker.replace_areas(uri, snapshot.areas);
        self.refresh(host, uri);
        Ok(())
    }

    fn lookup(&self, diff_id: DiffId) -> Option<(String, TrackedDiff, DiffArea)> {
        let Some((uri, diff)) = self.find_diff(diff_id) else {
            log::warn!("diff {} not found; it was already resolved or replaced", diff_id);
            return None;
        };
        let Some(area) = self.tracker.area(uri, diff.area_id) else {
            log::warn!("diff area {} for diff {} no longer exists", diff.area_id, diff_id);
            return None;
        };
        Some((uri.to_string(), diff.clone(), area.clone()))
    }

    fn forget_diff(&mut self, uri: &str, diff_id: DiffId) {
        if let Some(diffs) = self.diffs.get_mut(uri) {
            diffs.retain(|d| d.diff_id != diff_id);
        }
    }
}

pub(crate) fn read_document(host: &impl DocumentHost, uri: &str) -> Result<String> {
    host.read(uri)
        .with_context(|| format!("Document not open: {}", uri))
}

/// An area may reach one line past the last, where text appended to the
/// document lands, but no further
pub(crate) fn check_bounds(uri: &str, text: &str, lines: LineRange) -> Result<()> {
    let count = line_count(text);
    if lines.as_range().end > count + 1 {
        anyhow::bail!(
            "lines {}..{} run past the end of {} ({} lines)",
            lines.start_line,
            lines.as_range().end,
            uri,
            count
        );
    }
    Ok(())
}

/// End `snapshot` with a newline when document lines follow `lines`.
///
/// Text written back into the middle of a document always gets one, so an
/// unterminated snapshot there could never match the live lines.
fn terminate_snapshot(snapshot: &mut String, text: &str, lines: &LineRange) -> bool {
    let followed = lines.as_range().end < line_count(text);
    if followed && !snapshot.is_empty() && !snapshot.ends_with('\n') {
        snapshot.push('\n');
        return true;
    }
    false
}
