//! Streamed rewrite of a diff area
//!
//! While new text for an area arrives piece by piece, the area shows the new
//! lines written so far followed by the untouched rest of its snapshot, with a
//! sweep line marking where the stream currently is.

use anyhow::Result;

use crate::buffer::{slice_lines, DocumentHost, LineEdit};
use crate::diff::{normalize, split_lines, BlockKind, LineDiffer, LineRange};
use crate::reconcile::{check_bounds, read_document, DiffAreaReconciler, Resolution};
use crate::tracker::{AreaId, DiffArea};

impl DiffAreaReconciler {
    /// Start streaming new text into `lines` of `uri`.
    ///
    /// The area's snapshot is the lines' current text; history for the whole
    /// rewrite is recorded when it finishes or is aborted.
    pub fn begin_rewrite(&mut self, host: &impl DocumentHost, uri: &str, lines: LineRange) -> Result<DiffArea> {
        let text = read_document(host, uri)?;
        check_bounds(uri, &text, lines)?;

        let before = self.snapshot_of(uri, &text);
        let snapshot = slice_lines(&text, lines.as_range());
        let mut area = self.tracker.create_area(uri, lines, &snapshot)?;
        if let Some(tracked) = self.tracker.area_mut(uri, area.id) {
            tracked.sweep_offset = Some(0);
        }
        area.sweep_offset = Some(0);
        self.pending_history.insert(area.id, before);

        log::debug!("began rewrite of area {} in {}", area.id, uri);
        self.refresh(host, uri);
        Ok(area)
    }

    /// Show `text_so_far` in a streaming area
    pub fn stream_rewrite(
        &mut self,
        host: &mut impl DocumentHost,
        area_id: AreaId,
        text_so_far: &str,
    ) -> Result<Resolution> {
        let Some((uri, area)) = self.streaming_area(area_id) else {
            return Ok(Resolution::Stale);
        };

        let (written, sweep) = sweep_text(&self.differ, &area.original_snapshot, text_so_far);
        let edit = LineEdit {
            lines: area.current.as_range(),
            inserted_text: written,
        };
        self.write(host, &uri, &edit, Some(area_id))?;
        if let Some(area) = self.tracker.area_mut(&uri, area_id) {
            area.sweep_offset = Some(sweep);
        }

        self.refresh(host, &uri);
        Ok(Resolution::Applied)
    }

    /// Write the complete new text and end the stream
    pub fn finish_rewrite(
        &mut self,
        host: &mut impl DocumentHost,
        area_id: AreaId,
        final_text: &str,
    ) -> Result<Resolution> {
        let Some((uri, area)) = self.streaming_area(area_id) else {
            return Ok(Resolution::Stale);
        };

        let edit = LineEdit {
            lines: area.current.as_range(),
            inserted_text: normalize(final_text),
        };
        self.write(host, &uri, &edit, Some(area_id))?;
        self.end_rewrite(host, &uri, area_id)?;
        log::debug!("finished rewrite of area {} in {}", area_id, uri);
        Ok(Resolution::Applied)
    }

    /// Stop streaming and leave the text as it is
    pub fn abort_rewrite(&mut self, host: &impl DocumentHost, area_id: AreaId) -> Result<Resolution> {
        let Some((uri, _)) = self.streaming_area(area_id) else {
            return Ok(Resolution::Stale);
        };
        self.end_rewrite(host, &uri, area_id)?;
        log::debug!("aborted rewrite of area {} in {}", area_id, uri);
        Ok(Resolution::Applied)
    }

    fn end_rewrite(&mut self, host: &impl DocumentHost, uri: &str, area_id: AreaId) -> Result<()> {
        if let Some(area) = self.tracker.area_mut(uri, area_id) {
            area.sweep_offset = None;
        }
        let text = read_document(host, uri)?;
        self.resolve_if_clean(uri, area_id, &text);

        if let Some(before) = self.pending_history.remove(&area_id) {
            let after = self.snapshot_of(uri, &text);
            self.history.record(uri, "rewrite", before, after);
        }
        self.refresh(host, uri);
        Ok(())
    }

    fn streaming_area(&self, area_id: AreaId) -> Option<(String, DiffArea)> {
        let Some((uri, area)) = self.tracker.find_area(area_id) else {
            log::warn!("diff area {} not found; rewrite ignored", area_id);
            return None;
        };
        if !area.is_streaming() {
            log::warn!("diff area {} in {} is not being rewritten", area_id, uri);
            return None;
        }
        Some((uri.to_string(), area.clone()))
    }
}

/// Text to show for a partial rewrite, and the sweep line within it.
///
/// New lines are kept up to the last changed line; the snapshot resumes from
/// where that change began in it.
fn sweep_text(differ: &LineDiffer, snapshot: &str, text_so_far: &str) -> (String, usize) {
    let text_so_far = normalize(text_so_far);
    let new_lines = split_lines(&text_so_far);
    let old_lines = split_lines(snapshot);

    let (keep, resume) = match differ.diff(snapshot, &text_so_far).last() {
        None => (new_lines.len(), old_lines.len()),
        Some(block) if block.kind == BlockKind::Deletion => {
            (block.current_range.start_line, block.original_range.start_line)
        }
        Some(block) => (
            block.current_range.as_range().end.saturating_sub(1),
            block.original_range.start_line,
        ),
    };

    let mut written = new_lines[..keep].concat();
    if !written.is_empty() && !written.ends_with('\n') && resume < old_lines.len() {
        written.push('\n');
    }
    written.push_str(&old_lines[resume..].concat());
    (written, keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MemoryHost;
    use crate::render::Decoration;
    use std::cell::RefCell;
    use std::rc::Rc;

    const URI: &str = "file:///src/lib.rs";
    const DOC: &str = "head\nfn a() {\n    old();\n}\ntail\n";

    fn setup() -> (DiffAreaReconciler, MemoryHost, DiffArea) {
        let mut reconciler = DiffAreaReconciler::default();
        let mut host = MemoryHost::new(reconciler.edit_lock());
        host.open(URI, DOC);
        let area = reconciler
            .begin_rewrite(&host, URI, LineRange::new(1, 3))
            .unwrap();
        (reconciler, host, area)
    }

    #[test]
    fn test_sweep_text() {
        let differ = LineDiffer::default();
        let snapshot = "a\nb\nc\n";

        // identical prefix: nothing changes yet
        assert_eq!(sweep_text(&differ, snapshot, "a\n"), ("a\nb\nc\n".to_string(), 1));
        // last line still being written is held back
        assert_eq!(sweep_text(&differ, snapshot, "a\nx\ny\n"), ("a\nx\nb\nc\n".to_string(), 2));
        // everything matched
        assert_eq!(sweep_text(&differ, snapshot, snapshot), (snapshot.to_string(), 3));
        assert_eq!(sweep_text(&differ, snapshot, ""), (snapshot.to_string(), 0));
    }

    #[test]
    fn test_begin_rewrite_marks_streaming() {
        let (reconciler, _, area) = setup();
        assert!(area.is_streaming());
        let tracked = reconciler.tracker().area(URI, area.id).unwrap();
        assert_eq!(tracked.original_snapshot, "fn a() {\n    old();\n}\n");
        assert!(reconciler.diffs(URI).is_empty());
    }

    #[test]
    fn test_stream_writes_prefix_and_snapshot_tail() {
        let (mut reconciler, mut host, area) = setup();

        let resolution = reconciler
            .stream_rewrite(&mut host, area.id, "fn a() {\n    new();\n    more();\n")
            .unwrap();

        assert_eq!(resolution, Resolution::Applied);
        assert_eq!(
            host.read(URI).unwrap(),
            "head\nfn a() {\n    new();\n    old();\n}\ntail\n"
        );
        let tracked = reconciler.tracker().area(URI, area.id).unwrap();
        assert_eq!(tracked.current, LineRange::new(1, 4));
        assert_eq!(tracked.sweep_offset, Some(2));
        assert!(host.take_changes().is_empty());
    }

    #[test]
    fn test_sweep_decorations_follow_stream() {
        let (mut reconciler, mut host, area) = setup();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        reconciler.subscribe(move |state| sink.borrow_mut().push(state.clone()));

        reconciler
            .stream_rewrite(&mut host, area.id, "fn a() {\n")
            .unwrap();

        let seen = seen.borrow();
        let last = seen.last().unwrap();
        assert!(last.decorations.contains(&Decoration::SweepLine {
            area_id: area.id,
            line: 2
        }));
        assert!(last.decorations.contains(&Decoration::SweepPending {
            area_id: area.id,
            lines: LineRange::new(3, 1)
        }));
    }

    #[test]
    fn test_finish_rewrite_leaves_diffs_and_history() {
        let (mut reconciler, mut host, area) = setup();
        reconciler
            .stream_rewrite(&mut host, area.id, "fn a() {\n    new();\n")
            .unwrap();

        reconciler
            .finish_rewrite(&mut host, area.id, "fn a() {\n    new();\n}\n")
            .unwrap();

        assert_eq!(host.read(URI).unwrap(), "head\nfn a() {\n    new();\n}\ntail\n");
        let tracked = reconciler.tracker().area(URI, area.id).unwrap();
        assert!(!tracked.is_streaming());
        assert_eq!(tracked.current, LineRange::new(1, 3));

        let diffs = reconciler.diffs(URI);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].block.kind, BlockKind::Replacement);
        assert_eq!(diffs[0].block.original_text, "    old();\n");
        assert_eq!(reconciler.history().labels(URI), vec!["rewrite"]);

        assert!(reconciler.undo(&mut host, URI).unwrap());
        assert_eq!(host.read(URI).unwrap(), DOC);
        assert!(reconciler.areas(URI).is_empty());
    }

    #[test]
    fn test_finish_with_unchanged_text_resolves_area() {
        let (mut reconciler, mut host, area) = setup();
        reconciler
            .finish_rewrite(&mut host, area.id, "fn a() {\n    old();\n}\n")
            .unwrap();
        assert!(reconciler.areas(URI).is_empty());
        assert!(!reconciler.history().can_undo(URI));
    }

    #[test]
    fn test_abort_keeps_text() {
        let (mut reconciler, mut host, area) = setup();
        reconciler
            .stream_rewrite(&mut host, area.id, "fn a() {\n    new();\n    more();\n")
            .unwrap();
        let streamed = host.read(URI).unwrap();

        assert_eq!(reconciler.abort_rewrite(&host, area.id).unwrap(), Resolution::Applied);

        assert_eq!(host.read(URI).unwrap(), streamed);
        assert!(!reconciler.tracker().area(URI, area.id).unwrap().is_streaming());
        assert_eq!(
            reconciler.stream_rewrite(&mut host, area.id, "x\n").unwrap(),
            Resolution::Stale
        );
    }

    #[test]
    fn test_user_deleting_area_ends_stream() {
        let (mut reconciler, mut host, area) = setup();

        host.apply_edit(URI, &LineEdit::replace_lines(1, 3, "")).unwrap();
        for (uri, edit) in host.take_changes() {
            reconciler.handle_change(&host, &uri, &edit);
        }

        assert!(reconciler.areas(URI).is_empty());
        assert_eq!(
            reconciler.finish_rewrite(&mut host, area.id, "x\n").unwrap(),
            Resolution::Stale
        );
        assert_eq!(host.read(URI).unwrap(), "head\ntail\n");
    }
}
