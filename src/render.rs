//! Render state handed to the host after each refresh
//!
//! Pure data: the host owns the actual highlights, zones and buttons and
//! rebuilds them from the latest `DocumentRender`.

use serde::Serialize;

use crate::diff::{BlockKind, LineRange};
use crate::reconcile::{DiffId, TrackedDiff};
use crate::tracker::{AreaId, DiffArea};

/// Inline action offered on a diff block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "diff_id", rename_all = "lowercase")]
pub enum DiffAction {
    Accept(DiffId),
    Reject(DiffId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decoration {
    /// Lines present in the document but not in the snapshot
    AddedLines { diff_id: DiffId, lines: LineRange },
    /// Snapshot text no longer in the document, shown below `after_line`
    /// (`None` places it above the first line)
    RemovedLines {
        diff_id: DiffId,
        after_line: Option<usize>,
        text: String,
    },
    /// Accept/reject buttons anchored at `line`
    Actions { line: usize, actions: [DiffAction; 2] },
    /// Line currently being streamed into
    SweepLine { area_id: AreaId, line: usize },
    /// Lines not yet reached by the stream
    SweepPending { area_id: AreaId, lines: LineRange },
}

/// Everything the host needs to draw the review state of one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRender {
    pub uri: String,
    pub decorations: Vec<Decoration>,
}

impl DocumentRender {
    pub fn actions(&self) -> impl Iterator<Item = &DiffAction> {
        self.decorations.iter().flat_map(|d| match d {
            Decoration::Actions { actions, .. } => actions.as_slice(),
            _ => Default::default(),
        })
    }
}

pub fn build(uri: &str, areas: &[DiffArea], diffs: &[TrackedDiff]) -> DocumentRender {
    let mut decorations = Vec::new();

    for diff in diffs {
        let Some(area) = areas.iter().find(|a| a.id == diff.area_id) else {
            continue;
        };
        let lines = diff.block.current_range.offset(area.current.start_line);

        if diff.block.kind != BlockKind::Deletion {
            decorations.push(Decoration::AddedLines {
                diff_id: diff.diff_id,
                lines,
            });
        }
        if diff.block.kind != BlockKind::Insertion {
            let after_line = match diff.block.kind {
                BlockKind::Replacement => lines.end_line(),
                _ => lines.start_line.checked_sub(1),
            };
            decorations.push(Decoration::RemovedLines {
                diff_id: diff.diff_id,
                after_line,
                text: diff.block.original_text.clone(),
            });
        }
        decorations.push(Decoration::Actions {
            line: lines.start_line,
            actions: [DiffAction::Accept(diff.diff_id), DiffAction::Reject(diff.diff_id)],
        });
    }

    for area in areas {
        let Some(offset) = area.sweep_offset else {
            continue;
        };
        let line = area.current.start_line + offset;
        decorations.push(Decoration::SweepLine { area_id: area.id, line });

        let pending = area.current_end_line().saturating_sub(line);
        if pending > 0 {
            decorations.push(Decoration::SweepPending {
                area_id: area.id,
                lines: LineRange::new(line + 1, pending),
            });
        }
    }

    DocumentRender {
        uri: uri.to_string(),
        decorations,
    }
}
