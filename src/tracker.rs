//! Diff-area bookkeeping
//!
//! Keeps the regions under review for each document and re-anchors them as
//! lines are inserted and removed around and inside them.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::buffer::LineEdit;
use crate::diff::{line_count, normalize, LineRange};

pub type AreaId = u64;

/// Which pair of bounds an edit is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateSpace {
    /// Lines of the live document
    Current,
    /// Lines of the recorded original the snapshots were taken from
    Original,
}

/// A region of a document under review.
///
/// `current` always covers at least one line while the area is alive.
/// `original` may be empty when the area was created over nothing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiffArea {
    pub id: AreaId,
    pub current: LineRange,
    pub original: LineRange,
    pub original_snapshot: String,
    /// Line being streamed into, relative to `current.start_line`
    #[serde(default)]
    pub sweep_offset: Option<usize>,
}

impl DiffArea {
    pub fn current_start_line(&self) -> usize {
        self.current.start_line
    }

    pub fn current_end_line(&self) -> usize {
        self.current.end_line().unwrap_or(self.current.start_line)
    }

    pub fn original_start_line(&self) -> usize {
        self.original.start_line
    }

    pub fn original_end_line(&self) -> Option<usize> {
        self.original.end_line()
    }

    pub fn is_streaming(&self) -> bool {
        self.sweep_offset.is_some()
    }

    pub fn overlaps(&self, range: &LineRange) -> bool {
        let ours = self.current.as_range();
        let theirs = range.as_range();
        ours.start < theirs.end && theirs.start < ours.end
    }

    fn bounds_mut(&mut self, space: CoordinateSpace) -> &mut LineRange {
        match space {
            CoordinateSpace::Current => &mut self.current,
            CoordinateSpace::Original => &mut self.original,
        }
    }

    fn bounds(&self, space: CoordinateSpace) -> &LineRange {
        match space {
            CoordinateSpace::Current => &self.current,
            CoordinateSpace::Original => &self.original,
        }
    }
}

/// Per-document set of diff areas
#[derive(Debug, Default)]
pub struct DiffRegionTracker {
    areas: BTreeMap<String, Vec<DiffArea>>,
    next_id: AreaId,
}

impl DiffRegionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `current` lines of `uri` against `snapshot`.
    ///
    /// Areas overlapping the new range are dropped; the newest area wins.
    pub fn create_area(&mut self, uri: &str, current: LineRange, snapshot: &str) -> Result<DiffArea> {
        if current.is_collapsed() {
            anyhow::bail!(
                "diff area at line {} in {} must cover at least one line",
                current.start_line,
                uri
            );
        }

        let areas = self.areas.entry(uri.to_string()).or_default();
        areas.retain(|area| {
            let keep = !area.overlaps(&current);
            if !keep {
                log::debug!("dropping diff area {} overlapped by new area in {}", area.id, uri);
            }
            keep
        });

        let snapshot = normalize(snapshot);
        let area = DiffArea {
            id: self.next_id,
            current,
            original: LineRange::new(current.start_line, line_count(&snapshot)),
            original_snapshot: snapshot,
            sweep_offset: None,
        };
        self.next_id += 1;

        let at = areas
            .iter()
            .position(|a| a.current.start_line > current.start_line)
            .unwrap_or(areas.len());
        areas.insert(at, area.clone());
        log::debug!(
            "created diff area {} over lines {}..={} of {}",
            area.id,
            area.current_start_line(),
            area.current_end_line(),
            uri
        );
        Ok(area)
    }

    /// Re-anchor every area of `uri` after `edit` was applied in `space`.
    ///
    /// Returns the ids of areas the edit collapsed; those are no longer tracked.
    pub fn adjust_for_change(&mut self, uri: &str, space: CoordinateSpace, edit: &LineEdit) -> Vec<AreaId> {
        self.adjust_for_owned_change(uri, space, edit, None)
    }

    /// Like [`Self::adjust_for_change`], for an edit made on behalf of `owner`.
    ///
    /// A pure insertion touching the owner's bounds grows the owner even when a
    /// neighbouring area starts or ends at the same line.
    pub fn adjust_for_owned_change(
        &mut self,
        uri: &str,
        space: CoordinateSpace,
        edit: &LineEdit,
        owner: Option<AreaId>,
    ) -> Vec<AreaId> {
        self.adjust(uri, space, edit, owner, |_| true)
    }

    /// Re-anchor area `id` alone after `edit` was applied in `space`.
    ///
    /// Each area's original bounds describe its own snapshot, so an edit to
    /// one snapshot never moves another area.
    pub fn adjust_area_for_change(
        &mut self,
        uri: &str,
        id: AreaId,
        space: CoordinateSpace,
        edit: &LineEdit,
    ) -> Vec<AreaId> {
        self.adjust(uri, space, edit, Some(id), |area| area.id == id)
    }

    fn adjust(
        &mut self,
        uri: &str,
        space: CoordinateSpace,
        edit: &LineEdit,
        owner: Option<AreaId>,
        affects: impl Fn(&DiffArea) -> bool,
    ) -> Vec<AreaId> {
        let Some(areas) = self.areas.get_mut(uri) else {
            return Vec::new();
        };

        let start = edit.lines.start as isize;
        let end = edit.lines.end as isize;
        let inserted = edit.inserted_lines() as isize;
        let delta = edit.delta();

        let touches = |area: &DiffArea| {
            if !affects(area) {
                return false;
            }
            let bounds = area.bounds(space);
            let a = bounds.start_line as isize;
            a <= start && start <= a + bounds.line_count as isize
        };
        // Insertion just past an area's last line belongs to that area rather
        // than to a neighbour starting there.
        let claimant = if edit.is_pure_insertion() {
            owner
                .filter(|id| areas.iter().any(|area| area.id == *id && touches(area)))
                .or_else(|| {
                    areas
                        .iter()
                        .find(|area| touches(*area) && (area.bounds(space).start_line as isize) < start)
                        .or_else(|| areas.iter().find(|area| touches(*area)))
                        .map(|area| area.id)
                })
        } else {
            None
        };

        let mut collapsed = Vec::new();
        areas.retain_mut(|area| {
            if !affects(area) {
                return true;
            }
            let id = area.id;
            let bounds = area.bounds_mut(space);
            let a = bounds.start_line as isize;
            let count = bounds.line_count as isize;
            let b = a + count - 1;

            let (new_start, new_count) = if edit.is_pure_insertion() {
                if claimant == Some(id) {
                    (a, count + inserted)
                } else if a >= start {
                    (a + delta, count)
                } else {
                    (a, count)
                }
            } else {
                let last = end - 1;
                if last < a {
                    (a + delta, count)
                } else if start > b {
                    (a, count)
                } else if start >= a && last <= b {
                    (a, count + delta)
                } else if start <= a && last >= b {
                    (start, inserted)
                } else if start < a {
                    // head overlap: the area now begins where the new text does
                    (start, b + delta - start + 1)
                } else {
                    // tail overlap: the area ends with the new text
                    (a, start + inserted - a)
                }
            };

            let alive = new_start >= 0
                && match space {
                    CoordinateSpace::Current => new_count > 0,
                    CoordinateSpace::Original => new_count >= 0,
                };
            if !alive {
                collapsed.push(id);
                return false;
            }

            bounds.start_line = new_start as usize;
            bounds.line_count = new_count as usize;
            true
        });

        for id in &collapsed {
            log::debug!("diff area {} in {} collapsed by edit at {:?}", id, uri, edit.lines);
        }
        collapsed
    }

    pub fn areas(&self, uri: &str) -> &[DiffArea] {
        self.areas.get(uri).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn area(&self, uri: &str, id: AreaId) -> Option<&DiffArea> {
        self.areas(uri).iter().find(|area| area.id == id)
    }

    pub(crate) fn areas_mut(&mut self, uri: &str) -> &mut [DiffArea] {
        self.areas.get_mut(uri).map(Vec::as_mut_slice).unwrap_or_default()
    }

    pub fn area_mut(&mut self, uri: &str, id: AreaId) -> Option<&mut DiffArea> {
        self.areas.get_mut(uri)?.iter_mut().find(|area| area.id == id)
    }

    /// Document owning area `id`
    pub fn find_area(&self, id: AreaId) -> Option<(&str, &DiffArea)> {
        self.areas.iter().find_map(|(uri, areas)| {
            areas
                .iter()
                .find(|area| area.id == id)
                .map(|area| (uri.as_str(), area))
        })
    }

    pub fn remove_area(&mut self, uri: &str, id: AreaId) -> Option<DiffArea> {
        let areas = self.areas.get_mut(uri)?;
        let at = areas.iter().position(|area| area.id == id)?;
        Some(areas.remove(at))
    }

    /// Replace the areas of `uri` wholesale, as when restoring history
    pub fn replace_areas(&mut self, uri: &str, mut areas: Vec<DiffArea>) {
        areas.sort_by_key(|area| area.current.start_line);
        if let Some(max) = areas.iter().map(|area| area.id).max() {
            self.next_id = self.next_id.max(max + 1);
        }
        self.areas.insert(uri.to_string(), areas);
    }

    /// Forget everything tracked for `uri`
    pub fn close_document(&mut self, uri: &str) -> usize {
        self.areas.remove(uri).map(|areas| areas.len()).unwrap_or(0)
    }

    pub fn documents(&self) -> impl Iterator<Item = &str> {
        self.areas
            .iter()
            .filter(|(_, areas)| !areas.is_empty())
            .map(|(uri, _)| uri.as_str())
    }
}
