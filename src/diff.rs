//! Line-level diff engine
//!
//! Splits both texts into terminated lines, runs a `similar` diff over the
//! line slices and folds the resulting runs into insert/delete/replace blocks.

use serde::{Deserialize, Serialize};
use similar::{Algorithm, DiffTag};
use std::ops::Range;
use std::time::{Duration, Instant};

/// Which diff algorithm backs the line differ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DiffAlgorithm {
    #[default]
    Myers,
    Patience,
    Lcs,
}

impl DiffAlgorithm {
    fn as_similar(self) -> Algorithm {
        match self {
            Self::Myers => Algorithm::Myers,
            Self::Patience => Algorithm::Patience,
            Self::Lcs => Algorithm::Lcs,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Myers => "myers",
            Self::Patience => "patience",
            Self::Lcs => "lcs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Insertion,
    Deletion,
    Replacement,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insertion => "insertion",
            Self::Deletion => "deletion",
            Self::Replacement => "replacement",
        }
    }
}

/// A run of lines in one version of a text.
///
/// `line_count == 0` is a collapsed anchor: the block touches no lines on this
/// side and sits just before `start_line`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct LineRange {
    pub start_line: usize,
    pub line_count: usize,
}

impl LineRange {
    pub fn new(start_line: usize, line_count: usize) -> Self {
        Self {
            start_line,
            line_count,
        }
    }

    /// Inclusive range over `start_line..=end_line`
    pub fn inclusive(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line,
            line_count: (end_line + 1).saturating_sub(start_line),
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.line_count == 0
    }

    /// Last covered line, or `None` for a collapsed range
    pub fn end_line(&self) -> Option<usize> {
        self.line_count.checked_sub(1).map(|n| self.start_line + n)
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start_line..self.start_line + self.line_count
    }

    pub fn offset(&self, by: usize) -> Self {
        Self::new(self.start_line + by, self.line_count)
    }
}

/// One contiguous change between an original and a current text
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiffBlock {
    pub kind: BlockKind,
    pub current_range: LineRange,
    pub original_range: LineRange,
    /// Lines of the current text inside `current_range`, terminators included
    pub current_text: String,
    /// Lines of the original text inside `original_range`, terminators included
    pub original_text: String,
}

/// Normalize line endings to `\n`
pub fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n")
}

/// Split text into lines that keep their `\n` terminator.
///
/// The last line is unterminated when the text does not end with a newline.
/// Empty text has no lines.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

pub fn line_count(text: &str) -> usize {
    text.split_inclusive('\n').count()
}

/// Line differ with a configurable algorithm and optional deadline
#[derive(Debug, Clone, Default)]
pub struct LineDiffer {
    algorithm: DiffAlgorithm,
    timeout: Option<Duration>,
}

impl LineDiffer {
    pub fn new(algorithm: DiffAlgorithm, timeout: Option<Duration>) -> Self {
        Self { algorithm, timeout }
    }

    pub fn algorithm(&self) -> DiffAlgorithm {
        self.algorithm
    }

    /// Diff `original` against `current`, returning blocks in ascending order.
    ///
    /// Equal runs flush the pending streak of removed/inserted lines; a streak
    /// with both sides populated is a replacement. Past the deadline the
    /// underlying algorithm falls back to a coarser (still correct) diff.
    pub fn diff(&self, original: &str, current: &str) -> Vec<DiffBlock> {
        let original = normalize(original);
        let current = normalize(current);
        let old_lines = split_lines(&original);
        let new_lines = split_lines(&current);

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let ops = similar::capture_diff_slices_deadline(
            self.algorithm.as_similar(),
            &old_lines,
            &new_lines,
            deadline,
        );

        let mut walker = StreakWalker::new(&old_lines, &new_lines);
        for op in &ops {
            let old_len = op.old_range().len();
            let new_len = op.new_range().len();
            match op.tag() {
                DiffTag::Equal => walker.equal(old_len),
                DiffTag::Delete => walker.removed(old_len),
                DiffTag::Insert => walker.inserted(new_len),
                DiffTag::Replace => {
                    walker.removed(old_len);
                    walker.inserted(new_len);
                }
            }
        }
        // Trailing empty equal run flushes the last streak
        walker.equal(0);
        walker.blocks
    }
}

struct StreakWalker<'a> {
    old_lines: &'a [&'a str],
    new_lines: &'a [&'a str],
    old_line: usize,
    new_line: usize,
    streak: Option<(usize, usize)>,
    blocks: Vec<DiffBlock>,
}

impl<'a> StreakWalker<'a> {
    fn new(old_lines: &'a [&'a str], new_lines: &'a [&'a str]) -> Self {
        Self {
            old_lines,
            new_lines,
            old_line: 0,
            new_line: 0,
            streak: None,
            blocks: Vec::new(),
        }
    }

    fn start_streak(&mut self) {
        if self.streak.is_none() {
            self.streak = Some((self.old_line, self.new_line));
        }
    }

    fn removed(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.start_streak();
        self.old_line += count;
    }

    fn inserted(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.start_streak();
        self.new_line += count;
    }

    fn equal(&mut self, count: usize) {
        if let Some((old_start, new_start)) = self.streak.take() {
            let original_range = LineRange::new(old_start, self.old_line - old_start);
            let current_range = LineRange::new(new_start, self.new_line - new_start);

            let kind = match (original_range.is_collapsed(), current_range.is_collapsed()) {
                (true, _) => BlockKind::Insertion,
                (_, true) => BlockKind::Deletion,
                _ => BlockKind::Replacement,
            };

            self.blocks.push(DiffBlock {
                kind,
                original_text: self.old_lines[original_range.as_range()].concat(),
                current_text: self.new_lines[current_range.as_range()].concat(),
                current_range,
                original_range,
            });
        }
        self.old_line += count;
        self.new_line += count;
    }
}

/// Replace the lines of `text` in `range` with `replacement`, keeping inner lines terminated.
pub fn splice_lines(text: &str, range: Range<usize>, replacement: &str) -> String {
    let lines = split_lines(text);
    let end = range.end.min(lines.len());
    let start = range.start.min(end);

    let mut out = String::with_capacity(text.len() + replacement.len());
    for line in &lines[..start] {
        out.push_str(line);
    }
    if !out.is_empty() && !out.ends_with('\n') && !replacement.is_empty() {
        out.push('\n');
    }
    out.push_str(replacement);
    if end < lines.len() && !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    for line in &lines[end..] {
        out.push_str(line);
    }
    out
}

/// Rebuild one side of a diff by walking its blocks and the equal gaps between them.
pub fn reconstruct(other: &str, blocks: &[DiffBlock], side: Side) -> String {
    let other = normalize(other);
    let lines = split_lines(&other);
    let mut out = String::new();
    let mut cursor = 0;

    for block in blocks {
        let (from, text) = match side {
            Side::Original => (block.current_range, &block.original_text),
            Side::Current => (block.original_range, &block.current_text),
        };
        for line in &lines[cursor..from.start_line] {
            out.push_str(line);
        }
        out.push_str(text);
        cursor = from.start_line + from.line_count;
    }
    for line in &lines[cursor.min(lines.len())..] {
        out.push_str(line);
    }
    out
}

/// Which version of a text a reconstruction or coordinate refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Original,
    Current,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn differ() -> LineDiffer {
        LineDiffer::default()
    }

    #[test]
    fn test_identical_texts_have_no_blocks() {
        assert!(differ().diff("a\nb\nc\n", "a\nb\nc\n").is_empty());
        assert!(differ().diff("", "").is_empty());
    }

    #[test]
    fn test_replacement_of_blank_line() {
        let original = "A\nB\nC\n\nE\n";
        let current = "A\nB\nC\nF\nD\nE\n";
        let blocks = differ().diff(original, current);

        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.kind, BlockKind::Replacement);
        assert_eq!(block.original_range, LineRange::new(3, 1));
        assert_eq!(block.current_range, LineRange::new(3, 2));
        assert_eq!(block.original_text, "\n");
        assert_eq!(block.current_text, "F\nD\n");
    }

    #[test]
    fn test_pure_insertion_has_collapsed_original() {
        let blocks = differ().diff("A\nB\nC\n", "A\nB\nX\nC\n");

        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.kind, BlockKind::Insertion);
        assert!(block.original_range.is_collapsed());
        assert_eq!(block.original_range.start_line, 2);
        assert_eq!(block.current_range, LineRange::new(2, 1));
        assert_eq!(block.current_text, "X\n");
        assert_eq!(block.original_text, "");
    }

    #[test]
    fn test_pure_deletion_has_collapsed_current() {
        let blocks = differ().diff("A\nB\nF\nC\n", "A\nB\nC\n");

        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.kind, BlockKind::Deletion);
        assert_eq!(block.original_range, LineRange::new(2, 1));
        assert!(block.current_range.is_collapsed());
        assert_eq!(block.current_range.start_line, 2);
        assert_eq!(block.original_text, "F\n");
        assert_eq!(block.current_range.end_line(), None);
    }

    #[test]
    fn test_single_line_change() {
        let blocks = differ().diff("foo\n", "bar\n");

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Replacement);
        assert_eq!(blocks[0].original_text, "foo\n");
        assert_eq!(blocks[0].current_text, "bar\n");
    }

    #[test]
    fn test_empty_sides() {
        let blocks = differ().diff("", "a\nb\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Insertion);
        assert_eq!(blocks[0].current_range, LineRange::new(0, 2));

        let blocks = differ().diff("a\nb\n", "");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Deletion);
        assert_eq!(blocks[0].original_range, LineRange::new(0, 2));
    }

    #[test]
    fn test_trailing_newline_is_one_line_change() {
        for (a, b) in [("a\nb\n", "a\nb"), ("a\nb", "a\nb\n")] {
            let blocks = differ().diff(a, b);
            assert_eq!(blocks.len(), 1);
            assert_eq!(blocks[0].original_range, LineRange::new(1, 1));
            assert_eq!(blocks[0].current_range, LineRange::new(1, 1));
        }
    }

    #[test]
    fn test_crlf_is_normalized() {
        assert!(differ().diff("a\r\nb\r\n", "a\nb\n").is_empty());
    }

    #[test]
    fn test_blocks_are_ordered() {
        let original = "1\n2\n3\n4\n5\n6\n7\n";
        let current = "1\nx\n3\n4\n6\n7\ny\n";
        let blocks = differ().diff(original, current);

        assert_eq!(blocks.len(), 3);
        for pair in blocks.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.original_range.as_range().end <= b.original_range.start_line);
            assert!(a.current_range.as_range().end <= b.current_range.start_line);
        }
        assert_eq!(reconstruct(current, &blocks, Side::Original), original);
        assert_eq!(reconstruct(original, &blocks, Side::Current), current);
    }

    #[test]
    fn test_patience_agrees_on_simple_change() {
        let differ = LineDiffer::new(DiffAlgorithm::Patience, None);
        let blocks = differ.diff("a\nb\nc\n", "a\nB\nc\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].original_text, "b\n");
    }

    #[test]
    fn test_splice_lines() {
        assert_eq!(splice_lines("a\nb\nc\n", 1..2, "x\ny\n"), "a\nx\ny\nc\n");
        assert_eq!(splice_lines("a\nb\nc\n", 1..1, "x\n"), "a\nx\nb\nc\n");
        assert_eq!(splice_lines("a\nb\nc\n", 0..3, ""), "");
        assert_eq!(splice_lines("a\nb", 2..2, "c\n"), "a\nb\nc\n");
        assert_eq!(splice_lines("a\nb\n", 0..1, "x"), "x\nb\n");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn text() -> impl Strategy<Value = String> {
            (prop::collection::vec("[abc ]{0,3}", 0..8), any::<bool>()).prop_map(
                |(lines, trailing)| {
                    let mut joined = lines.join("\n");
                    if trailing && !joined.is_empty() {
                        joined.push('\n');
                    }
                    joined
                },
            )
        }

        proptest! {
            #[test]
            fn round_trip_reconstructs_both_sides(a in text(), b in text()) {
                let blocks = LineDiffer::default().diff(&a, &b);
                prop_assert_eq!(reconstruct(&b, &blocks, Side::Original), a.clone());
                prop_assert_eq!(reconstruct(&a, &blocks, Side::Current), b.clone());
            }

            #[test]
            fn identical_text_has_no_blocks(a in text()) {
                prop_assert!(LineDiffer::default().diff(&a, &a).is_empty());
            }

            #[test]
            fn replacements_have_both_sides(a in text(), b in text()) {
                for block in LineDiffer::default().diff(&a, &b) {
                    match block.kind {
                        BlockKind::Replacement => {
                            prop_assert!(!block.original_range.is_collapsed());
                            prop_assert!(!block.current_range.is_collapsed());
                        }
                        BlockKind::Insertion => prop_assert!(block.original_range.is_collapsed()),
                        BlockKind::Deletion => prop_assert!(block.current_range.is_collapsed()),
                    }
                }
            }
        }
    }
}
