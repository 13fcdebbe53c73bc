//! Export functionality for diffs and review sessions
//!
//! Renders diff blocks, or every open document with its areas and diffs, as
//! markdown for reading or JSON for programmatic consumption.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::buffer::{DocumentHost, MemoryHost};
use crate::diff::{split_lines, DiffBlock, LineRange};
use crate::reconcile::{DiffAreaReconciler, TrackedDiff};
use crate::tracker::DiffArea;

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Markdown,
    Json,
}

impl ExportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "md" | "markdown" => Some(Self::Markdown),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Review state of one document
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub uri: String,
    pub text: String,
    pub areas: Vec<DiffArea>,
    pub diffs: Vec<TrackedDiff>,
}

/// Snapshot every document open in `host` together with its review state
pub fn session_report(host: &MemoryHost, reconciler: &DiffAreaReconciler) -> Vec<DocumentReport> {
    host.uris()
        .filter_map(|uri| {
            let text = host.read(uri)?;
            Some(DocumentReport {
                uri: uri.to_string(),
                text,
                areas: reconciler.areas(uri).to_vec(),
                diffs: reconciler.diffs(uri).to_vec(),
            })
        })
        .collect()
}

/// 1-based display form of a line range
fn line_range(range: &LineRange) -> String {
    match range.end_line() {
        None => format!("before L{}", range.start_line + 1),
        Some(end) if end == range.start_line => format!("L{}", range.start_line + 1),
        Some(end) => format!("L{}-{}", range.start_line + 1, end + 1),
    }
}

fn push_unified(output: &mut String, block: &DiffBlock) {
    output.push_str("```diff\n");
    for line in split_lines(&block.original_text) {
        output.push('-');
        output.push_str(line.trim_end_matches('\n'));
        output.push('\n');
    }
    for line in split_lines(&block.current_text) {
        output.push('+');
        output.push_str(line.trim_end_matches('\n'));
        output.push('\n');
    }
    output.push_str("```\n\n");
}

/// Exports diff blocks in markdown format
pub fn export_blocks_markdown(blocks: &[DiffBlock]) -> String {
    if blocks.is_empty() {
        return "# No differences found\n".to_string();
    }

    let mut output = String::new();
    output.push_str("# Diff\n\n");
    for block in blocks {
        output.push_str(&format!(
            "## {} {} -> {}\n\n",
            block.kind.as_str(),
            line_range(&block.original_range),
            line_range(&block.current_range)
        ));
        push_unified(&mut output, block);
    }
    output
}

/// Exports a review session in markdown format
pub fn export_session_markdown(reports: &[DocumentReport]) -> String {
    if reports.is_empty() {
        return "# No open documents\n".to_string();
    }

    let mut output = String::new();
    output.push_str("# Review Session\n\n");

    for report in reports {
        output.push_str(&format!("## {}\n\n", report.uri));
        if report.areas.is_empty() {
            output.push_str("_No diff areas_\n\n");
            continue;
        }

        for area in &report.areas {
            let streaming = if area.is_streaming() { " (streaming)" } else { "" };
            output.push_str(&format!(
                "### Area #{} {}{}\n\n",
                area.id,
                line_range(&area.current),
                streaming
            ));

            let diffs: Vec<&TrackedDiff> = report
                .diffs
                .iter()
                .filter(|d| d.area_id == area.id)
                .collect();
            if diffs.is_empty() {
                output.push_str("_No pending diffs_\n\n");
            }
            for diff in diffs {
                output.push_str(&format!(
                    "#### Diff #{} {} at {}\n\n",
                    diff.diff_id,
                    diff.block.kind.as_str(),
                    line_range(&diff.document_range(area))
                ));
                push_unified(&mut output, &diff.block);
            }
        }
    }

    output
}

pub fn export_blocks(blocks: &[DiffBlock], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Markdown => Ok(export_blocks_markdown(blocks)),
        ExportFormat::Json => serde_json::to_string_pretty(blocks).map_err(Into::into),
    }
}

pub fn export_session(reports: &[DocumentReport], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Markdown => Ok(export_session_markdown(reports)),
        ExportFormat::Json => serde_json::to_string_pretty(reports).map_err(Into::into),
    }
}
