//! Scripted review sessions
//!
//! A script is a JSON array of steps run against an in-memory host. Edits
//! made by a step go through the host like user typing, so area tracking sees
//! them exactly as it would in an editor.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::buffer::{DocumentHost, LineEdit, MemoryHost};
use crate::config::Config;
use crate::diff::LineRange;
use crate::export::{session_report, DocumentReport};
use crate::reconcile::{DiffAreaReconciler, DiffId, Resolution};
use crate::tracker::AreaId;

/// One scripted operation. Line numbers are 0-based and `end_line` inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Open {
        uri: String,
        text: String,
    },
    Close {
        uri: String,
    },
    CreateArea {
        uri: String,
        start_line: usize,
        end_line: usize,
        /// Text to review against; the lines' current text when omitted
        #[serde(default)]
        snapshot: Option<String>,
    },
    /// User edit; without `end_line` the text is inserted before `start_line`
    Edit {
        uri: String,
        start_line: usize,
        #[serde(default)]
        end_line: Option<usize>,
        text: String,
    },
    Refresh {
        uri: String,
    },
    /// Accept the `index`-th diff currently shown in `uri`
    Accept {
        uri: String,
        index: usize,
    },
    Reject {
        uri: String,
        index: usize,
    },
    AcceptAll {
        uri: String,
    },
    RejectAll {
        uri: String,
    },
    Undo {
        uri: String,
    },
    Redo {
        uri: String,
    },
    BeginRewrite {
        uri: String,
        start_line: usize,
        end_line: usize,
    },
    StreamRewrite {
        area_id: AreaId,
        text: String,
    },
    FinishRewrite {
        area_id: AreaId,
        text: String,
    },
    AbortRewrite {
        area_id: AreaId,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Close { .. } => "close",
            Self::CreateArea { .. } => "create_area",
            Self::Edit { .. } => "edit",
            Self::Refresh { .. } => "refresh",
            Self::Accept { .. } => "accept",
            Self::Reject { .. } => "reject",
            Self::AcceptAll { .. } => "accept_all",
            Self::RejectAll { .. } => "reject_all",
            Self::Undo { .. } => "undo",
            Self::Redo { .. } => "redo",
            Self::BeginRewrite { .. } => "begin_rewrite",
            Self::StreamRewrite { .. } => "stream_rewrite",
            Self::FinishRewrite { .. } => "finish_rewrite",
            Self::AbortRewrite { .. } => "abort_rewrite",
        }
    }
}

pub fn parse_script(json: &str) -> Result<Vec<Step>> {
    serde_json::from_str(json).context("Failed to parse replay script")
}

pub fn load_script(path: &Path) -> Result<Vec<Step>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read replay script: {}", path.display()))?;
    parse_script(&contents).with_context(|| format!("Invalid replay script: {}", path.display()))
}

/// Counts of steps that changed something and steps that referred to
/// nothing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub stale: usize,
}

/// An in-memory host and the reconciler watching it
#[derive(Debug)]
pub struct Session {
    pub host: MemoryHost,
    pub reconciler: DiffAreaReconciler,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        let reconciler = DiffAreaReconciler::from_config(config);
        let host = MemoryHost::new(reconciler.edit_lock());
        Self { host, reconciler }
    }

    pub fn run(&mut self, steps: &[Step]) -> Result<ReplaySummary> {
        let mut summary = ReplaySummary::default();
        for (i, step) in steps.iter().enumerate() {
            let resolution = self
                .apply(step)
                .with_context(|| format!("Step {} ({}) failed", i + 1, step.name()))?;
            match resolution {
                Resolution::Applied => summary.applied += 1,
                Resolution::Stale => summary.stale += 1,
            }
        }
        log::info!(
            "replayed {} steps ({} stale)",
            summary.applied + summary.stale,
            summary.stale
        );
        Ok(summary)
    }

    pub fn apply(&mut self, step: &Step) -> Result<Resolution> {
        log::debug!("replay step: {:?}", step);
        let host = &mut self.host;
        let reconciler = &mut self.reconciler;

        match step {
            Step::Open { uri, text } => host.open(uri, text),
            Step::Close { uri } => {
                host.close(uri);
                reconciler.close_document(uri);
            }
            Step::CreateArea {
                uri,
                start_line,
                end_line,
                snapshot,
            } => {
                let lines = LineRange::inclusive(*start_line, *end_line);
                reconciler.create_area(&*host, uri, lines, snapshot.as_deref())?;
            }
            Step::Edit {
                uri,
                start_line,
                end_line,
                text,
            } => {
                let edit = match end_line {
                    Some(end_line) => LineEdit::replace_lines(*start_line, *end_line, text.as_str()),
                    None => LineEdit::insert_lines(*start_line, text.as_str()),
                };
                host.apply_edit(uri, &edit)?;
                for (uri, edit) in host.take_changes() {
                    reconciler.handle_change(&*host, &uri, &edit);
                }
            }
            Step::Refresh { uri } => {
                reconciler.refresh(&*host, uri);
            }
            Step::Accept { uri, index } => {
                let Some(diff_id) = nth_diff(reconciler, uri, *index) else {
                    return Ok(Resolution::Stale);
                };
                return reconciler.accept(&*host, diff_id);
            }
            Step::Reject { uri, index } => {
                let Some(diff_id) = nth_diff(reconciler, uri, *index) else {
                    return Ok(Resolution::Stale);
                };
                return reconciler.reject(host, diff_id);
            }
            Step::AcceptAll { uri } => {
                reconciler.accept_all(&*host, uri)?;
            }
            Step::RejectAll { uri } => {
                reconciler.reject_all(host, uri)?;
            }
            Step::Undo { uri } => return undone(reconciler.undo(host, uri)?),
            Step::Redo { uri } => return undone(reconciler.redo(host, uri)?),
            Step::BeginRewrite {
                uri,
                start_line,
                end_line,
            } => {
                let lines = LineRange::inclusive(*start_line, *end_line);
                reconciler.begin_rewrite(&*host, uri, lines)?;
            }
            Step::StreamRewrite { area_id, text } => {
                return reconciler.stream_rewrite(host, *area_id, text);
            }
            Step::FinishRewrite { area_id, text } => {
                return reconciler.finish_rewrite(host, *area_id, text);
            }
            Step::AbortRewrite { area_id } => return reconciler.abort_rewrite(&*host, *area_id),
        }
        Ok(Resolution::Applied)
    }

    pub fn report(&self) -> Vec<DocumentReport> {
        session_report(&self.host, &self.reconciler)
    }
}

fn nth_diff(reconciler: &DiffAreaReconciler, uri: &str, index: usize) -> Option<DiffId> {
    let diff = reconciler.diffs(uri).get(index);
    if diff.is_none() {
        log::warn!("{} has no diff #{}", uri, index);
    }
    diff.map(|d| d.diff_id)
}

fn undone(changed: bool) -> Result<Resolution> {
    Ok(if changed {
        Resolution::Applied
    } else {
        Resolution::Stale
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SCRIPT: &str = r#"[
        {"op": "open", "uri": "file:///a.rs", "text": "fn main() {\n    println!(\"hi\");\n}\n"},
        {"op": "create_area", "uri": "file:///a.rs", "start_line": 1, "end_line": 1,
         "snapshot": "    println!(\"hello\");\n"},
        {"op": "edit", "uri": "file:///a.rs", "start_line": 0, "text": "// header\n"},
        {"op": "refresh", "uri": "file:///a.rs"}
    ]"#;

    #[test]
    fn test_parse_script() {
        let steps = parse_script(SCRIPT).unwrap();
        assert_eq!(steps.len(), 4);
        assert_eq!(
            steps[2],
            Step::Edit {
                uri: "file:///a.rs".to_string(),
                start_line: 0,
                end_line: None,
                text: "// header\n".to_string(),
            }
        );
        assert!(parse_script(r#"[{"op": "explode"}]"#).is_err());
    }

    #[test]
    fn test_user_edit_moves_area() {
        let mut session = Session::new(&Config::default());
        let summary = session.run(&parse_script(SCRIPT).unwrap()).unwrap();
        assert_eq!(summary, ReplaySummary { applied: 4, stale: 0 });

        let areas = session.reconciler.areas("file:///a.rs");
        assert_eq!(areas[0].current, LineRange::new(2, 1));
        let diffs = session.reconciler.diffs("file:///a.rs");
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].block.current_text, "    println!(\"hi\");\n");
    }

    #[test]
    fn test_reject_then_undo() {
        let mut session = Session::new(&Config::default());
        session.run(&parse_script(SCRIPT).unwrap()).unwrap();

        let steps = parse_script(
            r#"[
            {"op": "reject", "uri": "file:///a.rs", "index": 0},
            {"op": "reject", "uri": "file:///a.rs", "index": 0},
            {"op": "undo", "uri": "file:///a.rs"}
        ]"#,
        )
        .unwrap();
        let summary = session.run(&steps).unwrap();

        assert_eq!(summary, ReplaySummary { applied: 2, stale: 1 });
        let report = session.report();
        assert_eq!(report[0].text, "// header\nfn main() {\n    println!(\"hi\");\n}\n");
        assert_eq!(report[0].diffs.len(), 1);
    }

    #[test]
    fn test_streamed_rewrite_script() {
        let steps = parse_script(
            r#"[
            {"op": "open", "uri": "file:///b.rs", "text": "a\nb\nc\n"},
            {"op": "begin_rewrite", "uri": "file:///b.rs", "start_line": 0, "end_line": 2},
            {"op": "stream_rewrite", "area_id": 0, "text": "a\nB"},
            {"op": "finish_rewrite", "area_id": 0, "text": "a\nB\nc\n"},
            {"op": "accept_all", "uri": "file:///b.rs"},
            {"op": "finish_rewrite", "area_id": 0, "text": "x\n"}
        ]"#,
        )
        .unwrap();
        let mut session = Session::new(&Config::default());

        let summary = session.run(&steps).unwrap();

        assert_eq!(summary, ReplaySummary { applied: 5, stale: 1 });
        assert_eq!(session.host.read("file:///b.rs").unwrap(), "a\nB\nc\n");
        assert!(session.reconciler.areas("file:///b.rs").is_empty());
    }

    #[test]
    fn test_failing_step_names_itself() {
        let steps = parse_script(
            r#"[{"op": "edit", "uri": "file:///missing.rs", "start_line": 0, "text": "x\n"}]"#,
        )
        .unwrap();
        let err = Session::new(&Config::default()).run(&steps).unwrap_err();
        assert!(err.to_string().contains("Step 1 (edit) failed"));
    }

    #[test]
    fn test_load_script_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, SCRIPT).unwrap();

        assert_eq!(load_script(&path).unwrap().len(), 4);
        assert!(load_script(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_close_drops_review_state() {
        let mut session = Session::new(&Config::default());
        session.run(&parse_script(SCRIPT).unwrap()).unwrap();
        session
            .apply(&Step::Close {
                uri: "file:///a.rs".to_string(),
            })
            .unwrap();

        assert!(session.report().is_empty());
        assert!(session.reconciler.documents().is_empty());
    }
}
