//! diffarea - Line diffing and diff-area tracking for reviewing suggested edits
//!
//! Regions of a document under review ("diff areas") keep a snapshot of the
//! text they replaced. The reconciler re-diffs each area against the live
//! document as it changes, and every resulting block can be accepted (the
//! snapshot takes the new text) or rejected (the document gets the old text
//! back).

pub mod buffer;
pub mod config;
pub mod diff;
pub mod export;
pub mod history;
pub mod lock;
pub mod reconcile;
pub mod render;
pub mod replay;
pub mod rewrite;
pub mod tracker;

pub use buffer::{DocumentHost, LineEdit, MemoryHost};
pub use config::Config;
pub use diff::{BlockKind, DiffAlgorithm, DiffBlock, LineDiffer, LineRange};
pub use lock::EditLock;
pub use reconcile::{DiffAreaReconciler, DiffId, Resolution, TrackedDiff};
pub use render::{Decoration, DiffAction, DocumentRender};
pub use tracker::{AreaId, CoordinateSpace, DiffArea, DiffRegionTracker};
