//! The merge engine: conflict detection (merge-preview) and the execute
//! pipeline (merge-execute). See `examples/original_source/backend/merge_preview.go`
//! and `merge_execute.go` for the behavior this reproduces.

pub mod execute;
pub mod preview;
pub mod types;

pub use execute::{execute_merge, preview_and_execute, validate_resolutions};
pub use preview::detect_conflicts;
pub use types::{ChosenSource, ConflictType, MergeConflict, MergeExecuteResponse, MergePreviewResponse, MergeResolution};
