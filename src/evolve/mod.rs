//! Self-analysis, self-modification, validation, and rollback.

pub mod analyze;
pub mod backup;
pub mod improve;
pub mod sources;
pub mod validate;

pub use analyze::{AnalysisReport, AnalyzeRequest, FileAnalysis, analyze_self, analyze_self_with};
pub use backup::{RollbackReport, RollbackRequest, Snapshot, SnapshotStore};
pub use improve::{
    FileImprovement, ImproveReport, ImproveRequest, improve_codebase, improve_codebase_with,
};
pub use validate::{
    CheckOutcome, TestRun, ValidateRequest, ValidationKind, ValidationReport, Validator,
};
