//! Diff Engine and Risk Assessor
//!
//! The structural comparison core: a rule-driven differ over every catalog
//! object class plus deterministic risk scoring of the result.

pub mod compare;
pub mod engine;
pub mod risk;
pub mod types;

pub use engine::{DiffEngine, IgnoreRules};
pub use risk::{RiskAssessment, RiskAssessor, RiskLevel};
pub use types::{
    ColumnDiff, DiffKind, DiffStatistics, ForeignKeyDiff, FunctionDiff, IndexDiff, ProcedureDiff,
    PropertyDiff, SchemaDiff, Severity, TableDiff, TriggerDiff, ViewDiff,
};
