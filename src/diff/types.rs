//! Schema diff records
//!
//! A `SchemaDiff` describes how to make the target schema equal the source
//! schema. It references the input records and never mutates them.

use crate::extractor::{
    ColumnSchema, ForeignKey, FunctionSchema, IndexSchema, ProcedureSchema, TableSchema,
    TriggerSchema, ViewSchema,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of difference detected for an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Added,
    Removed,
    Modified,
}

/// Severity of an individual change, independent of the aggregate risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Danger,
}

/// One changed attribute of a modified object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDiff {
    pub property: String,
    pub old_value: String,
    pub new_value: String,
}

impl PropertyDiff {
    pub fn new(
        property: impl Into<String>,
        old_value: impl Into<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self {
            property: property.into(),
            old_value: old_value.into(),
            new_value: new_value.into(),
        }
    }
}

/// Complete diff between two schemas
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDiff {
    pub source_database: String,
    pub target_database: String,
    pub table_diffs: Vec<TableDiff>,
    pub view_diffs: Vec<ViewDiff>,
    pub proc_diffs: Vec<ProcedureDiff>,
    pub func_diffs: Vec<FunctionDiff>,
    pub trigger_diffs: Vec<TriggerDiff>,
    pub statistics: DiffStatistics,
    pub generated_at: DateTime<Utc>,
}

impl SchemaDiff {
    pub fn has_diff(&self) -> bool {
        !self.table_diffs.is_empty()
            || !self.view_diffs.is_empty()
            || !self.proc_diffs.is_empty()
            || !self.func_diffs.is_empty()
            || !self.trigger_diffs.is_empty()
    }

    /// Highest severity across all nested diffs
    pub fn max_severity(&self) -> Severity {
        let mut max = Severity::Info;
        for td in &self.table_diffs {
            max = max.max(td.severity);
            for cd in &td.column_diffs {
                max = max.max(cd.severity);
            }
            for id in &td.index_diffs {
                max = max.max(id.severity);
            }
            for fkd in &td.fkey_diffs {
                max = max.max(fkd.severity);
            }
        }
        for vd in &self.view_diffs {
            max = max.max(vd.severity);
        }
        for pd in &self.proc_diffs {
            max = max.max(pd.severity);
        }
        for fd in &self.func_diffs {
            max = max.max(fd.severity);
        }
        for td in &self.trigger_diffs {
            max = max.max(td.severity);
        }
        max
    }
}

/// Counts per object class and severity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffStatistics {
    pub total_diffs: usize,
    pub tables_added: usize,
    pub tables_removed: usize,
    pub tables_changed: usize,
    pub views_added: usize,
    pub views_removed: usize,
    pub views_changed: usize,
    pub procs_added: usize,
    pub procs_removed: usize,
    pub procs_changed: usize,
    pub funcs_added: usize,
    pub funcs_removed: usize,
    pub funcs_changed: usize,
    pub triggers_added: usize,
    pub triggers_removed: usize,
    pub triggers_changed: usize,
    pub danger_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
}

/// Table-level diff with nested column/index/foreign-key changes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDiff {
    pub table_name: String,
    pub kind: DiffKind,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_table: Option<TableSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_table: Option<TableSchema>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub column_diffs: Vec<ColumnDiff>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub index_diffs: Vec<IndexDiff>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub fkey_diffs: Vec<ForeignKeyDiff>,
    /// Engine, charset, collation, comment, auto-increment changes
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub table_props: Vec<PropertyDiff>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDiff {
    pub column_name: String,
    pub kind: DiffKind,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_column: Option<ColumnSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_column: Option<ColumnSchema>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub changes: Vec<PropertyDiff>,
    pub risk_note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDiff {
    pub index_name: String,
    pub kind: DiffKind,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_index: Option<IndexSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_index: Option<IndexSchema>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyDiff {
    pub fkey_name: String,
    pub kind: DiffKind,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_fkey: Option<ForeignKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_fkey: Option<ForeignKey>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDiff {
    pub view_name: String,
    pub kind: DiffKind,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_view: Option<ViewSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_view: Option<ViewSchema>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureDiff {
    pub proc_name: String,
    pub kind: DiffKind,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_proc: Option<ProcedureSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_proc: Option<ProcedureSchema>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDiff {
    pub func_name: String,
    pub kind: DiffKind,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_func: Option<FunctionSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_func: Option<FunctionSchema>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDiff {
    pub trigger_name: String,
    pub kind: DiffKind,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_trigger: Option<TriggerSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_trigger: Option<TriggerSchema>,
    pub description: String,
}
