//! Schema Extractor
//!
//! Reads a live MySQL database's structural catalog into a typed
//! [`DatabaseSchema`]: tables (columns, indexes, foreign keys, verbatim
//! `SHOW CREATE TABLE`), views, procedures, functions and triggers.

pub mod mysql;
pub mod schema;

pub use mysql::MySqlExtractor;
pub use schema::{
    ColumnSchema, DatabaseSchema, ForeignKey, FunctionSchema, IndexColumn, IndexKind, IndexSchema,
    ProcedureSchema, RoutineParam, TableSchema, TriggerSchema, ViewSchema,
};

use serde::{Deserialize, Serialize};

/// What to pull out of the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractOptions {
    pub include_tables: bool,
    pub include_views: bool,
    pub include_procedures: bool,
    pub include_functions: bool,
    pub include_triggers: bool,
    /// Extract only these tables (empty means all)
    pub table_filter: Vec<String>,
    /// Tables to skip
    pub table_exclude: Vec<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            include_tables: true,
            include_views: true,
            include_procedures: true,
            include_functions: true,
            include_triggers: true,
            table_filter: Vec::new(),
            table_exclude: Vec::new(),
        }
    }
}

/// Per-object-class progress callback: (current step, total steps, message)
pub type ExtractProgress<'a> = &'a (dyn Fn(usize, usize, &str) + Send + Sync);
