//! Migration Generator
//!
//! Linearizes a schema diff into an ordered SQL statement sequence that
//! honors MySQL's referential and dependency rules, plus a rendered script
//! text and an optional reverse-order rollback section.

pub mod generator;

pub use generator::MySqlGenerator;

use crate::diff::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Options controlling script synthesis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateOptions {
    pub include_rollback: bool,
    /// Brackets the script in START TRANSACTION / COMMIT. Cosmetic: MySQL
    /// auto-commits DDL, so the bracket provides no atomicity.
    pub wrap_transaction: bool,
    pub add_comments: bool,
    /// Flags destructive statements in the rendered script
    pub safe_mode: bool,
    /// Statement terminator used for routine bodies in the rendered script
    pub delimiter: String,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            include_rollback: false,
            wrap_transaction: false,
            add_comments: true,
            safe_mode: true,
            delimiter: ";".to_string(),
        }
    }
}

/// Catalog object class a statement operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectClass {
    Table,
    Column,
    Index,
    ForeignKey,
    View,
    Procedure,
    Function,
    Trigger,
}

impl ObjectClass {
    /// Routine and trigger bodies contain internal `;` and need
    /// delimiter-switched execution
    pub fn needs_delimiter(&self) -> bool {
        matches!(
            self,
            ObjectClass::Procedure | ObjectClass::Function | ObjectClass::Trigger
        )
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectClass::Table => "TABLE",
            ObjectClass::Column => "COLUMN",
            ObjectClass::Index => "INDEX",
            ObjectClass::ForeignKey => "FOREIGN KEY",
            ObjectClass::View => "VIEW",
            ObjectClass::Procedure => "PROCEDURE",
            ObjectClass::Function => "FUNCTION",
            ObjectClass::Trigger => "TRIGGER",
        };
        f.write_str(s)
    }
}

/// SQL operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Create,
    Alter,
    Drop,
    Add,
    Modify,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Create => "CREATE",
            Operation::Alter => "ALTER",
            Operation::Drop => "DROP",
            Operation::Add => "ADD",
            Operation::Modify => "MODIFY",
        };
        f.write_str(s)
    }
}

/// One statement of the migration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlStatement {
    pub sql: String,
    pub object_class: ObjectClass,
    pub object_name: String,
    pub operation: Operation,
    pub severity: Severity,
    pub comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_sql: Option<String>,
}

/// Ordered migration script plus its rendered text
///
/// The generator builds it as a pure function of the diff: `version` and
/// `generated_at` stay unset until the caller stamps them, and the rendered
/// text carries no timestamp, so identical inputs render identical scripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationScript {
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub version: String,
    pub description: String,
    pub statements: Vec<SqlStatement>,
    pub warnings: Vec<String>,
    pub up_sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

impl MigrationScript {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Stamp the script with its generation time. Done once by the caller,
    /// after the pure build.
    pub fn stamp(&mut self, at: DateTime<Utc>) {
        self.version = at.format("%Y%m%d%H%M%S").to_string();
        self.generated_at = Some(at);
    }
}
