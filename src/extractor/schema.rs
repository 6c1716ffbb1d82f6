//! Typed MySQL catalog records
//!
//! A faithful materialization of one database's structural catalog. All
//! records are immutable value types produced by the extractor and handed
//! down the pipeline unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Complete snapshot of one MySQL schema at extraction time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSchema {
    pub database: String,
    pub charset: String,
    pub collation: String,
    pub tables: HashMap<String, TableSchema>,
    pub views: HashMap<String, ViewSchema>,
    pub procedures: HashMap<String, ProcedureSchema>,
    pub functions: HashMap<String, FunctionSchema>,
    pub triggers: HashMap<String, TriggerSchema>,
    pub extracted_at: DateTime<Utc>,
}

impl DatabaseSchema {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            charset: String::new(),
            collation: String::new(),
            tables: HashMap::new(),
            views: HashMap::new(),
            procedures: HashMap::new(),
            functions: HashMap::new(),
            triggers: HashMap::new(),
            extracted_at: Utc::now(),
        }
    }

    /// Compute a structural checksum, insensitive to extraction time.
    ///
    /// Cheap "did anything change" probe before running a full diff. Content
    /// is hashed in sorted order so two extractions of the same structure
    /// always agree.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();

        let mut table_names: Vec<&String> = self.tables.keys().collect();
        table_names.sort();

        for name in &table_names {
            hasher.update(name.as_bytes());
            let table = &self.tables[*name];
            for col in &table.columns {
                hasher.update(format!("{}.{}:{}", name, col.name, col.column_type).as_bytes());
            }
            let mut fk_names: Vec<&String> = table.foreign_keys.keys().collect();
            fk_names.sort();
            for fk in fk_names {
                hasher.update(format!("FK:{}->{}", fk, table.foreign_keys[fk].ref_table).as_bytes());
            }
        }

        let mut view_names: Vec<&String> = self.views.keys().collect();
        view_names.sort();
        for name in view_names {
            hasher.update(format!("V:{}", name).as_bytes());
        }

        format!("{:x}", hasher.finalize())
    }

    /// Object counts per class
    pub fn statistics(&self) -> HashMap<&'static str, usize> {
        HashMap::from([
            ("tables", self.tables.len()),
            ("views", self.views.len()),
            ("procedures", self.procedures.len()),
            ("functions", self.functions.len()),
            ("triggers", self.triggers.len()),
        ])
    }
}

/// Table structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub name: String,
    pub engine: String,
    pub charset: String,
    pub collation: String,
    pub comment: String,
    pub auto_increment: Option<i64>,
    /// Ordered by ordinal position
    pub columns: Vec<ColumnSchema>,
    pub indexes: HashMap<String, IndexSchema>,
    pub foreign_keys: HashMap<String, ForeignKey>,
    /// Verbatim `SHOW CREATE TABLE` text, used to bootstrap the sandbox
    pub create_sql: String,
}

/// Column structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    pub name: String,
    /// 1-based ordinal position
    pub position: u32,
    /// Reduced type, e.g. `varchar`
    pub data_type: String,
    /// Full type, e.g. `varchar(255) unsigned`
    pub column_type: String,
    pub nullable: bool,
    /// `None` means no default; `Some("NULL")` is an explicit NULL default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub auto_increment: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_max_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_precision: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_scale: Option<i64>,
    pub charset: String,
    pub collation: String,
    pub comment: String,
    /// Carries `on update CURRENT_TIMESTAMP` and similar
    pub extra: String,
    pub generated_expr: String,
    pub is_generated: bool,
}

/// Index kind classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Primary,
    Unique,
    Normal,
    Fulltext,
    Spatial,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Primary => "PRIMARY",
            IndexKind::Unique => "UNIQUE",
            IndexKind::Normal => "INDEX",
            IndexKind::Fulltext => "FULLTEXT",
            IndexKind::Spatial => "SPATIAL",
        }
    }
}

/// Index structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSchema {
    pub name: String,
    pub kind: IndexKind,
    pub is_unique: bool,
    pub is_primary: bool,
    /// Access method reported by the server: BTREE, HASH, FULLTEXT
    pub access_method: String,
    /// Ordered by sequence-in-index
    pub columns: Vec<IndexColumn>,
    pub comment: String,
}

/// One column participating in an index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexColumn {
    pub name: String,
    pub seq_in_index: u32,
    /// Prefix index length
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_part: Option<u32>,
    /// Descending key part (MySQL 8.0+)
    pub descending: bool,
}

/// Foreign key structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
    /// CASCADE, SET NULL, RESTRICT, NO ACTION
    pub on_delete: String,
    pub on_update: String,
}

/// View structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSchema {
    pub name: String,
    pub definition: String,
    pub definer: String,
    /// DEFINER or INVOKER
    pub security: String,
    pub check_option: String,
}

/// Stored procedure structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureSchema {
    pub name: String,
    /// Verbatim `SHOW CREATE PROCEDURE` text
    pub definition: String,
    pub definer: String,
    pub params: Vec<RoutineParam>,
    pub comment: String,
    pub security: String,
    pub sql_mode: String,
}

/// Routine parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineParam {
    pub name: String,
    /// IN, OUT, INOUT
    pub mode: String,
    pub data_type: String,
    pub position: u32,
}

/// Stored function structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSchema {
    pub name: String,
    /// Verbatim `SHOW CREATE FUNCTION` text
    pub definition: String,
    pub definer: String,
    pub params: Vec<RoutineParam>,
    pub returns: String,
    pub comment: String,
    pub security: String,
    pub sql_mode: String,
    pub deterministic: bool,
}

/// Trigger structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSchema {
    pub name: String,
    pub table: String,
    /// INSERT, UPDATE, DELETE
    pub event: String,
    /// BEFORE, AFTER
    pub timing: String,
    pub statement: String,
    pub definer: String,
    pub sql_mode: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> TableSchema {
        TableSchema {
            name: "users".to_string(),
            engine: "InnoDB".to_string(),
            charset: "utf8mb4".to_string(),
            collation: "utf8mb4_unicode_ci".to_string(),
            comment: String::new(),
            auto_increment: Some(1),
            columns: vec![ColumnSchema {
                name: "id".to_string(),
                position: 1,
                data_type: "bigint".to_string(),
                column_type: "bigint".to_string(),
                nullable: false,
                default_value: None,
                auto_increment: true,
                char_max_length: None,
                numeric_precision: Some(19),
                numeric_scale: Some(0),
                charset: String::new(),
                collation: String::new(),
                comment: String::new(),
                extra: "auto_increment".to_string(),
                generated_expr: String::new(),
                is_generated: false,
            }],
            indexes: HashMap::new(),
            foreign_keys: HashMap::new(),
            create_sql: String::new(),
        }
    }

    #[test]
    fn test_checksum_is_deterministic() {
        let mut schema = DatabaseSchema::new("app");
        schema.tables.insert("users".to_string(), sample_table());

        let first = schema.checksum();
        let second = schema.checksum();
        assert_eq!(first, second);
    }

    #[test]
    fn test_checksum_ignores_extraction_time() {
        let mut a = DatabaseSchema::new("app");
        a.tables.insert("users".to_string(), sample_table());
        let mut b = a.clone();
        b.extracted_at = Utc::now();

        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_checksum_changes_with_column_type() {
        let mut a = DatabaseSchema::new("app");
        a.tables.insert("users".to_string(), sample_table());
        let mut b = a.clone();
        b.tables.get_mut("users").unwrap().columns[0].column_type = "int".to_string();

        assert_ne!(a.checksum(), b.checksum());
    }
}
