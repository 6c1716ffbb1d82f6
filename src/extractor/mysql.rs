//! MySQL catalog extraction
//!
//! One pass per object class over `information_schema`, with verbatim
//! `SHOW CREATE …` capture for tables and routines. The extractor owns its
//! pool exclusively for its lifetime; callers close it when done.

use crate::connection::Environment;
use crate::error::AppError;
use crate::extractor::schema::*;
use crate::extractor::{ExtractOptions, ExtractProgress};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Schema extractor bound to one MySQL database
pub struct MySqlExtractor {
    pool: MySqlPool,
    database: String,
}

impl MySqlExtractor {
    /// Connect and fix the session character set to utf8mb4 so multibyte
    /// identifiers and comments survive extraction.
    pub async fn connect(env: &Environment) -> Result<Self, AppError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(4)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("SET NAMES utf8mb4 COLLATE utf8mb4_unicode_ci")
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(env.connect_options())
            .await
            .map_err(|e| AppError::Connection(format!("failed to connect to {}: {e}", env.address())))?;

        Ok(Self {
            pool,
            database: env.database.clone(),
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    pub async fn server_version(&self) -> Result<String, AppError> {
        let row = sqlx::query("SELECT VERSION()").fetch_one(&self.pool).await?;
        Ok(row.try_get(0)?)
    }

    /// Extract the complete schema per the given options
    pub async fn extract_schema(&self, options: &ExtractOptions) -> Result<DatabaseSchema, AppError> {
        self.extract_schema_with_progress(options, None).await
    }

    /// Extract with a per-object-class progress callback
    pub async fn extract_schema_with_progress(
        &self,
        options: &ExtractOptions,
        progress: Option<ExtractProgress<'_>>,
    ) -> Result<DatabaseSchema, AppError> {
        let mut schema = DatabaseSchema::new(&self.database);

        let total = [
            options.include_tables,
            options.include_views,
            options.include_procedures,
            options.include_functions,
            options.include_triggers,
        ]
        .iter()
        .filter(|v| **v)
        .count();
        let mut step = 0usize;
        let report = |step: usize, message: &str| {
            if let Some(cb) = progress {
                cb(step, total, message);
            }
        };

        // Database-level defaults
        if let Some(row) = sqlx::query(
            "SELECT DEFAULT_CHARACTER_SET_NAME, DEFAULT_COLLATION_NAME \
             FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?",
        )
        .bind(&self.database)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::catalog("schema", &self.database, e))?
        {
            schema.charset = row.try_get(0)?;
            schema.collation = row.try_get(1)?;
        }

        if options.include_tables {
            step += 1;
            report(step, "extracting tables");
            schema.tables = self.extract_tables(options).await?;
        }
        if options.include_views {
            step += 1;
            report(step, "extracting views");
            schema.views = self.extract_views().await?;
        }
        if options.include_procedures {
            step += 1;
            report(step, "extracting procedures");
            schema.procedures = self.extract_procedures().await?;
        }
        if options.include_functions {
            step += 1;
            report(step, "extracting functions");
            schema.functions = self.extract_functions().await?;
        }
        if options.include_triggers {
            step += 1;
            report(step, "extracting triggers");
            schema.triggers = self.extract_triggers().await?;
        }

        debug!(
            database = %self.database,
            tables = schema.tables.len(),
            views = schema.views.len(),
            procedures = schema.procedures.len(),
            functions = schema.functions.len(),
            triggers = schema.triggers.len(),
            "schema extracted"
        );

        Ok(schema)
    }

    /// Extract all base tables with columns, indexes, foreign keys and their
    /// verbatim CREATE TABLE text
    pub async fn extract_tables(
        &self,
        options: &ExtractOptions,
    ) -> Result<HashMap<String, TableSchema>, AppError> {
        let rows = sqlx::query(
            "SELECT TABLE_NAME, ENGINE, TABLE_COLLATION, TABLE_COMMENT, \
                    CAST(AUTO_INCREMENT AS SIGNED) AS AUTO_INCREMENT \
             FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'",
        )
        .bind(&self.database)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::catalog("table", "*", e))?;

        let mut tables = HashMap::new();
        for row in rows {
            let name: String = row.try_get("TABLE_NAME")?;
            if !table_selected(&name, &options.table_filter, &options.table_exclude) {
                continue;
            }

            let collation: String = row.try_get::<Option<String>, _>("TABLE_COLLATION")?.unwrap_or_default();
            // utf8mb4_unicode_ci -> utf8mb4
            let charset = collation.split('_').next().unwrap_or("").to_string();

            tables.insert(
                name.clone(),
                TableSchema {
                    name,
                    engine: row.try_get::<Option<String>, _>("ENGINE")?.unwrap_or_default(),
                    charset,
                    collation,
                    comment: row.try_get::<Option<String>, _>("TABLE_COMMENT")?.unwrap_or_default(),
                    auto_increment: row.try_get("AUTO_INCREMENT")?,
                    columns: Vec::new(),
                    indexes: HashMap::new(),
                    foreign_keys: HashMap::new(),
                    create_sql: String::new(),
                },
            );
        }

        let names: Vec<String> = tables.keys().cloned().collect();
        for name in names {
            let columns = self.extract_columns(&name).await?;
            let indexes = self.extract_indexes(&name).await?;
            let foreign_keys = self.extract_foreign_keys(&name).await?;
            let create_sql = self.show_create_table(&name).await?;

            let table = tables.get_mut(&name).expect("table present");
            table.columns = columns;
            table.indexes = indexes;
            table.foreign_keys = foreign_keys;
            table.create_sql = create_sql;
        }

        Ok(tables)
    }

    async fn extract_columns(&self, table: &str) -> Result<Vec<ColumnSchema>, AppError> {
        let rows = sqlx::query(
            "SELECT COLUMN_NAME, CAST(ORDINAL_POSITION AS SIGNED) AS ORDINAL_POSITION, \
                    DATA_TYPE, COLUMN_TYPE, IS_NULLABLE, COLUMN_DEFAULT, EXTRA, \
                    CAST(CHARACTER_MAXIMUM_LENGTH AS SIGNED) AS CHARACTER_MAXIMUM_LENGTH, \
                    CAST(NUMERIC_PRECISION AS SIGNED) AS NUMERIC_PRECISION, \
                    CAST(NUMERIC_SCALE AS SIGNED) AS NUMERIC_SCALE, \
                    CHARACTER_SET_NAME, COLLATION_NAME, COLUMN_COMMENT, GENERATION_EXPRESSION \
             FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
             ORDER BY ORDINAL_POSITION",
        )
        .bind(&self.database)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::catalog("column", table, e))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let extra: String = row.try_get::<Option<String>, _>("EXTRA")?.unwrap_or_default();
            let generated_expr: String = row
                .try_get::<Option<String>, _>("GENERATION_EXPRESSION")?
                .unwrap_or_default();
            let nullable: String = row.try_get("IS_NULLABLE")?;

            columns.push(ColumnSchema {
                name: row.try_get("COLUMN_NAME")?,
                position: row.try_get::<i64, _>("ORDINAL_POSITION")? as u32,
                data_type: row.try_get("DATA_TYPE")?,
                column_type: row.try_get("COLUMN_TYPE")?,
                nullable: nullable == "YES",
                default_value: row.try_get("COLUMN_DEFAULT")?,
                auto_increment: extra.to_lowercase().contains("auto_increment"),
                char_max_length: row.try_get("CHARACTER_MAXIMUM_LENGTH")?,
                numeric_precision: row.try_get("NUMERIC_PRECISION")?,
                numeric_scale: row.try_get("NUMERIC_SCALE")?,
                charset: row.try_get::<Option<String>, _>("CHARACTER_SET_NAME")?.unwrap_or_default(),
                collation: row.try_get::<Option<String>, _>("COLLATION_NAME")?.unwrap_or_default(),
                comment: row.try_get::<Option<String>, _>("COLUMN_COMMENT")?.unwrap_or_default(),
                is_generated: !generated_expr.is_empty(),
                generated_expr,
                extra,
            });
        }

        Ok(columns)
    }

    /// Fold STATISTICS rows into index records keyed by INDEX_NAME.
    ///
    /// Classification: name PRIMARY -> primary; NON_UNIQUE = 0 -> unique;
    /// INDEX_TYPE FULLTEXT/SPATIAL -> those kinds; otherwise normal.
    async fn extract_indexes(&self, table: &str) -> Result<HashMap<String, IndexSchema>, AppError> {
        let rows = sqlx::query(
            "SELECT INDEX_NAME, CAST(NON_UNIQUE AS SIGNED) AS NON_UNIQUE, COLUMN_NAME, \
                    CAST(SEQ_IN_INDEX AS SIGNED) AS SEQ_IN_INDEX, \
                    CAST(SUB_PART AS SIGNED) AS SUB_PART, \
                    INDEX_TYPE, INDEX_COMMENT, COLLATION AS SORT_DIR \
             FROM information_schema.STATISTICS \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
             ORDER BY INDEX_NAME, SEQ_IN_INDEX",
        )
        .bind(&self.database)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::catalog("index", table, e))?;

        let mut indexes: HashMap<String, IndexSchema> = HashMap::new();
        for row in rows {
            let name: String = row.try_get("INDEX_NAME")?;
            let non_unique: i64 = row.try_get("NON_UNIQUE")?;
            let access_method: String = row.try_get("INDEX_TYPE")?;

            let index = indexes.entry(name.clone()).or_insert_with(|| {
                let is_primary = name == "PRIMARY";
                let is_unique = non_unique == 0;
                let kind = if is_primary {
                    IndexKind::Primary
                } else if is_unique {
                    IndexKind::Unique
                } else if access_method == "FULLTEXT" {
                    IndexKind::Fulltext
                } else if access_method == "SPATIAL" {
                    IndexKind::Spatial
                } else {
                    IndexKind::Normal
                };
                IndexSchema {
                    name: name.clone(),
                    kind,
                    is_unique,
                    is_primary,
                    access_method,
                    columns: Vec::new(),
                    comment: String::new(),
                }
            });

            index.comment = row.try_get::<Option<String>, _>("INDEX_COMMENT")?.unwrap_or_default();
            index.columns.push(IndexColumn {
                name: row.try_get("COLUMN_NAME")?,
                seq_in_index: row.try_get::<i64, _>("SEQ_IN_INDEX")? as u32,
                sub_part: row.try_get::<Option<i64>, _>("SUB_PART")?.map(|v| v as u32),
                descending: row.try_get::<Option<String>, _>("SORT_DIR")?.as_deref() == Some("D"),
            });
        }

        Ok(indexes)
    }

    async fn extract_foreign_keys(&self, table: &str) -> Result<HashMap<String, ForeignKey>, AppError> {
        let rows = sqlx::query(
            "SELECT kcu.CONSTRAINT_NAME, kcu.COLUMN_NAME, kcu.REFERENCED_TABLE_NAME, \
                    kcu.REFERENCED_COLUMN_NAME, rc.DELETE_RULE, rc.UPDATE_RULE \
             FROM information_schema.KEY_COLUMN_USAGE kcu \
             JOIN information_schema.REFERENTIAL_CONSTRAINTS rc \
               ON kcu.CONSTRAINT_NAME = rc.CONSTRAINT_NAME \
              AND kcu.TABLE_SCHEMA = rc.CONSTRAINT_SCHEMA \
             WHERE kcu.TABLE_SCHEMA = ? AND kcu.TABLE_NAME = ? \
               AND kcu.REFERENCED_TABLE_NAME IS NOT NULL \
             ORDER BY kcu.CONSTRAINT_NAME, kcu.ORDINAL_POSITION",
        )
        .bind(&self.database)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::catalog("foreign key", table, e))?;

        let mut foreign_keys: HashMap<String, ForeignKey> = HashMap::new();
        for row in rows {
            let name: String = row.try_get("CONSTRAINT_NAME")?;
            let fk = foreign_keys.entry(name.clone()).or_insert_with(|| ForeignKey {
                name,
                columns: Vec::new(),
                ref_table: String::new(),
                ref_columns: Vec::new(),
                on_delete: String::new(),
                on_update: String::new(),
            });
            fk.ref_table = row.try_get("REFERENCED_TABLE_NAME")?;
            fk.on_delete = row.try_get("DELETE_RULE")?;
            fk.on_update = row.try_get("UPDATE_RULE")?;
            fk.columns.push(row.try_get("COLUMN_NAME")?);
            fk.ref_columns.push(row.try_get("REFERENCED_COLUMN_NAME")?);
        }

        Ok(foreign_keys)
    }

    async fn show_create_table(&self, table: &str) -> Result<String, AppError> {
        let sql = format!("SHOW CREATE TABLE `{}`", table.replace('`', "``"));
        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::catalog("table", table, e))?;
        // Columns: Table, Create Table
        Ok(row.try_get(1)?)
    }

    pub async fn extract_views(&self) -> Result<HashMap<String, ViewSchema>, AppError> {
        let rows = sqlx::query(
            "SELECT TABLE_NAME, VIEW_DEFINITION, DEFINER, SECURITY_TYPE, CHECK_OPTION \
             FROM information_schema.VIEWS WHERE TABLE_SCHEMA = ?",
        )
        .bind(&self.database)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::catalog("view", "*", e))?;

        let mut views = HashMap::new();
        for row in rows {
            let name: String = row.try_get("TABLE_NAME")?;
            views.insert(
                name.clone(),
                ViewSchema {
                    name,
                    definition: row.try_get::<Option<String>, _>("VIEW_DEFINITION")?.unwrap_or_default(),
                    definer: row.try_get::<Option<String>, _>("DEFINER")?.unwrap_or_default(),
                    security: row.try_get::<Option<String>, _>("SECURITY_TYPE")?.unwrap_or_default(),
                    check_option: row.try_get::<Option<String>, _>("CHECK_OPTION")?.unwrap_or_default(),
                },
            );
        }

        Ok(views)
    }

    pub async fn extract_procedures(&self) -> Result<HashMap<String, ProcedureSchema>, AppError> {
        let rows = sqlx::query(
            "SELECT ROUTINE_NAME, DEFINER, SECURITY_TYPE, SQL_MODE, ROUTINE_COMMENT \
             FROM information_schema.ROUTINES \
             WHERE ROUTINE_SCHEMA = ? AND ROUTINE_TYPE = 'PROCEDURE'",
        )
        .bind(&self.database)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::catalog("procedure", "*", e))?;

        let mut procedures = HashMap::new();
        for row in rows {
            let name: String = row.try_get("ROUTINE_NAME")?;
            procedures.insert(
                name.clone(),
                ProcedureSchema {
                    definition: String::new(),
                    definer: row.try_get::<Option<String>, _>("DEFINER")?.unwrap_or_default(),
                    params: Vec::new(),
                    comment: row.try_get::<Option<String>, _>("ROUTINE_COMMENT")?.unwrap_or_default(),
                    security: row.try_get::<Option<String>, _>("SECURITY_TYPE")?.unwrap_or_default(),
                    sql_mode: row.try_get::<Option<String>, _>("SQL_MODE")?.unwrap_or_default(),
                    name,
                },
            );
        }

        // ROUTINE_DEFINITION omits the CREATE prologue; SHOW CREATE is authoritative
        let names: Vec<String> = procedures.keys().cloned().collect();
        for name in names {
            let proc = procedures.get_mut(&name).expect("procedure present");
            match self.show_create_routine("PROCEDURE", &name).await {
                Ok(sql) => proc.definition = sql,
                Err(e) => warn!("SHOW CREATE PROCEDURE `{}` failed: {}", name, e),
            }
            proc.params = self.extract_routine_params(&name, "PROCEDURE").await?;
        }

        Ok(procedures)
    }

    pub async fn extract_functions(&self) -> Result<HashMap<String, FunctionSchema>, AppError> {
        let rows = sqlx::query(
            "SELECT ROUTINE_NAME, DEFINER, SECURITY_TYPE, SQL_MODE, ROUTINE_COMMENT, \
                    DTD_IDENTIFIER, IS_DETERMINISTIC \
             FROM information_schema.ROUTINES \
             WHERE ROUTINE_SCHEMA = ? AND ROUTINE_TYPE = 'FUNCTION'",
        )
        .bind(&self.database)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::catalog("function", "*", e))?;

        let mut functions = HashMap::new();
        for row in rows {
            let name: String = row.try_get("ROUTINE_NAME")?;
            let deterministic: String = row.try_get::<Option<String>, _>("IS_DETERMINISTIC")?.unwrap_or_default();
            functions.insert(
                name.clone(),
                FunctionSchema {
                    definition: String::new(),
                    definer: row.try_get::<Option<String>, _>("DEFINER")?.unwrap_or_default(),
                    params: Vec::new(),
                    returns: row.try_get::<Option<String>, _>("DTD_IDENTIFIER")?.unwrap_or_default(),
                    comment: row.try_get::<Option<String>, _>("ROUTINE_COMMENT")?.unwrap_or_default(),
                    security: row.try_get::<Option<String>, _>("SECURITY_TYPE")?.unwrap_or_default(),
                    sql_mode: row.try_get::<Option<String>, _>("SQL_MODE")?.unwrap_or_default(),
                    deterministic: deterministic == "YES",
                    name,
                },
            );
        }

        let names: Vec<String> = functions.keys().cloned().collect();
        for name in names {
            let func = functions.get_mut(&name).expect("function present");
            match self.show_create_routine("FUNCTION", &name).await {
                Ok(sql) => func.definition = sql,
                Err(e) => warn!("SHOW CREATE FUNCTION `{}` failed: {}", name, e),
            }
            func.params = self.extract_routine_params(&name, "FUNCTION").await?;
        }

        Ok(functions)
    }

    async fn show_create_routine(&self, routine_type: &str, name: &str) -> Result<String, AppError> {
        let sql = format!(
            "SHOW CREATE {} `{}`",
            routine_type,
            name.replace('`', "``")
        );
        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::catalog(routine_type.to_lowercase(), name, e))?;
        // Columns: name, sql_mode, Create Procedure|Function, charsets...
        // The create column is NULL without SHOW_ROUTINE privilege.
        let create: Option<String> = row.try_get(2)?;
        create.ok_or_else(|| AppError::Catalog {
            object: routine_type.to_lowercase(),
            name: name.to_string(),
            message: "SHOW CREATE returned NULL (missing privilege?)".to_string(),
        })
    }

    /// PARAMETERS position 0 is the function return slot and is skipped.
    async fn extract_routine_params(
        &self,
        name: &str,
        routine_type: &str,
    ) -> Result<Vec<RoutineParam>, AppError> {
        let rows = sqlx::query(
            "SELECT PARAMETER_NAME, PARAMETER_MODE, DTD_IDENTIFIER, \
                    CAST(ORDINAL_POSITION AS SIGNED) AS ORDINAL_POSITION \
             FROM information_schema.PARAMETERS \
             WHERE SPECIFIC_SCHEMA = ? AND SPECIFIC_NAME = ? AND ROUTINE_TYPE = ? \
             ORDER BY ORDINAL_POSITION",
        )
        .bind(&self.database)
        .bind(name)
        .bind(routine_type)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::catalog("parameter", name, e))?;

        let mut params = Vec::new();
        for row in rows {
            let position: i64 = row.try_get("ORDINAL_POSITION")?;
            if position == 0 {
                continue;
            }
            params.push(RoutineParam {
                name: row.try_get::<Option<String>, _>("PARAMETER_NAME")?.unwrap_or_default(),
                mode: row.try_get::<Option<String>, _>("PARAMETER_MODE")?.unwrap_or_default(),
                data_type: row.try_get::<Option<String>, _>("DTD_IDENTIFIER")?.unwrap_or_default(),
                position: position as u32,
            });
        }

        Ok(params)
    }

    pub async fn extract_triggers(&self) -> Result<HashMap<String, TriggerSchema>, AppError> {
        let rows = sqlx::query(
            "SELECT TRIGGER_NAME, EVENT_OBJECT_TABLE, EVENT_MANIPULATION, \
                    ACTION_TIMING, ACTION_STATEMENT, DEFINER, SQL_MODE \
             FROM information_schema.TRIGGERS WHERE TRIGGER_SCHEMA = ?",
        )
        .bind(&self.database)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::catalog("trigger", "*", e))?;

        let mut triggers = HashMap::new();
        for row in rows {
            let name: String = row.try_get("TRIGGER_NAME")?;
            triggers.insert(
                name.clone(),
                TriggerSchema {
                    name,
                    table: row.try_get("EVENT_OBJECT_TABLE")?,
                    event: row.try_get("EVENT_MANIPULATION")?,
                    timing: row.try_get("ACTION_TIMING")?,
                    statement: row.try_get("ACTION_STATEMENT")?,
                    definer: row.try_get::<Option<String>, _>("DEFINER")?.unwrap_or_default(),
                    sql_mode: row.try_get::<Option<String>, _>("SQL_MODE")?.unwrap_or_default(),
                },
            );
        }

        Ok(triggers)
    }
}

fn table_selected(name: &str, filter: &[String], exclude: &[String]) -> bool {
    if exclude.iter().any(|e| e == name) {
        return false;
    }
    filter.is_empty() || filter.iter().any(|f| f == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_selected_with_empty_filter() {
        assert!(table_selected("users", &[], &[]));
    }

    #[test]
    fn test_table_selected_respects_filter() {
        let filter = vec!["users".to_string()];
        assert!(table_selected("users", &filter, &[]));
        assert!(!table_selected("orders", &filter, &[]));
    }

    #[test]
    fn test_table_selected_exclude_wins() {
        let filter = vec!["users".to_string()];
        let exclude = vec!["users".to_string()];
        assert!(!table_selected("users", &filter, &exclude));
    }
}
