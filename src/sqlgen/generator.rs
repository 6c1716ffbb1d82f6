//! MySQL migration synthesis
//!
//! Statements are collected per phase and concatenated in a fixed total
//! order: foreign keys, triggers, views, procedures and functions are
//! dropped first, then tables are dropped and altered, new tables created,
//! indexes and foreign keys rebuilt, and routines, views and triggers
//! recreated last. Modified routines and triggers are drop-then-recreate
//! (MySQL has no REPLACE PROCEDURE); modified views use CREATE OR REPLACE.

use crate::diff::{
    ColumnDiff, DiffKind, ForeignKeyDiff, IndexDiff, PropertyDiff, SchemaDiff, Severity, TableDiff,
};
use crate::error::AppError;
use crate::extractor::{ColumnSchema, ForeignKey, IndexKind, IndexSchema, TriggerSchema};
use crate::sqlgen::{GenerateOptions, MigrationScript, ObjectClass, Operation, SqlStatement};

/// Statement buckets matching the generation phase order
#[derive(Default)]
struct Phases {
    drop_fks: Vec<SqlStatement>,
    drop_triggers: Vec<SqlStatement>,
    drop_views: Vec<SqlStatement>,
    drop_procs: Vec<SqlStatement>,
    drop_funcs: Vec<SqlStatement>,
    drop_tables: Vec<SqlStatement>,
    alter_tables: Vec<SqlStatement>,
    create_tables: Vec<SqlStatement>,
    create_indexes: Vec<SqlStatement>,
    create_fks: Vec<SqlStatement>,
    create_funcs: Vec<SqlStatement>,
    create_procs: Vec<SqlStatement>,
    create_views: Vec<SqlStatement>,
    create_triggers: Vec<SqlStatement>,
}

impl Phases {
    fn into_ordered(self) -> Vec<SqlStatement> {
        let mut all = Vec::new();
        all.extend(self.drop_fks);
        all.extend(self.drop_triggers);
        all.extend(self.drop_views);
        all.extend(self.drop_procs);
        all.extend(self.drop_funcs);
        all.extend(self.drop_tables);
        all.extend(self.alter_tables);
        all.extend(self.create_tables);
        all.extend(self.create_indexes);
        all.extend(self.create_fks);
        all.extend(self.create_funcs);
        all.extend(self.create_procs);
        all.extend(self.create_views);
        all.extend(self.create_triggers);
        all
    }
}

/// MySQL migration script generator. Pure function of the diff; never fails
/// on a well-formed input.
pub struct MySqlGenerator;

impl MySqlGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(
        &self,
        diff: &SchemaDiff,
        options: &GenerateOptions,
    ) -> Result<MigrationScript, AppError> {
        let mut phases = Phases::default();
        let mut warnings = Vec::new();

        for td in &diff.table_diffs {
            self.collect_table(td, &mut phases, &mut warnings)?;
        }
        self.collect_views(diff, &mut phases);
        self.collect_procedures(diff, &mut phases);
        self.collect_functions(diff, &mut phases);
        self.collect_triggers(diff, &mut phases);

        let statements = phases.into_ordered();

        let up_sql = render(&statements, options);
        let down_sql = options
            .include_rollback
            .then(|| render_rollback(&statements));

        Ok(MigrationScript {
            version: String::new(),
            description: format!(
                "migrate `{}` to match `{}`",
                diff.target_database, diff.source_database
            ),
            statements,
            warnings,
            up_sql,
            down_sql,
            generated_at: None,
        })
    }

    fn collect_table(
        &self,
        td: &TableDiff,
        phases: &mut Phases,
        warnings: &mut Vec<String>,
    ) -> Result<(), AppError> {
        match td.kind {
            DiffKind::Added => {
                let table = td
                    .new_table
                    .as_ref()
                    .filter(|t| !t.create_sql.is_empty())
                    .ok_or_else(|| {
                        AppError::Generation(format!(
                            "added table `{}` carries no CREATE TABLE text",
                            td.table_name
                        ))
                    })?;
                phases.create_tables.push(SqlStatement {
                    sql: format!("{};", table.create_sql),
                    object_class: ObjectClass::Table,
                    object_name: td.table_name.clone(),
                    operation: Operation::Create,
                    severity: Severity::Info,
                    comment: format!("create table `{}`", td.table_name),
                    rollback_sql: Some(format!(
                        "DROP TABLE IF EXISTS {};",
                        quote_ident(&td.table_name)
                    )),
                });
            }

            DiffKind::Removed => {
                // The table's own foreign keys must go first or MySQL may
                // refuse the drop while siblings still reference it.
                if let Some(table) = &td.old_table {
                    let mut fk_names: Vec<&String> = table.foreign_keys.keys().collect();
                    fk_names.sort();
                    for fk_name in fk_names {
                        phases.drop_fks.push(drop_foreign_key_statement(
                            &td.table_name,
                            fk_name,
                            table.foreign_keys.get(fk_name),
                            "drop foreign key before dropping the table",
                        ));
                    }
                }

                phases.drop_tables.push(SqlStatement {
                    sql: format!("DROP TABLE IF EXISTS {};", quote_ident(&td.table_name)),
                    object_class: ObjectClass::Table,
                    object_name: td.table_name.clone(),
                    operation: Operation::Drop,
                    severity: Severity::Danger,
                    comment: format!("drop table `{}` - data will be lost", td.table_name),
                    rollback_sql: None,
                });
                warnings.push(format!(
                    "dropping table `{}` permanently deletes all of its rows",
                    td.table_name
                ));
            }

            DiffKind::Modified => {
                for fkd in &td.fkey_diffs {
                    self.collect_foreign_key(&td.table_name, fkd, phases);
                }
                for id in &td.index_diffs {
                    self.collect_index(&td.table_name, id, phases);
                }
                for cd in &td.column_diffs {
                    self.collect_column(&td.table_name, cd, phases, warnings);
                }
                for prop in &td.table_props {
                    if let Some(stmt) = table_property_statement(&td.table_name, prop) {
                        phases.alter_tables.push(stmt);
                    }
                }
            }
        }

        Ok(())
    }

    fn collect_column(
        &self,
        table: &str,
        cd: &ColumnDiff,
        phases: &mut Phases,
        warnings: &mut Vec<String>,
    ) {
        match cd.kind {
            DiffKind::Added => {
                if let Some(col) = &cd.new_column {
                    phases.alter_tables.push(SqlStatement {
                        sql: column_ddl(table, "ADD COLUMN", col),
                        object_class: ObjectClass::Column,
                        object_name: format!("{}.{}", table, cd.column_name),
                        operation: Operation::Add,
                        severity: Severity::Info,
                        comment: format!("add column `{}`", cd.column_name),
                        rollback_sql: Some(format!(
                            "ALTER TABLE {} DROP COLUMN {};",
                            quote_ident(table),
                            quote_ident(&cd.column_name)
                        )),
                    });
                }
            }
            DiffKind::Removed => {
                phases.alter_tables.push(SqlStatement {
                    sql: format!(
                        "ALTER TABLE {} DROP COLUMN {};",
                        quote_ident(table),
                        quote_ident(&cd.column_name)
                    ),
                    object_class: ObjectClass::Column,
                    object_name: format!("{}.{}", table, cd.column_name),
                    operation: Operation::Drop,
                    severity: Severity::Danger,
                    comment: format!("drop column `{}` - data will be lost", cd.column_name),
                    rollback_sql: None,
                });
                warnings.push(format!(
                    "dropping column `{}`.`{}` discards its data",
                    table, cd.column_name
                ));
            }
            DiffKind::Modified => {
                // MODIFY, never CHANGE: rename detection is out of scope and
                // a renamed column arrives here as a drop plus an add.
                if let Some(col) = &cd.new_column {
                    phases.alter_tables.push(SqlStatement {
                        sql: column_ddl(table, "MODIFY COLUMN", col),
                        object_class: ObjectClass::Column,
                        object_name: format!("{}.{}", table, cd.column_name),
                        operation: Operation::Modify,
                        severity: cd.severity,
                        comment: format!("modify column `{}`", cd.column_name),
                        rollback_sql: cd
                            .old_column
                            .as_ref()
                            .map(|old| column_ddl(table, "MODIFY COLUMN", old)),
                    });
                }
            }
        }
    }

    fn collect_index(&self, table: &str, id: &IndexDiff, phases: &mut Phases) {
        let drop_stmt = |idx: &IndexSchema, comment: String| SqlStatement {
            sql: if idx.is_primary {
                format!("ALTER TABLE {} DROP PRIMARY KEY;", quote_ident(table))
            } else {
                format!(
                    "ALTER TABLE {} DROP INDEX {};",
                    quote_ident(table),
                    quote_ident(&idx.name)
                )
            },
            object_class: ObjectClass::Index,
            object_name: format!("{}.{}", table, idx.name),
            operation: Operation::Drop,
            severity: if idx.is_primary || idx.is_unique {
                Severity::Danger
            } else {
                Severity::Warning
            },
            comment,
            rollback_sql: Some(add_index_sql(table, idx)),
        };

        match id.kind {
            DiffKind::Added => {
                if let Some(idx) = &id.new_index {
                    phases.create_indexes.push(SqlStatement {
                        sql: add_index_sql(table, idx),
                        object_class: ObjectClass::Index,
                        object_name: format!("{}.{}", table, idx.name),
                        operation: Operation::Create,
                        severity: Severity::Info,
                        comment: format!("create index `{}`", idx.name),
                        rollback_sql: Some(drop_index_sql(table, idx)),
                    });
                }
            }
            DiffKind::Removed => {
                if let Some(idx) = &id.old_index {
                    phases
                        .alter_tables
                        .push(drop_stmt(idx, format!("drop index `{}`", idx.name)));
                }
            }
            DiffKind::Modified => {
                if let Some(idx) = &id.old_index {
                    phases.alter_tables.push(drop_stmt(
                        idx,
                        format!("drop index `{}` (rebuilt below)", idx.name),
                    ));
                }
                if let Some(idx) = &id.new_index {
                    phases.create_indexes.push(SqlStatement {
                        sql: add_index_sql(table, idx),
                        object_class: ObjectClass::Index,
                        object_name: format!("{}.{}", table, idx.name),
                        operation: Operation::Create,
                        severity: Severity::Warning,
                        comment: format!("rebuild index `{}`", idx.name),
                        rollback_sql: Some(drop_index_sql(table, idx)),
                    });
                }
            }
        }
    }

    fn collect_foreign_key(&self, table: &str, fkd: &ForeignKeyDiff, phases: &mut Phases) {
        match fkd.kind {
            DiffKind::Added => {
                if let Some(fk) = &fkd.new_fkey {
                    phases.create_fks.push(add_foreign_key_statement(table, fk));
                }
            }
            DiffKind::Removed => {
                phases.drop_fks.push(drop_foreign_key_statement(
                    table,
                    &fkd.fkey_name,
                    fkd.old_fkey.as_ref(),
                    "drop foreign key",
                ));
            }
            DiffKind::Modified => {
                phases.drop_fks.push(drop_foreign_key_statement(
                    table,
                    &fkd.fkey_name,
                    fkd.old_fkey.as_ref(),
                    "drop foreign key (rebuilt below)",
                ));
                if let Some(fk) = &fkd.new_fkey {
                    phases.create_fks.push(add_foreign_key_statement(table, fk));
                }
            }
        }
    }

    fn collect_views(&self, diff: &SchemaDiff, phases: &mut Phases) {
        for vd in &diff.view_diffs {
            match vd.kind {
                DiffKind::Added => {
                    if let Some(view) = &vd.new_view {
                        phases.create_views.push(SqlStatement {
                            sql: format!(
                                "CREATE VIEW {} AS {};",
                                quote_ident(&vd.view_name),
                                view.definition
                            ),
                            object_class: ObjectClass::View,
                            object_name: vd.view_name.clone(),
                            operation: Operation::Create,
                            severity: Severity::Info,
                            comment: format!("create view `{}`", vd.view_name),
                            rollback_sql: Some(format!(
                                "DROP VIEW IF EXISTS {};",
                                quote_ident(&vd.view_name)
                            )),
                        });
                    }
                }
                DiffKind::Removed => {
                    phases.drop_views.push(SqlStatement {
                        sql: format!("DROP VIEW IF EXISTS {};", quote_ident(&vd.view_name)),
                        object_class: ObjectClass::View,
                        object_name: vd.view_name.clone(),
                        operation: Operation::Drop,
                        severity: Severity::Warning,
                        comment: format!("drop view `{}`", vd.view_name),
                        rollback_sql: vd.old_view.as_ref().map(|v| {
                            format!("CREATE VIEW {} AS {};", quote_ident(&vd.view_name), v.definition)
                        }),
                    });
                }
                DiffKind::Modified => {
                    if let Some(view) = &vd.new_view {
                        phases.create_views.push(SqlStatement {
                            sql: format!(
                                "CREATE OR REPLACE VIEW {} AS {};",
                                quote_ident(&vd.view_name),
                                view.definition
                            ),
                            object_class: ObjectClass::View,
                            object_name: vd.view_name.clone(),
                            operation: Operation::Alter,
                            severity: Severity::Warning,
                            comment: format!("replace view `{}`", vd.view_name),
                            rollback_sql: vd.old_view.as_ref().map(|v| {
                                format!(
                                    "CREATE OR REPLACE VIEW {} AS {};",
                                    quote_ident(&vd.view_name),
                                    v.definition
                                )
                            }),
                        });
                    }
                }
            }
        }
    }

    fn collect_procedures(&self, diff: &SchemaDiff, phases: &mut Phases) {
        for pd in &diff.proc_diffs {
            let drop_sql = format!("DROP PROCEDURE IF EXISTS {};", quote_ident(&pd.proc_name));
            match pd.kind {
                DiffKind::Added => {
                    if let Some(proc) = &pd.new_proc {
                        if !proc.definition.is_empty() {
                            phases.create_procs.push(SqlStatement {
                                sql: format!("{};", proc.definition),
                                object_class: ObjectClass::Procedure,
                                object_name: pd.proc_name.clone(),
                                operation: Operation::Create,
                                severity: Severity::Info,
                                comment: format!("create procedure `{}`", pd.proc_name),
                                rollback_sql: Some(drop_sql.clone()),
                            });
                        }
                    }
                }
                DiffKind::Removed => {
                    phases.drop_procs.push(SqlStatement {
                        sql: drop_sql,
                        object_class: ObjectClass::Procedure,
                        object_name: pd.proc_name.clone(),
                        operation: Operation::Drop,
                        severity: Severity::Warning,
                        comment: format!("drop procedure `{}`", pd.proc_name),
                        rollback_sql: pd
                            .old_proc
                            .as_ref()
                            .filter(|p| !p.definition.is_empty())
                            .map(|p| format!("{};", p.definition)),
                    });
                }
                DiffKind::Modified => {
                    // No REPLACE PROCEDURE in MySQL: drop early, recreate late
                    phases.drop_procs.push(SqlStatement {
                        sql: drop_sql.clone(),
                        object_class: ObjectClass::Procedure,
                        object_name: pd.proc_name.clone(),
                        operation: Operation::Drop,
                        severity: Severity::Warning,
                        comment: format!("drop procedure `{}` (rebuilt below)", pd.proc_name),
                        rollback_sql: pd
                            .old_proc
                            .as_ref()
                            .filter(|p| !p.definition.is_empty())
                            .map(|p| format!("{};", p.definition)),
                    });
                    if let Some(proc) = &pd.new_proc {
                        if !proc.definition.is_empty() {
                            phases.create_procs.push(SqlStatement {
                                sql: format!("{};", proc.definition),
                                object_class: ObjectClass::Procedure,
                                object_name: pd.proc_name.clone(),
                                operation: Operation::Create,
                                severity: Severity::Warning,
                                comment: format!("recreate procedure `{}`", pd.proc_name),
                                rollback_sql: Some(drop_sql),
                            });
                        }
                    }
                }
            }
        }
    }

    fn collect_functions(&self, diff: &SchemaDiff, phases: &mut Phases) {
        for fd in &diff.func_diffs {
            let drop_sql = format!("DROP FUNCTION IF EXISTS {};", quote_ident(&fd.func_name));
            match fd.kind {
                DiffKind::Added => {
                    if let Some(func) = &fd.new_func {
                        if !func.definition.is_empty() {
                            phases.create_funcs.push(SqlStatement {
                                sql: format!("{};", func.definition),
                                object_class: ObjectClass::Function,
                                object_name: fd.func_name.clone(),
                                operation: Operation::Create,
                                severity: Severity::Info,
                                comment: format!("create function `{}`", fd.func_name),
                                rollback_sql: Some(drop_sql.clone()),
                            });
                        }
                    }
                }
                DiffKind::Removed => {
                    phases.drop_funcs.push(SqlStatement {
                        sql: drop_sql,
                        object_class: ObjectClass::Function,
                        object_name: fd.func_name.clone(),
                        operation: Operation::Drop,
                        severity: Severity::Warning,
                        comment: format!("drop function `{}`", fd.func_name),
                        rollback_sql: fd
                            .old_func
                            .as_ref()
                            .filter(|f| !f.definition.is_empty())
                            .map(|f| format!("{};", f.definition)),
                    });
                }
                DiffKind::Modified => {
                    phases.drop_funcs.push(SqlStatement {
                        sql: drop_sql.clone(),
                        object_class: ObjectClass::Function,
                        object_name: fd.func_name.clone(),
                        operation: Operation::Drop,
                        severity: Severity::Warning,
                        comment: format!("drop function `{}` (rebuilt below)", fd.func_name),
                        rollback_sql: fd
                            .old_func
                            .as_ref()
                            .filter(|f| !f.definition.is_empty())
                            .map(|f| format!("{};", f.definition)),
                    });
                    if let Some(func) = &fd.new_func {
                        if !func.definition.is_empty() {
                            phases.create_funcs.push(SqlStatement {
                                sql: format!("{};", func.definition),
                                object_class: ObjectClass::Function,
                                object_name: fd.func_name.clone(),
                                operation: Operation::Create,
                                severity: Severity::Warning,
                                comment: format!("recreate function `{}`", fd.func_name),
                                rollback_sql: Some(drop_sql),
                            });
                        }
                    }
                }
            }
        }
    }

    fn collect_triggers(&self, diff: &SchemaDiff, phases: &mut Phases) {
        for td in &diff.trigger_diffs {
            let drop_sql = format!("DROP TRIGGER IF EXISTS {};", quote_ident(&td.trigger_name));
            match td.kind {
                DiffKind::Added => {
                    if let Some(trigger) = &td.new_trigger {
                        phases.create_triggers.push(SqlStatement {
                            sql: create_trigger_sql(trigger),
                            object_class: ObjectClass::Trigger,
                            object_name: td.trigger_name.clone(),
                            operation: Operation::Create,
                            severity: Severity::Info,
                            comment: format!("create trigger `{}`", td.trigger_name),
                            rollback_sql: Some(drop_sql.clone()),
                        });
                    }
                }
                DiffKind::Removed => {
                    phases.drop_triggers.push(SqlStatement {
                        sql: drop_sql,
                        object_class: ObjectClass::Trigger,
                        object_name: td.trigger_name.clone(),
                        operation: Operation::Drop,
                        severity: Severity::Warning,
                        comment: format!("drop trigger `{}`", td.trigger_name),
                        rollback_sql: td.old_trigger.as_ref().map(create_trigger_sql),
                    });
                }
                DiffKind::Modified => {
                    phases.drop_triggers.push(SqlStatement {
                        sql: drop_sql.clone(),
                        object_class: ObjectClass::Trigger,
                        object_name: td.trigger_name.clone(),
                        operation: Operation::Drop,
                        severity: Severity::Warning,
                        comment: format!("drop trigger `{}` (rebuilt below)", td.trigger_name),
                        rollback_sql: td.old_trigger.as_ref().map(create_trigger_sql),
                    });
                    if let Some(trigger) = &td.new_trigger {
                        phases.create_triggers.push(SqlStatement {
                            sql: create_trigger_sql(trigger),
                            object_class: ObjectClass::Trigger,
                            object_name: td.trigger_name.clone(),
                            operation: Operation::Create,
                            severity: Severity::Warning,
                            comment: format!("recreate trigger `{}`", td.trigger_name),
                            rollback_sql: Some(drop_sql),
                        });
                    }
                }
            }
        }
    }
}

impl Default for MySqlGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Backtick-quote an identifier, doubling embedded backticks
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Numeric defaults, CURRENT_TIMESTAMP and NULL are emitted bare; everything
/// else is single-quoted.
fn format_default(value: &str, data_type: &str) -> String {
    let upper = value.to_uppercase();
    if upper == "NULL" || upper.starts_with("CURRENT_TIMESTAMP") {
        return value.to_string();
    }

    let lower = data_type.to_lowercase();
    if lower.contains("int")
        || lower.contains("decimal")
        || lower.contains("float")
        || lower.contains("double")
    {
        return value.to_string();
    }

    format!("'{}'", escape_string(value))
}

fn column_ddl(table: &str, verb: &str, col: &ColumnSchema) -> String {
    let mut parts = vec![
        format!("ALTER TABLE {} {} {}", quote_ident(table), verb, quote_ident(&col.name)),
        col.column_type.clone(),
    ];

    if col.nullable {
        parts.push("NULL".to_string());
    } else {
        parts.push("NOT NULL".to_string());
    }

    if let Some(default) = &col.default_value {
        parts.push(format!("DEFAULT {}", format_default(default, &col.data_type)));
    }

    if col.auto_increment {
        parts.push("AUTO_INCREMENT".to_string());
    }

    if !col.comment.is_empty() {
        parts.push(format!("COMMENT '{}'", escape_string(&col.comment)));
    }

    format!("{};", parts.join(" "))
}

fn index_column_list(idx: &IndexSchema) -> String {
    idx.columns
        .iter()
        .map(|col| {
            let mut def = quote_ident(&col.name);
            if let Some(len) = col.sub_part {
                def.push_str(&format!("({len})"));
            }
            def
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn add_index_sql(table: &str, idx: &IndexSchema) -> String {
    let columns = index_column_list(idx);
    if idx.is_primary {
        return format!("ALTER TABLE {} ADD PRIMARY KEY ({});", quote_ident(table), columns);
    }

    let keyword = match idx.kind {
        IndexKind::Unique => "UNIQUE INDEX",
        IndexKind::Fulltext => "FULLTEXT INDEX",
        IndexKind::Spatial => "SPATIAL INDEX",
        _ => "INDEX",
    };

    format!(
        "ALTER TABLE {} ADD {} {} ({});",
        quote_ident(table),
        keyword,
        quote_ident(&idx.name),
        columns
    )
}

fn drop_index_sql(table: &str, idx: &IndexSchema) -> String {
    if idx.is_primary {
        format!("ALTER TABLE {} DROP PRIMARY KEY;", quote_ident(table))
    } else {
        format!(
            "ALTER TABLE {} DROP INDEX {};",
            quote_ident(table),
            quote_ident(&idx.name)
        )
    }
}

fn add_foreign_key_sql(table: &str, fk: &ForeignKey) -> String {
    let columns: Vec<String> = fk.columns.iter().map(|c| quote_ident(c)).collect();
    let ref_columns: Vec<String> = fk.ref_columns.iter().map(|c| quote_ident(c)).collect();

    let mut sql = format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        quote_ident(table),
        quote_ident(&fk.name),
        columns.join(", "),
        quote_ident(&fk.ref_table),
        ref_columns.join(", ")
    );

    // RESTRICT is the implicit default and is left off
    if !fk.on_delete.is_empty() && fk.on_delete != "RESTRICT" {
        sql.push_str(&format!(" ON DELETE {}", fk.on_delete));
    }
    if !fk.on_update.is_empty() && fk.on_update != "RESTRICT" {
        sql.push_str(&format!(" ON UPDATE {}", fk.on_update));
    }
    sql.push(';');
    sql
}

fn add_foreign_key_statement(table: &str, fk: &ForeignKey) -> SqlStatement {
    SqlStatement {
        sql: add_foreign_key_sql(table, fk),
        object_class: ObjectClass::ForeignKey,
        object_name: format!("{}.{}", table, fk.name),
        operation: Operation::Add,
        severity: Severity::Warning,
        comment: format!("add foreign key `{}`", fk.name),
        rollback_sql: Some(format!(
            "ALTER TABLE {} DROP FOREIGN KEY {};",
            quote_ident(table),
            quote_ident(&fk.name)
        )),
    }
}

fn drop_foreign_key_statement(
    table: &str,
    fk_name: &str,
    old_fkey: Option<&ForeignKey>,
    comment: &str,
) -> SqlStatement {
    SqlStatement {
        sql: format!(
            "ALTER TABLE {} DROP FOREIGN KEY {};",
            quote_ident(table),
            quote_ident(fk_name)
        ),
        object_class: ObjectClass::ForeignKey,
        object_name: format!("{}.{}", table, fk_name),
        operation: Operation::Drop,
        severity: Severity::Warning,
        comment: comment.to_string(),
        rollback_sql: old_fkey.map(|fk| add_foreign_key_sql(table, fk)),
    }
}

fn create_trigger_sql(trigger: &TriggerSchema) -> String {
    format!(
        "CREATE TRIGGER {} {} {} ON {} FOR EACH ROW {};",
        quote_ident(&trigger.name),
        trigger.timing,
        trigger.event,
        quote_ident(&trigger.table),
        trigger.statement
    )
}

/// A COLLATION-only change is suppressed here: collation folds into the
/// CONVERT TO CHARACTER SET emitted for a CHARSET change.
fn table_property_statement(table: &str, prop: &PropertyDiff) -> Option<SqlStatement> {
    let sql = match prop.property.as_str() {
        "ENGINE" => format!("ALTER TABLE {} ENGINE = {};", quote_ident(table), prop.new_value),
        "CHARSET" => format!(
            "ALTER TABLE {} CONVERT TO CHARACTER SET {};",
            quote_ident(table),
            prop.new_value
        ),
        "COMMENT" => format!(
            "ALTER TABLE {} COMMENT = '{}';",
            quote_ident(table),
            escape_string(&prop.new_value)
        ),
        "AUTO_INCREMENT" if !prop.new_value.is_empty() => format!(
            "ALTER TABLE {} AUTO_INCREMENT = {};",
            quote_ident(table),
            prop.new_value
        ),
        _ => return None,
    };

    Some(SqlStatement {
        sql,
        object_class: ObjectClass::Table,
        object_name: table.to_string(),
        operation: Operation::Alter,
        severity: Severity::Info,
        comment: format!("change table property {}", prop.property),
        rollback_sql: None,
    })
}

/// Render the full script text: header comments, optional transaction
/// bracket, statements separated by blank lines. Routine bodies get
/// DELIMITER directives when a non-default delimiter is configured.
fn render(statements: &[SqlStatement], options: &GenerateOptions) -> String {
    let mut out = String::new();

    if options.add_comments {
        out.push_str("-- ============================================\n");
        out.push_str("-- schemaforge migration script\n");
        out.push_str(&format!("-- statements: {}\n", statements.len()));
        out.push_str("-- ============================================\n\n");
    }

    if options.wrap_transaction {
        out.push_str("START TRANSACTION;\n\n");
    }

    let total = statements.len();
    for (i, stmt) in statements.iter().enumerate() {
        if options.add_comments && !stmt.comment.is_empty() {
            out.push_str(&format!("-- [{}/{}] {}\n", i + 1, total, stmt.comment));
        }
        if options.safe_mode && stmt.severity == Severity::Danger {
            out.push_str("-- WARNING: destructive statement\n");
        }

        let use_delimiter = options.delimiter != ";"
            && stmt.object_class.needs_delimiter()
            && stmt.operation != Operation::Drop;
        if use_delimiter {
            let body = stmt.sql.trim_end().trim_end_matches(';');
            out.push_str(&format!("DELIMITER {}\n", options.delimiter));
            out.push_str(body);
            out.push_str(&options.delimiter);
            out.push_str("\nDELIMITER ;\n");
        } else {
            out.push_str(&stmt.sql);
            out.push('\n');
        }
        out.push('\n');
    }

    if options.wrap_transaction {
        out.push_str("COMMIT;\n");
    }

    out
}

/// Rollback section: statements in reverse order, emitting each precomputed
/// rollback where one exists.
fn render_rollback(statements: &[SqlStatement]) -> String {
    let mut out = String::new();
    out.push_str("-- ============================================\n");
    out.push_str("-- rollback script\n");
    out.push_str("-- NOTE: not every change can be rolled back\n");
    out.push_str("-- ============================================\n\n");

    for stmt in statements.iter().rev() {
        if let Some(rollback) = &stmt.rollback_sql {
            out.push_str(&format!("-- rollback: {}\n", stmt.comment));
            out.push_str(rollback);
            out.push_str("\n\n");
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{DiffEngine, IgnoreRules};
    use crate::extractor::{DatabaseSchema, IndexColumn, TableSchema, ViewSchema};
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn column(name: &str, column_type: &str, nullable: bool) -> ColumnSchema {
        ColumnSchema {
            name: name.to_string(),
            position: 1,
            data_type: column_type
                .split(['(', ' '])
                .next()
                .unwrap_or("")
                .to_lowercase(),
            column_type: column_type.to_string(),
            nullable,
            default_value: None,
            auto_increment: false,
            char_max_length: None,
            numeric_precision: None,
            numeric_scale: None,
            charset: String::new(),
            collation: String::new(),
            comment: String::new(),
            extra: String::new(),
            generated_expr: String::new(),
            is_generated: false,
        }
    }

    fn table(name: &str, columns: Vec<ColumnSchema>) -> TableSchema {
        TableSchema {
            name: name.to_string(),
            engine: "InnoDB".to_string(),
            charset: "utf8mb4".to_string(),
            collation: "utf8mb4_unicode_ci".to_string(),
            comment: String::new(),
            auto_increment: None,
            columns,
            indexes: HashMap::new(),
            foreign_keys: HashMap::new(),
            create_sql: format!("CREATE TABLE `{name}` (`id` bigint NOT NULL)"),
        }
    }

    fn schema(tables: Vec<TableSchema>) -> DatabaseSchema {
        let mut s = DatabaseSchema::new("app");
        for t in tables {
            s.tables.insert(t.name.clone(), t);
        }
        s
    }

    fn generate(source: &DatabaseSchema, target: &DatabaseSchema) -> MigrationScript {
        let diff = DiffEngine::new(IgnoreRules::default()).compare(source, target);
        MySqlGenerator::new()
            .generate(&diff, &GenerateOptions::default())
            .unwrap()
    }

    #[test]
    fn test_add_column_statement_is_exact() {
        let target = schema(vec![table(
            "users",
            vec![column("id", "BIGINT", false), column("username", "VARCHAR(50)", false)],
        )]);
        let mut source = target.clone();
        source
            .tables
            .get_mut("users")
            .unwrap()
            .columns
            .push(column("avatar_url", "VARCHAR(500)", true));

        let script = generate(&source, &target);
        assert_eq!(script.statements.len(), 1);
        assert_eq!(
            script.statements[0].sql,
            "ALTER TABLE `users` ADD COLUMN `avatar_url` VARCHAR(500) NULL;"
        );
        assert_eq!(script.statements[0].operation, Operation::Add);
    }

    #[test]
    fn test_drop_table_uses_if_exists() {
        let target = schema(vec![table("temp_logs", vec![column("id", "bigint", false)])]);
        let source = schema(vec![]);

        let script = generate(&source, &target);
        assert!(script
            .statements
            .iter()
            .any(|s| s.sql == "DROP TABLE IF EXISTS `temp_logs`;"));
        assert!(script.warnings.iter().any(|w| w.contains("temp_logs")));
    }

    #[test]
    fn test_create_view_lands_in_create_phase() {
        let target = schema(vec![table("users", vec![column("id", "bigint", false)])]);
        let mut source = target.clone();
        source.views.insert(
            "v_user_stats".to_string(),
            ViewSchema {
                name: "v_user_stats".to_string(),
                definition: "select count(*) as `n` from `users`".to_string(),
                definer: String::new(),
                security: "DEFINER".to_string(),
                check_option: "NONE".to_string(),
            },
        );

        let script = generate(&source, &target);
        let view_stmt = script
            .statements
            .iter()
            .find(|s| s.object_class == ObjectClass::View)
            .unwrap();
        assert_eq!(
            view_stmt.sql,
            "CREATE VIEW `v_user_stats` AS select count(*) as `n` from `users`;"
        );
    }

    #[test]
    fn test_fk_rebuild_drops_before_all_adds() {
        let fk_old = ForeignKey {
            name: "fk_order_user".to_string(),
            columns: vec!["user_id".to_string()],
            ref_table: "users".to_string(),
            ref_columns: vec!["id".to_string()],
            on_delete: "RESTRICT".to_string(),
            on_update: "RESTRICT".to_string(),
        };
        let mut fk_new = fk_old.clone();
        fk_new.ref_columns = vec!["uid".to_string()];

        let mut orders_target = table("orders", vec![column("id", "bigint", false)]);
        orders_target
            .foreign_keys
            .insert("fk_order_user".to_string(), fk_old);
        let mut orders_source = table("orders", vec![column("id", "bigint", false)]);
        orders_source
            .foreign_keys
            .insert("fk_order_user".to_string(), fk_new);

        let target = schema(vec![orders_target]);
        let source = schema(vec![orders_source]);

        let script = generate(&source, &target);
        let drop_pos = script
            .statements
            .iter()
            .position(|s| s.operation == Operation::Drop && s.object_class == ObjectClass::ForeignKey)
            .unwrap();
        let add_pos = script
            .statements
            .iter()
            .position(|s| s.operation == Operation::Add && s.object_class == ObjectClass::ForeignKey)
            .unwrap();
        assert!(drop_pos < add_pos);
        assert!(script.statements[drop_pos]
            .sql
            .contains("DROP FOREIGN KEY `fk_order_user`"));
        assert!(script.statements[add_pos]
            .sql
            .contains("ADD CONSTRAINT `fk_order_user`"));
    }

    #[test]
    fn test_fk_add_omits_restrict_actions() {
        let fk = ForeignKey {
            name: "fk_a_b".to_string(),
            columns: vec!["b_id".to_string()],
            ref_table: "b".to_string(),
            ref_columns: vec!["id".to_string()],
            on_delete: "CASCADE".to_string(),
            on_update: "RESTRICT".to_string(),
        };
        let sql = add_foreign_key_sql("a", &fk);
        assert!(sql.contains("ON DELETE CASCADE"));
        assert!(!sql.contains("ON UPDATE"));
    }

    #[test]
    fn test_phase_order_drop_fk_before_drop_table_and_create_table_before_add_fk() {
        // target: orders -> users via FK; source: fresh schema with a new
        // table carrying its own FK
        let mut orders = table("orders", vec![column("id", "bigint", false)]);
        orders.foreign_keys.insert(
            "fk_order_user".to_string(),
            ForeignKey {
                name: "fk_order_user".to_string(),
                columns: vec!["user_id".to_string()],
                ref_table: "users".to_string(),
                ref_columns: vec!["id".to_string()],
                on_delete: "RESTRICT".to_string(),
                on_update: "RESTRICT".to_string(),
            },
        );
        let target = schema(vec![orders, table("users", vec![column("id", "bigint", false)])]);

        let mut payments = table("payments", vec![column("id", "bigint", false)]);
        payments.foreign_keys.insert(
            "fk_payment_user".to_string(),
            ForeignKey {
                name: "fk_payment_user".to_string(),
                columns: vec!["user_id".to_string()],
                ref_table: "users".to_string(),
                ref_columns: vec!["id".to_string()],
                on_delete: "RESTRICT".to_string(),
                on_update: "RESTRICT".to_string(),
            },
        );
        let mut users_src = table("users", vec![column("id", "bigint", false)]);
        users_src.foreign_keys.insert(
            "fk_payment_user".to_string(),
            ForeignKey {
                name: "fk_payment_user".to_string(),
                columns: vec!["user_id".to_string()],
                ref_table: "payments".to_string(),
                ref_columns: vec!["id".to_string()],
                on_delete: "RESTRICT".to_string(),
                on_update: "RESTRICT".to_string(),
            },
        );
        let source = schema(vec![payments, users_src]);

        let script = generate(&source, &target);

        let last_fk_drop = script
            .statements
            .iter()
            .rposition(|s| s.object_class == ObjectClass::ForeignKey && s.operation == Operation::Drop);
        let first_table_drop = script
            .statements
            .iter()
            .position(|s| s.object_class == ObjectClass::Table && s.operation == Operation::Drop);
        let last_table_create = script
            .statements
            .iter()
            .rposition(|s| s.object_class == ObjectClass::Table && s.operation == Operation::Create);
        let first_fk_add = script
            .statements
            .iter()
            .position(|s| s.object_class == ObjectClass::ForeignKey && s.operation == Operation::Add);

        if let (Some(drop_fk), Some(drop_table)) = (last_fk_drop, first_table_drop) {
            assert!(drop_fk < drop_table);
        }
        if let (Some(create_table), Some(add_fk)) = (last_table_create, first_fk_add) {
            assert!(create_table < add_fk);
        }
    }

    #[test]
    fn test_collation_only_change_emits_nothing() {
        let stmt = table_property_statement(
            "users",
            &PropertyDiff::new("COLLATION", "utf8mb4_general_ci", "utf8mb4_unicode_ci"),
        );
        assert!(stmt.is_none());

        let stmt = table_property_statement(
            "users",
            &PropertyDiff::new("CHARSET", "utf8", "utf8mb4"),
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "ALTER TABLE `users` CONVERT TO CHARACTER SET utf8mb4;"
        );
    }

    #[test]
    fn test_default_value_quoting() {
        assert_eq!(format_default("0", "int"), "0");
        assert_eq!(format_default("CURRENT_TIMESTAMP", "timestamp"), "CURRENT_TIMESTAMP");
        assert_eq!(format_default("NULL", "varchar"), "NULL");
        assert_eq!(format_default("guest", "varchar"), "'guest'");
        assert_eq!(format_default("it's", "varchar"), "'it\\'s'");
    }

    #[test]
    fn test_quote_ident_doubles_backticks() {
        assert_eq!(quote_ident("users"), "`users`");
        assert_eq!(quote_ident("odd`name"), "`odd``name`");
    }

    #[test]
    fn test_wrap_transaction_brackets_script() {
        let target = schema(vec![table("temp_logs", vec![column("id", "bigint", false)])]);
        let source = schema(vec![]);
        let diff = DiffEngine::new(IgnoreRules::default()).compare(&source, &target);
        let options = GenerateOptions {
            wrap_transaction: true,
            ..Default::default()
        };
        let script = MySqlGenerator::new().generate(&diff, &options).unwrap();
        assert!(script.up_sql.contains("START TRANSACTION;"));
        assert!(script.up_sql.trim_end().ends_with("COMMIT;"));
    }

    #[test]
    fn test_rollback_renders_in_reverse_order() {
        let target = schema(vec![table("users", vec![column("id", "bigint", false)])]);
        let mut source = target.clone();
        source
            .tables
            .get_mut("users")
            .unwrap()
            .columns
            .push(column("a", "int", true));
        source.tables.insert("audit".to_string(), table("audit", vec![column("id", "bigint", false)]));

        let diff = DiffEngine::new(IgnoreRules::default()).compare(&source, &target);
        let options = GenerateOptions {
            include_rollback: true,
            ..Default::default()
        };
        let script = MySqlGenerator::new().generate(&diff, &options).unwrap();
        let down = script.down_sql.unwrap();

        // The add-column ran before the create-table, so its rollback must
        // come after the table's in the rollback text.
        let drop_table = down.find("DROP TABLE IF EXISTS `audit`;").unwrap();
        let drop_column = down.find("DROP COLUMN `a`;").unwrap();
        assert!(drop_table < drop_column);
    }

    #[test]
    fn test_delimiter_directives_for_trigger_bodies() {
        let target = schema(vec![table("users", vec![column("id", "bigint", false)])]);
        let mut source = target.clone();
        source.triggers.insert(
            "trg_audit".to_string(),
            TriggerSchema {
                name: "trg_audit".to_string(),
                table: "users".to_string(),
                event: "INSERT".to_string(),
                timing: "AFTER".to_string(),
                statement: "BEGIN INSERT INTO audit VALUES (NEW.id); END".to_string(),
                definer: String::new(),
                sql_mode: String::new(),
            },
        );

        let diff = DiffEngine::new(IgnoreRules::default()).compare(&source, &target);
        let options = GenerateOptions {
            delimiter: "$$".to_string(),
            ..Default::default()
        };
        let script = MySqlGenerator::new().generate(&diff, &options).unwrap();
        assert!(script.up_sql.contains("DELIMITER $$"));
        assert!(script.up_sql.contains("DELIMITER ;"));
    }

    #[test]
    fn test_generate_is_deterministic() {
        let target = schema(vec![table("users", vec![column("id", "bigint", false)])]);
        let mut source = target.clone();
        source
            .tables
            .get_mut("users")
            .unwrap()
            .columns
            .push(column("email", "varchar(255)", true));
        source.tables.insert(
            "audit".to_string(),
            table("audit", vec![column("id", "bigint", false)]),
        );

        let diff = DiffEngine::new(IgnoreRules::default()).compare(&source, &target);
        let options = GenerateOptions {
            include_rollback: true,
            ..Default::default()
        };
        let first = MySqlGenerator::new().generate(&diff, &options).unwrap();
        let second = MySqlGenerator::new().generate(&diff, &options).unwrap();

        assert_eq!(first.up_sql, second.up_sql);
        assert_eq!(first.down_sql, second.down_sql);
        assert_eq!(first.version, second.version);
        assert_eq!(first.generated_at, second.generated_at);
        assert!(first.generated_at.is_none());
    }

    #[test]
    fn test_stamp_sets_version_from_timestamp() {
        let target = schema(vec![table("temp_logs", vec![column("id", "bigint", false)])]);
        let source = schema(vec![]);
        let mut script = generate(&source, &target);

        let at = chrono::Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        script.stamp(at);
        assert_eq!(script.version, "20250102030405");
        assert_eq!(script.generated_at, Some(at));
    }

    #[test]
    fn test_trigger_created_after_its_table() {
        let target = schema(vec![]);
        let mut source = schema(vec![table("audit", vec![column("id", "bigint", false)])]);
        source.triggers.insert(
            "trg_audit".to_string(),
            TriggerSchema {
                name: "trg_audit".to_string(),
                table: "audit".to_string(),
                event: "INSERT".to_string(),
                timing: "AFTER".to_string(),
                statement: "SET NEW.id = NEW.id".to_string(),
                definer: String::new(),
                sql_mode: String::new(),
            },
        );

        let script = generate(&source, &target);
        let table_pos = script
            .statements
            .iter()
            .position(|s| s.object_class == ObjectClass::Table && s.operation == Operation::Create)
            .unwrap();
        let trigger_pos = script
            .statements
            .iter()
            .position(|s| s.object_class == ObjectClass::Trigger)
            .unwrap();
        assert!(table_pos < trigger_pos);
        assert_eq!(
            script.statements[trigger_pos].sql,
            "CREATE TRIGGER `trg_audit` AFTER INSERT ON `audit` FOR EACH ROW SET NEW.id = NEW.id;"
        );
    }

    #[test]
    fn test_index_with_prefix_length() {
        let idx = IndexSchema {
            name: "idx_title".to_string(),
            kind: IndexKind::Normal,
            is_unique: false,
            is_primary: false,
            access_method: "BTREE".to_string(),
            columns: vec![IndexColumn {
                name: "title".to_string(),
                seq_in_index: 1,
                sub_part: Some(32),
                descending: false,
            }],
            comment: String::new(),
        };
        assert_eq!(
            add_index_sql("posts", &idx),
            "ALTER TABLE `posts` ADD INDEX `idx_title` (`title`(32));"
        );
    }

    #[test]
    fn test_primary_key_drop_and_add() {
        let idx = IndexSchema {
            name: "PRIMARY".to_string(),
            kind: IndexKind::Primary,
            is_unique: true,
            is_primary: true,
            access_method: "BTREE".to_string(),
            columns: vec![IndexColumn {
                name: "id".to_string(),
                seq_in_index: 1,
                sub_part: None,
                descending: false,
            }],
            comment: String::new(),
        };
        assert_eq!(add_index_sql("users", &idx), "ALTER TABLE `users` ADD PRIMARY KEY (`id`);");
        assert_eq!(drop_index_sql("users", &idx), "ALTER TABLE `users` DROP PRIMARY KEY;");
    }
}
