//! Schema Diff Engine
//!
//! Pure comparison of two extracted schemas under a set of ignore rules.
//! `source` is the intended future state; `target` is the deployed state the
//! migration will upgrade.

use crate::diff::compare::{self, sorted_keys, CompareOptions};
use crate::diff::types::*;
use crate::extractor::DatabaseSchema;
use chrono::Utc;
use glob::Pattern;
use serde::{Deserialize, Serialize};

/// Rules that modulate the equivalence relation used by the engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IgnoreRules {
    /// Table name patterns (shell-style wildcards)
    pub tables: Vec<String>,
    /// Column patterns of the form `tablePattern.columnPattern`
    pub columns: Vec<String>,
    /// Index name patterns
    pub indexes: Vec<String>,
    pub ignore_comments: bool,
    pub ignore_auto_increment: bool,
    pub ignore_collation: bool,
    pub ignore_charset: bool,
}

/// The diff engine. Holds no connection; pure function of its inputs.
pub struct DiffEngine {
    ignore: IgnoreRules,
}

impl DiffEngine {
    pub fn new(ignore: IgnoreRules) -> Self {
        Self { ignore }
    }

    /// Compare two schemas and describe how to make `target` equal `source`
    pub fn compare(&self, source: &DatabaseSchema, target: &DatabaseSchema) -> SchemaDiff {
        let mut diff = SchemaDiff {
            source_database: source.database.clone(),
            target_database: target.database.clone(),
            table_diffs: self.compare_tables(source, target),
            view_diffs: self.compare_views(source, target),
            proc_diffs: self.compare_procedures(source, target),
            func_diffs: self.compare_functions(source, target),
            trigger_diffs: self.compare_triggers(source, target),
            statistics: DiffStatistics::default(),
            generated_at: Utc::now(),
        };
        diff.statistics = calculate_statistics(&diff);
        diff
    }

    fn compare_tables(&self, source: &DatabaseSchema, target: &DatabaseSchema) -> Vec<TableDiff> {
        let opts = CompareOptions {
            ignore_comments: self.ignore.ignore_comments,
            ignore_charset: self.ignore.ignore_charset,
            ignore_collation: self.ignore.ignore_collation,
            ignore_auto_increment: self.ignore.ignore_auto_increment,
        };

        let mut diffs = Vec::new();

        for name in sorted_keys(&source.tables) {
            if self.table_ignored(name) {
                continue;
            }
            let src = &source.tables[name];
            match target.tables.get(name) {
                None => diffs.push(TableDiff {
                    table_name: name.clone(),
                    kind: DiffKind::Added,
                    severity: Severity::Info,
                    old_table: None,
                    new_table: Some(src.clone()),
                    column_diffs: Vec::new(),
                    index_diffs: Vec::new(),
                    fkey_diffs: Vec::new(),
                    table_props: Vec::new(),
                    description: "new table".to_string(),
                }),
                Some(tgt) => {
                    let mut table_diff = compare::compare_tables(src, tgt, opts);

                    table_diff.column_diffs = self.filter_ignored_columns(name, table_diff.column_diffs);
                    table_diff.index_diffs = self.filter_ignored_indexes(table_diff.index_diffs);

                    if !table_diff.column_diffs.is_empty()
                        || !table_diff.index_diffs.is_empty()
                        || !table_diff.fkey_diffs.is_empty()
                        || !table_diff.table_props.is_empty()
                    {
                        diffs.push(table_diff);
                    }
                }
            }
        }

        for name in sorted_keys(&target.tables) {
            if self.table_ignored(name) {
                continue;
            }
            if !source.tables.contains_key(name) {
                diffs.push(TableDiff {
                    table_name: name.clone(),
                    kind: DiffKind::Removed,
                    severity: Severity::Danger,
                    old_table: Some(target.tables[name].clone()),
                    new_table: None,
                    column_diffs: Vec::new(),
                    index_diffs: Vec::new(),
                    fkey_diffs: Vec::new(),
                    table_props: Vec::new(),
                    description: "dropped table - data will be lost".to_string(),
                });
            }
        }

        diffs
    }

    fn compare_views(&self, source: &DatabaseSchema, target: &DatabaseSchema) -> Vec<ViewDiff> {
        let mut diffs = Vec::new();

        for name in sorted_keys(&source.views) {
            let src = &source.views[name];
            match target.views.get(name) {
                None => diffs.push(ViewDiff {
                    view_name: name.clone(),
                    kind: DiffKind::Added,
                    severity: Severity::Info,
                    old_view: None,
                    new_view: Some(src.clone()),
                    description: "new view".to_string(),
                }),
                Some(tgt) => {
                    if src.definition != tgt.definition {
                        diffs.push(ViewDiff {
                            view_name: name.clone(),
                            kind: DiffKind::Modified,
                            severity: Severity::Warning,
                            old_view: Some(tgt.clone()),
                            new_view: Some(src.clone()),
                            description: "view definition changed".to_string(),
                        });
                    }
                }
            }
        }

        for name in sorted_keys(&target.views) {
            if !source.views.contains_key(name) {
                diffs.push(ViewDiff {
                    view_name: name.clone(),
                    kind: DiffKind::Removed,
                    severity: Severity::Warning,
                    old_view: Some(target.views[name].clone()),
                    new_view: None,
                    description: "dropped view".to_string(),
                });
            }
        }

        diffs
    }

    fn compare_procedures(&self, source: &DatabaseSchema, target: &DatabaseSchema) -> Vec<ProcedureDiff> {
        let mut diffs = Vec::new();

        for name in sorted_keys(&source.procedures) {
            let src = &source.procedures[name];
            match target.procedures.get(name) {
                None => diffs.push(ProcedureDiff {
                    proc_name: name.clone(),
                    kind: DiffKind::Added,
                    severity: Severity::Info,
                    old_proc: None,
                    new_proc: Some(src.clone()),
                    description: "new procedure".to_string(),
                }),
                Some(tgt) => {
                    if src.definition != tgt.definition {
                        diffs.push(ProcedureDiff {
                            proc_name: name.clone(),
                            kind: DiffKind::Modified,
                            severity: Severity::Warning,
                            old_proc: Some(tgt.clone()),
                            new_proc: Some(src.clone()),
                            description: "procedure definition changed".to_string(),
                        });
                    }
                }
            }
        }

        for name in sorted_keys(&target.procedures) {
            if !source.procedures.contains_key(name) {
                diffs.push(ProcedureDiff {
                    proc_name: name.clone(),
                    kind: DiffKind::Removed,
                    severity: Severity::Warning,
                    old_proc: Some(target.procedures[name].clone()),
                    new_proc: None,
                    description: "dropped procedure".to_string(),
                });
            }
        }

        diffs
    }

    fn compare_functions(&self, source: &DatabaseSchema, target: &DatabaseSchema) -> Vec<FunctionDiff> {
        let mut diffs = Vec::new();

        for name in sorted_keys(&source.functions) {
            let src = &source.functions[name];
            match target.functions.get(name) {
                None => diffs.push(FunctionDiff {
                    func_name: name.clone(),
                    kind: DiffKind::Added,
                    severity: Severity::Info,
                    old_func: None,
                    new_func: Some(src.clone()),
                    description: "new function".to_string(),
                }),
                Some(tgt) => {
                    if src.definition != tgt.definition || src.returns != tgt.returns {
                        diffs.push(FunctionDiff {
                            func_name: name.clone(),
                            kind: DiffKind::Modified,
                            severity: Severity::Warning,
                            old_func: Some(tgt.clone()),
                            new_func: Some(src.clone()),
                            description: "function definition changed".to_string(),
                        });
                    }
                }
            }
        }

        for name in sorted_keys(&target.functions) {
            if !source.functions.contains_key(name) {
                diffs.push(FunctionDiff {
                    func_name: name.clone(),
                    kind: DiffKind::Removed,
                    severity: Severity::Warning,
                    old_func: Some(target.functions[name].clone()),
                    new_func: None,
                    description: "dropped function".to_string(),
                });
            }
        }

        diffs
    }

    fn compare_triggers(&self, source: &DatabaseSchema, target: &DatabaseSchema) -> Vec<TriggerDiff> {
        let mut diffs = Vec::new();

        for name in sorted_keys(&source.triggers) {
            let src = &source.triggers[name];
            match target.triggers.get(name) {
                None => diffs.push(TriggerDiff {
                    trigger_name: name.clone(),
                    kind: DiffKind::Added,
                    severity: Severity::Info,
                    old_trigger: None,
                    new_trigger: Some(src.clone()),
                    description: "new trigger".to_string(),
                }),
                Some(tgt) => {
                    if src.statement != tgt.statement
                        || src.event != tgt.event
                        || src.timing != tgt.timing
                    {
                        diffs.push(TriggerDiff {
                            trigger_name: name.clone(),
                            kind: DiffKind::Modified,
                            severity: Severity::Warning,
                            old_trigger: Some(tgt.clone()),
                            new_trigger: Some(src.clone()),
                            description: "trigger definition changed".to_string(),
                        });
                    }
                }
            }
        }

        for name in sorted_keys(&target.triggers) {
            if !source.triggers.contains_key(name) {
                diffs.push(TriggerDiff {
                    trigger_name: name.clone(),
                    kind: DiffKind::Removed,
                    severity: Severity::Warning,
                    old_trigger: Some(target.triggers[name].clone()),
                    new_trigger: None,
                    description: "dropped trigger".to_string(),
                });
            }
        }

        diffs
    }

    /// Ignored tables are filtered from the partition entirely
    fn table_ignored(&self, table: &str) -> bool {
        self.ignore
            .tables
            .iter()
            .any(|p| Pattern::new(p).map(|pat| pat.matches(table)).unwrap_or(false))
    }

    /// Column patterns take the form `tablePattern.columnPattern`, matched per
    /// segment so `tbl.*` means every column of `tbl`.
    fn filter_ignored_columns(&self, table: &str, diffs: Vec<ColumnDiff>) -> Vec<ColumnDiff> {
        diffs
            .into_iter()
            .filter(|diff| {
                !self.ignore.columns.iter().any(|pattern| {
                    let Some((table_pat, col_pat)) = pattern.split_once('.') else {
                        return false;
                    };
                    let table_match = Pattern::new(table_pat)
                        .map(|p| p.matches(table))
                        .unwrap_or(false);
                    let col_match = Pattern::new(col_pat)
                        .map(|p| p.matches(&diff.column_name))
                        .unwrap_or(false);
                    table_match && col_match
                })
            })
            .collect()
    }

    fn filter_ignored_indexes(&self, diffs: Vec<IndexDiff>) -> Vec<IndexDiff> {
        diffs
            .into_iter()
            .filter(|diff| {
                !self.ignore.indexes.iter().any(|p| {
                    Pattern::new(p)
                        .map(|pat| pat.matches(&diff.index_name))
                        .unwrap_or(false)
                })
            })
            .collect()
    }
}

fn calculate_statistics(diff: &SchemaDiff) -> DiffStatistics {
    let mut stats = DiffStatistics::default();

    for td in &diff.table_diffs {
        match td.kind {
            DiffKind::Added => stats.tables_added += 1,
            DiffKind::Removed => stats.tables_removed += 1,
            DiffKind::Modified => stats.tables_changed += 1,
        }
        match td.severity {
            Severity::Danger => stats.danger_count += 1,
            Severity::Warning => stats.warning_count += 1,
            Severity::Info => stats.info_count += 1,
        }
    }
    for vd in &diff.view_diffs {
        match vd.kind {
            DiffKind::Added => stats.views_added += 1,
            DiffKind::Removed => stats.views_removed += 1,
            DiffKind::Modified => stats.views_changed += 1,
        }
    }
    for pd in &diff.proc_diffs {
        match pd.kind {
            DiffKind::Added => stats.procs_added += 1,
            DiffKind::Removed => stats.procs_removed += 1,
            DiffKind::Modified => stats.procs_changed += 1,
        }
    }
    for fd in &diff.func_diffs {
        match fd.kind {
            DiffKind::Added => stats.funcs_added += 1,
            DiffKind::Removed => stats.funcs_removed += 1,
            DiffKind::Modified => stats.funcs_changed += 1,
        }
    }
    for td in &diff.trigger_diffs {
        match td.kind {
            DiffKind::Added => stats.triggers_added += 1,
            DiffKind::Removed => stats.triggers_removed += 1,
            DiffKind::Modified => stats.triggers_changed += 1,
        }
    }

    stats.total_diffs = diff.table_diffs.len()
        + diff.view_diffs.len()
        + diff.proc_diffs.len()
        + diff.func_diffs.len()
        + diff.trigger_diffs.len();

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{ColumnSchema, DatabaseSchema, TableSchema};
    use std::collections::HashMap;

    fn column(name: &str, column_type: &str) -> ColumnSchema {
        ColumnSchema {
            name: name.to_string(),
            position: 1,
            data_type: column_type.split('(').next().unwrap_or("").to_string(),
            column_type: column_type.to_string(),
            nullable: true,
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
            create_sql: format!("CREATE TABLE `{name}` ()"),
        }
    }

    fn schema(tables: Vec<TableSchema>) -> DatabaseSchema {
        let mut s = DatabaseSchema::new("app");
        for t in tables {
            s.tables.insert(t.name.clone(), t);
        }
        s
    }

    #[test]
    fn test_identical_schemas_have_empty_diff() {
        let a = schema(vec![table("users", vec![column("id", "bigint")])]);
        let engine = DiffEngine::new(IgnoreRules::default());
        let diff = engine.compare(&a, &a.clone());
        assert!(!diff.has_diff());
        assert_eq!(diff.statistics.total_diffs, 0);
    }

    #[test]
    fn test_dropped_table_is_single_danger_diff() {
        let target = schema(vec![
            table("users", vec![column("id", "bigint")]),
            table("temp_logs", vec![column("id", "bigint")]),
        ]);
        let source = schema(vec![table("users", vec![column("id", "bigint")])]);

        let engine = DiffEngine::new(IgnoreRules::default());
        let diff = engine.compare(&source, &target);

        assert_eq!(diff.table_diffs.len(), 1);
        assert_eq!(diff.table_diffs[0].table_name, "temp_logs");
        assert_eq!(diff.table_diffs[0].kind, DiffKind::Removed);
        assert_eq!(diff.table_diffs[0].severity, Severity::Danger);
        assert_eq!(diff.statistics.tables_removed, 1);
        assert_eq!(diff.statistics.danger_count, 1);
    }

    #[test]
    fn test_added_column_is_info() {
        let target = schema(vec![table(
            "users",
            vec![column("id", "bigint"), column("username", "varchar(50)")],
        )]);
        let source = schema(vec![table(
            "users",
            vec![
                column("id", "bigint"),
                column("username", "varchar(50)"),
                column("avatar_url", "varchar(500)"),
            ],
        )]);

        let engine = DiffEngine::new(IgnoreRules::default());
        let diff = engine.compare(&source, &target);

        assert_eq!(diff.table_diffs.len(), 1);
        let td = &diff.table_diffs[0];
        assert_eq!(td.kind, DiffKind::Modified);
        assert_eq!(td.severity, Severity::Info);
        assert_eq!(td.column_diffs.len(), 1);
        assert_eq!(td.column_diffs[0].column_name, "avatar_url");
        assert_eq!(td.column_diffs[0].kind, DiffKind::Added);
    }

    #[test]
    fn test_ignored_table_pattern_filters_both_sides() {
        let target = schema(vec![table("tmp_sessions", vec![column("id", "bigint")])]);
        let source = schema(vec![]);

        let rules = IgnoreRules {
            tables: vec!["tmp_*".to_string()],
            ..Default::default()
        };
        let diff = DiffEngine::new(rules).compare(&source, &target);
        assert!(!diff.has_diff());
    }

    #[test]
    fn test_ignored_comment_change_yields_empty_diff() {
        let target = schema(vec![table("users", vec![column("id", "bigint")])]);
        let mut source = target.clone();
        source.tables.get_mut("users").unwrap().comment = "registered users".to_string();

        let rules = IgnoreRules {
            ignore_comments: true,
            ..Default::default()
        };
        assert!(!DiffEngine::new(rules).compare(&source, &target).has_diff());

        // Without the rule the comment change is reported
        assert!(DiffEngine::new(IgnoreRules::default())
            .compare(&source, &target)
            .has_diff());
    }

    #[test]
    fn test_ignored_column_pattern_is_table_scoped() {
        let target = schema(vec![
            table("users", vec![column("id", "bigint")]),
            table("orders", vec![column("id", "bigint")]),
        ]);
        let mut source = target.clone();
        source
            .tables
            .get_mut("users")
            .unwrap()
            .columns
            .push(column("synced_at", "datetime"));
        source
            .tables
            .get_mut("orders")
            .unwrap()
            .columns
            .push(column("synced_at", "datetime"));

        let rules = IgnoreRules {
            columns: vec!["users.synced_*".to_string()],
            ..Default::default()
        };
        let diff = DiffEngine::new(rules).compare(&source, &target);

        // orders.synced_at survives, users.synced_at is filtered
        assert_eq!(diff.table_diffs.len(), 1);
        assert_eq!(diff.table_diffs[0].table_name, "orders");
    }
}
