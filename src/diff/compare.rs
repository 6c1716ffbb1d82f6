//! Object-level comparison rules
//!
//! Equivalence of tables, columns, indexes and foreign keys, with
//! per-attribute change lists and column-risk classification.

use crate::diff::types::*;
use crate::extractor::{ColumnSchema, ForeignKey, IndexSchema, TableSchema};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Attribute toggles applied during comparison
#[derive(Debug, Clone, Copy, Default)]
pub struct CompareOptions {
    pub ignore_comments: bool,
    pub ignore_charset: bool,
    pub ignore_collation: bool,
    pub ignore_auto_increment: bool,
}

/// Integer family ordering used for narrowing detection across subtypes
static INTEGER_ORDER: Lazy<HashMap<&'static str, u8>> = Lazy::new(|| {
    HashMap::from([
        ("tinyint", 1),
        ("smallint", 2),
        ("mediumint", 3),
        ("int", 4),
        ("bigint", 5),
    ])
});

/// Compare two versions of the same table. Always returns a `TableDiff` of
/// kind Modified; callers decide whether it is empty and should be dropped.
pub fn compare_tables(source: &TableSchema, target: &TableSchema, opts: CompareOptions) -> TableDiff {
    let mut diff = TableDiff {
        table_name: source.name.clone(),
        kind: DiffKind::Modified,
        severity: Severity::Info,
        old_table: Some(target.clone()),
        new_table: Some(source.clone()),
        column_diffs: Vec::new(),
        index_diffs: Vec::new(),
        fkey_diffs: Vec::new(),
        table_props: Vec::new(),
        description: String::new(),
    };

    if source.engine != target.engine {
        diff.table_props.push(PropertyDiff::new("ENGINE", &target.engine, &source.engine));
    }
    if !opts.ignore_charset && source.charset != target.charset {
        diff.table_props.push(PropertyDiff::new("CHARSET", &target.charset, &source.charset));
    }
    if !opts.ignore_collation && source.collation != target.collation {
        diff.table_props.push(PropertyDiff::new("COLLATION", &target.collation, &source.collation));
    }
    if !opts.ignore_comments && source.comment != target.comment {
        diff.table_props.push(PropertyDiff::new("COMMENT", &target.comment, &source.comment));
    }
    if !opts.ignore_auto_increment && source.auto_increment != target.auto_increment {
        diff.table_props.push(PropertyDiff::new(
            "AUTO_INCREMENT",
            target.auto_increment.map(|v| v.to_string()).unwrap_or_default(),
            source.auto_increment.map(|v| v.to_string()).unwrap_or_default(),
        ));
    }

    diff.column_diffs = compare_columns(&source.columns, &target.columns, opts);
    diff.index_diffs = compare_indexes(&source.indexes, &target.indexes);
    diff.fkey_diffs = compare_foreign_keys(&source.foreign_keys, &target.foreign_keys);

    for cd in &diff.column_diffs {
        diff.severity = diff.severity.max(cd.severity);
    }
    for id in &diff.index_diffs {
        diff.severity = diff.severity.max(id.severity);
    }
    for fkd in &diff.fkey_diffs {
        diff.severity = diff.severity.max(fkd.severity);
    }

    let mut changes = Vec::new();
    if !diff.column_diffs.is_empty() {
        changes.push(format!("{} column change(s)", diff.column_diffs.len()));
    }
    if !diff.index_diffs.is_empty() {
        changes.push(format!("{} index change(s)", diff.index_diffs.len()));
    }
    if !diff.fkey_diffs.is_empty() {
        changes.push(format!("{} foreign key change(s)", diff.fkey_diffs.len()));
    }
    if !diff.table_props.is_empty() {
        changes.push(format!("{} table property change(s)", diff.table_props.len()));
    }
    diff.description = changes.join(", ");

    diff
}

/// Columns are compared by name; ordinal position alone is an extraction
/// artifact and never a difference.
pub fn compare_columns(
    source_cols: &[ColumnSchema],
    target_cols: &[ColumnSchema],
    opts: CompareOptions,
) -> Vec<ColumnDiff> {
    let target_map: HashMap<&str, &ColumnSchema> =
        target_cols.iter().map(|c| (c.name.as_str(), c)).collect();
    let source_map: HashMap<&str, &ColumnSchema> =
        source_cols.iter().map(|c| (c.name.as_str(), c)).collect();

    let mut diffs = Vec::new();

    for src in source_cols {
        match target_map.get(src.name.as_str()) {
            None => diffs.push(ColumnDiff {
                column_name: src.name.clone(),
                kind: DiffKind::Added,
                severity: Severity::Info,
                old_column: None,
                new_column: Some(src.clone()),
                changes: Vec::new(),
                risk_note: String::new(),
            }),
            Some(tgt) => {
                if let Some(diff) = compare_column(src, tgt, opts) {
                    diffs.push(diff);
                }
            }
        }
    }

    for tgt in target_cols {
        if !source_map.contains_key(tgt.name.as_str()) {
            diffs.push(ColumnDiff {
                column_name: tgt.name.clone(),
                kind: DiffKind::Removed,
                severity: Severity::Danger,
                old_column: Some(tgt.clone()),
                new_column: None,
                changes: Vec::new(),
                risk_note: "dropping the column discards its data".to_string(),
            });
        }
    }

    diffs
}

/// Compare one column present on both sides. Returns `None` when equivalent
/// under the given options.
pub fn compare_column(
    source: &ColumnSchema,
    target: &ColumnSchema,
    opts: CompareOptions,
) -> Option<ColumnDiff> {
    let mut changes = Vec::new();

    if source.column_type != target.column_type {
        changes.push(PropertyDiff::new("type", &target.column_type, &source.column_type));
    }

    if source.nullable != target.nullable {
        let fmt = |nullable: bool| if nullable { "NULL" } else { "NOT NULL" };
        changes.push(PropertyDiff::new("nullable", fmt(target.nullable), fmt(source.nullable)));
    }

    let src_default = source.default_value.as_deref().unwrap_or("");
    let tgt_default = target.default_value.as_deref().unwrap_or("");
    if src_default != tgt_default {
        changes.push(PropertyDiff::new("default", tgt_default, src_default));
    }

    if source.auto_increment != target.auto_increment {
        changes.push(PropertyDiff::new(
            "autoIncrement",
            target.auto_increment.to_string(),
            source.auto_increment.to_string(),
        ));
    }

    if !opts.ignore_comments && source.comment != target.comment {
        changes.push(PropertyDiff::new("comment", &target.comment, &source.comment));
    }

    if !opts.ignore_charset && source.charset != target.charset {
        changes.push(PropertyDiff::new("charset", &target.charset, &source.charset));
    }

    if !opts.ignore_collation && source.collation != target.collation {
        changes.push(PropertyDiff::new("collation", &target.collation, &source.collation));
    }

    if changes.is_empty() {
        return None;
    }

    let (severity, risk_note) = assess_column_risk(source, target, &changes);

    Some(ColumnDiff {
        column_name: source.name.clone(),
        kind: DiffKind::Modified,
        severity,
        old_column: Some(target.clone()),
        new_column: Some(source.clone()),
        changes,
        risk_note,
    })
}

fn assess_column_risk(
    source: &ColumnSchema,
    target: &ColumnSchema,
    changes: &[PropertyDiff],
) -> (Severity, String) {
    let mut severity = Severity::Info;
    let mut risks = Vec::new();

    for change in changes {
        match change.property.as_str() {
            "type" => {
                if is_type_narrowing(&change.old_value, &change.new_value) {
                    severity = Severity::Danger;
                    risks.push("narrowing the type may truncate data".to_string());
                } else if is_base_type_change(&change.old_value, &change.new_value) {
                    severity = severity.max(Severity::Warning);
                    risks.push("changing the base type may affect stored values".to_string());
                } else {
                    severity = severity.max(Severity::Warning);
                }
            }
            "nullable" => {
                if !source.nullable && target.nullable {
                    severity = severity.max(Severity::Warning);
                    risks.push("existing NULL values must be handled first".to_string());
                }
            }
            _ => {}
        }
    }

    (severity, risks.join("; "))
}

/// Narrowing: both sides carry a parenthesized length and the new one is
/// shorter, the integer subtype moves down the family order, or a fractional
/// type collapses to an integer (scale is lost).
pub fn is_type_narrowing(old_type: &str, new_type: &str) -> bool {
    let old_len = type_length(old_type);
    let new_len = type_length(new_type);
    if let (Some(old), Some(new)) = (old_len, new_len) {
        if new < old {
            return true;
        }
    }

    let old_base = base_type(old_type);
    let new_base = base_type(new_type);
    if let (Some(old), Some(new)) = (
        INTEGER_ORDER.get(old_base.as_str()),
        INTEGER_ORDER.get(new_base.as_str()),
    ) {
        return new < old;
    }

    const FRACTIONAL: [&str; 5] = ["decimal", "numeric", "float", "double", "real"];
    if FRACTIONAL.contains(&old_base.as_str()) && INTEGER_ORDER.contains_key(new_base.as_str()) {
        return true;
    }

    false
}

/// Lateral change: different base type, classified as a warning rather than
/// narrowing (e.g. int -> varchar).
pub fn is_base_type_change(old_type: &str, new_type: &str) -> bool {
    base_type(old_type) != base_type(new_type)
}

/// `varchar(255)` -> 255
fn type_length(column_type: &str) -> Option<i64> {
    let start = column_type.find('(')?;
    let end = column_type.find(')')?;
    if end <= start + 1 {
        return None;
    }
    // decimal(10,2): the leading precision is what length comparison uses
    column_type[start + 1..end]
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// `varchar(255)` -> varchar, `int(11) unsigned` -> int
fn base_type(column_type: &str) -> String {
    let mut base = column_type.to_lowercase();
    if let Some(idx) = base.find('(') {
        base.truncate(idx);
    }
    if let Some(idx) = base.find(' ') {
        base.truncate(idx);
    }
    base
}

pub fn compare_indexes(
    source_idxs: &HashMap<String, IndexSchema>,
    target_idxs: &HashMap<String, IndexSchema>,
) -> Vec<IndexDiff> {
    let mut diffs = Vec::new();

    for name in sorted_keys(source_idxs) {
        let src = &source_idxs[name];
        match target_idxs.get(name) {
            None => diffs.push(IndexDiff {
                index_name: name.clone(),
                kind: DiffKind::Added,
                severity: Severity::Info,
                old_index: None,
                new_index: Some(src.clone()),
                description: format!("new {} index", src.kind.as_str()),
            }),
            Some(tgt) => {
                if !index_equals(src, tgt) {
                    diffs.push(IndexDiff {
                        index_name: name.clone(),
                        kind: DiffKind::Modified,
                        severity: Severity::Warning,
                        old_index: Some(tgt.clone()),
                        new_index: Some(src.clone()),
                        description: "index definition changed".to_string(),
                    });
                }
            }
        }
    }

    for name in sorted_keys(target_idxs) {
        if !source_idxs.contains_key(name) {
            let tgt = &target_idxs[name];
            diffs.push(IndexDiff {
                index_name: name.clone(),
                kind: DiffKind::Removed,
                severity: if tgt.is_primary || tgt.is_unique {
                    Severity::Danger
                } else {
                    Severity::Warning
                },
                old_index: Some(tgt.clone()),
                new_index: None,
                description: format!("dropped {} index", tgt.kind.as_str()),
            });
        }
    }

    diffs
}

/// Indexes are equal iff kind, unique and primary flags match and the ordered
/// column lists match elementwise on (name, sequence, prefix length).
pub fn index_equals(a: &IndexSchema, b: &IndexSchema) -> bool {
    if a.kind != b.kind || a.is_unique != b.is_unique || a.is_primary != b.is_primary {
        return false;
    }
    if a.columns.len() != b.columns.len() {
        return false;
    }
    a.columns.iter().zip(&b.columns).all(|(x, y)| {
        x.name == y.name && x.seq_in_index == y.seq_in_index && x.sub_part == y.sub_part
    })
}

pub fn compare_foreign_keys(
    source_fks: &HashMap<String, ForeignKey>,
    target_fks: &HashMap<String, ForeignKey>,
) -> Vec<ForeignKeyDiff> {
    let mut diffs = Vec::new();

    for name in sorted_keys(source_fks) {
        let src = &source_fks[name];
        match target_fks.get(name) {
            None => diffs.push(ForeignKeyDiff {
                fkey_name: name.clone(),
                kind: DiffKind::Added,
                severity: Severity::Warning,
                old_fkey: None,
                new_fkey: Some(src.clone()),
                description: format!("new foreign key referencing `{}`", src.ref_table),
            }),
            Some(tgt) => {
                if !foreign_key_equals(src, tgt) {
                    diffs.push(ForeignKeyDiff {
                        fkey_name: name.clone(),
                        kind: DiffKind::Modified,
                        severity: Severity::Warning,
                        old_fkey: Some(tgt.clone()),
                        new_fkey: Some(src.clone()),
                        description: "foreign key definition changed".to_string(),
                    });
                }
            }
        }
    }

    for name in sorted_keys(target_fks) {
        if !source_fks.contains_key(name) {
            let tgt = &target_fks[name];
            diffs.push(ForeignKeyDiff {
                fkey_name: name.clone(),
                kind: DiffKind::Removed,
                severity: Severity::Warning,
                old_fkey: Some(tgt.clone()),
                new_fkey: None,
                description: format!("dropped foreign key referencing `{}`", tgt.ref_table),
            });
        }
    }

    diffs
}

pub fn foreign_key_equals(a: &ForeignKey, b: &ForeignKey) -> bool {
    a.ref_table == b.ref_table
        && a.on_delete == b.on_delete
        && a.on_update == b.on_update
        && a.columns == b.columns
        && a.ref_columns == b.ref_columns
}

/// Lexicographic key order keeps diff output stable across runs
pub fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<&String> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{IndexColumn, IndexKind};

    fn column(name: &str, column_type: &str, nullable: bool) -> ColumnSchema {
        ColumnSchema {
            name: name.to_string(),
            position: 1,
            data_type: base_type(column_type),
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

    #[test]
    fn test_type_length_extraction() {
        assert_eq!(type_length("varchar(255)"), Some(255));
        assert_eq!(type_length("decimal(10,2)"), Some(10));
        assert_eq!(type_length("bigint"), None);
    }

    #[test]
    fn test_base_type_extraction() {
        assert_eq!(base_type("varchar(255)"), "varchar");
        assert_eq!(base_type("int(11) unsigned"), "int");
        assert_eq!(base_type("BIGINT"), "bigint");
    }

    #[test]
    fn test_narrowing_by_length() {
        assert!(is_type_narrowing("varchar(255)", "varchar(100)"));
        assert!(!is_type_narrowing("varchar(100)", "varchar(255)"));
    }

    #[test]
    fn test_narrowing_across_integer_family() {
        assert!(is_type_narrowing("bigint", "int"));
        assert!(is_type_narrowing("int", "tinyint"));
        assert!(!is_type_narrowing("smallint", "bigint"));
    }

    #[test]
    fn test_lateral_change_is_not_narrowing() {
        assert!(!is_type_narrowing("int", "varchar"));
        assert!(is_base_type_change("int", "varchar(20)"));
    }

    #[test]
    fn test_identical_columns_produce_no_diff() {
        let a = column("email", "varchar(255)", true);
        let b = column("email", "varchar(255)", true);
        assert!(compare_column(&a, &b, CompareOptions::default()).is_none());
    }

    #[test]
    fn test_nullability_tightening_is_warning() {
        let source = column("email", "varchar(255)", false);
        let target = column("email", "varchar(255)", true);
        let diff = compare_column(&source, &target, CompareOptions::default()).unwrap();
        assert_eq!(diff.severity, Severity::Warning);
        assert!(diff.changes.iter().any(|c| c.property == "nullable"));
    }

    #[test]
    fn test_narrowed_column_is_danger() {
        let source = column("name", "varchar(50)", false);
        let target = column("name", "varchar(255)", false);
        let diff = compare_column(&source, &target, CompareOptions::default()).unwrap();
        assert_eq!(diff.severity, Severity::Danger);
    }

    #[test]
    fn test_decimal_to_integer_loses_scale() {
        let source = column("amount", "bigint", false);
        let target = column("amount", "decimal(10,2)", false);
        let diff = compare_column(&source, &target, CompareOptions::default()).unwrap();
        let type_change = diff.changes.iter().find(|c| c.property == "type").unwrap();
        assert_eq!(type_change.old_value, "decimal(10,2)");
        assert_eq!(type_change.new_value, "bigint");
        assert_eq!(diff.severity, Severity::Danger);
    }

    #[test]
    fn test_ignored_comment_is_not_a_change() {
        let mut source = column("email", "varchar(255)", true);
        source.comment = "contact address".to_string();
        let target = column("email", "varchar(255)", true);

        let opts = CompareOptions {
            ignore_comments: true,
            ..Default::default()
        };
        assert!(compare_column(&source, &target, opts).is_none());
        assert!(compare_column(&source, &target, CompareOptions::default()).is_some());
    }

    #[test]
    fn test_index_equality_on_prefix_length() {
        let make = |sub_part: Option<u32>| IndexSchema {
            name: "idx_title".to_string(),
            kind: IndexKind::Normal,
            is_unique: false,
            is_primary: false,
            access_method: "BTREE".to_string(),
            columns: vec![IndexColumn {
                name: "title".to_string(),
                seq_in_index: 1,
                sub_part,
                descending: false,
            }],
            comment: String::new(),
        };
        assert!(index_equals(&make(Some(10)), &make(Some(10))));
        assert!(!index_equals(&make(Some(10)), &make(None)));
    }

    #[test]
    fn test_dropped_unique_index_is_danger() {
        let mut target = HashMap::new();
        target.insert(
            "uq_email".to_string(),
            IndexSchema {
                name: "uq_email".to_string(),
                kind: IndexKind::Unique,
                is_unique: true,
                is_primary: false,
                access_method: "BTREE".to_string(),
                columns: vec![],
                comment: String::new(),
            },
        );
        let diffs = compare_indexes(&HashMap::new(), &target);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].kind, DiffKind::Removed);
        assert_eq!(diffs[0].severity, Severity::Danger);
    }

    #[test]
    fn test_foreign_key_equality_on_ref_columns() {
        let make = |ref_columns: Vec<&str>| ForeignKey {
            name: "fk_order_user".to_string(),
            columns: vec!["user_id".to_string()],
            ref_table: "users".to_string(),
            ref_columns: ref_columns.into_iter().map(String::from).collect(),
            on_delete: "CASCADE".to_string(),
            on_update: "RESTRICT".to_string(),
        };
        assert!(foreign_key_equals(&make(vec!["id"]), &make(vec!["id"])));
        assert!(!foreign_key_equals(&make(vec!["id"]), &make(vec!["uid"])));
    }
}
