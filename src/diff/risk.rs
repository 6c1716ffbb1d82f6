//! Risk analysis engine
//!
//! Deterministic additive scoring over a schema diff. Fixed integer weights
//! keep the result transparent and auditable; it is not a calibrated
//! probability. Policy gating should threshold on severity counts, not on
//! the score.

use crate::diff::compare::{is_base_type_change, is_type_narrowing};
use crate::diff::types::*;
use serde::{Deserialize, Serialize};

/// Aggregate risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Result of assessing one schema diff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub level: RiskLevel,
    /// 0-100
    pub score: u32,
    pub description: String,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Risk assessor
pub struct RiskAssessor;

impl RiskAssessor {
    pub fn new() -> Self {
        Self
    }

    /// Score a diff with the fixed weight table
    pub fn assess(&self, diff: &SchemaDiff) -> RiskAssessment {
        let mut score = 0u32;
        let mut warnings = Vec::new();
        let mut suggestions = Vec::new();

        for td in &diff.table_diffs {
            self.assess_table_diff(td, &mut score, &mut warnings, &mut suggestions);
        }
        for vd in &diff.view_diffs {
            match vd.kind {
                DiffKind::Removed => {
                    score += 5;
                    warnings.push(format!("dropping view `{}`", vd.view_name));
                }
                DiffKind::Modified => score += 3,
                DiffKind::Added => {}
            }
        }
        for pd in &diff.proc_diffs {
            match pd.kind {
                DiffKind::Removed => {
                    score += 10;
                    warnings.push(format!(
                        "dropping procedure `{}` may break applications that call it",
                        pd.proc_name
                    ));
                }
                DiffKind::Modified => {
                    score += 5;
                    warnings.push(format!(
                        "procedure `{}` is modified; confirm callers are unaffected",
                        pd.proc_name
                    ));
                }
                DiffKind::Added => {}
            }
        }
        for td in &diff.trigger_diffs {
            match td.kind {
                DiffKind::Removed => {
                    score += 10;
                    warnings.push(format!(
                        "dropping trigger `{}` may affect data consistency logic",
                        td.trigger_name
                    ));
                }
                DiffKind::Modified => {
                    score += 8;
                    warnings.push(format!("trigger `{}` is modified", td.trigger_name));
                }
                DiffKind::Added => {}
            }
        }

        let score = score.min(100);
        let level = match score {
            70.. => RiskLevel::High,
            40.. => RiskLevel::Medium,
            _ => RiskLevel::Low,
        };

        let description = describe(diff, level);

        RiskAssessment {
            level,
            score,
            description,
            warnings,
            suggestions,
        }
    }

    fn assess_table_diff(
        &self,
        td: &TableDiff,
        score: &mut u32,
        warnings: &mut Vec<String>,
        suggestions: &mut Vec<String>,
    ) {
        match td.kind {
            DiffKind::Removed => {
                *score += 30;
                warnings.push(format!(
                    "dropping table `{}` permanently deletes all of its rows",
                    td.table_name
                ));
                suggestions.push(format!("back up `{}` before dropping it", td.table_name));
            }
            DiffKind::Modified => {
                for cd in &td.column_diffs {
                    self.assess_column_diff(&td.table_name, cd, score, warnings, suggestions);
                }
                for id in &td.index_diffs {
                    self.assess_index_diff(&td.table_name, id, score, warnings, suggestions);
                }
                for fkd in &td.fkey_diffs {
                    if fkd.kind == DiffKind::Added {
                        *score += 5;
                        if let Some(fk) = &fkd.new_fkey {
                            warnings.push(format!(
                                "adding foreign key `{}` on `{}` can fail if existing rows violate it",
                                fkd.fkey_name, td.table_name
                            ));
                            suggestions.push(format!(
                                "verify all values in `{}` exist in `{}` before adding the key",
                                td.table_name, fk.ref_table
                            ));
                        }
                    }
                }
            }
            DiffKind::Added => {}
        }
    }

    fn assess_column_diff(
        &self,
        table: &str,
        cd: &ColumnDiff,
        score: &mut u32,
        warnings: &mut Vec<String>,
        suggestions: &mut Vec<String>,
    ) {
        match cd.kind {
            DiffKind::Removed => {
                *score += 20;
                warnings.push(format!(
                    "dropping column `{}`.`{}` discards its data",
                    table, cd.column_name
                ));
            }
            DiffKind::Modified => {
                for change in &cd.changes {
                    match change.property.as_str() {
                        "type" => {
                            if is_type_narrowing(&change.old_value, &change.new_value) {
                                *score += 15;
                                warnings.push(format!(
                                    "column `{}`.`{}` narrows from {} to {}; values may be truncated",
                                    table, cd.column_name, change.old_value, change.new_value
                                ));
                            } else if is_base_type_change(&change.old_value, &change.new_value) {
                                *score += 10;
                                warnings.push(format!(
                                    "column `{}`.`{}` changes type from {} to {}",
                                    table, cd.column_name, change.old_value, change.new_value
                                ));
                            }
                        }
                        "nullable" => {
                            if change.new_value == "NOT NULL" && change.old_value == "NULL" {
                                *score += 10;
                                warnings.push(format!(
                                    "column `{}`.`{}` becomes NOT NULL; existing NULLs must be resolved",
                                    table, cd.column_name
                                ));
                                suggestions.push(format!(
                                    "update NULL values in `{}`.`{}` before applying the migration",
                                    table, cd.column_name
                                ));
                            }
                        }
                        _ => {}
                    }
                }
            }
            DiffKind::Added => {}
        }
    }

    fn assess_index_diff(
        &self,
        table: &str,
        id: &IndexDiff,
        score: &mut u32,
        warnings: &mut Vec<String>,
        suggestions: &mut Vec<String>,
    ) {
        match id.kind {
            DiffKind::Removed => {
                if id.old_index.as_ref().is_some_and(|i| i.is_primary) {
                    *score += 20;
                    warnings.push(format!("dropping the primary key of `{}`", table));
                } else if id.old_index.as_ref().is_some_and(|i| i.is_unique) {
                    *score += 10;
                    warnings.push(format!(
                        "dropping unique index `{}` on `{}` allows duplicate values",
                        id.index_name, table
                    ));
                }
            }
            DiffKind::Added => {
                suggestions.push(format!(
                    "building index `{}` on `{}` can take a while on large tables; prefer off-peak hours",
                    id.index_name, table
                ));
            }
            DiffKind::Modified => {}
        }
    }
}

impl Default for RiskAssessor {
    fn default() -> Self {
        Self::new()
    }
}

fn describe(diff: &SchemaDiff, level: RiskLevel) -> String {
    let danger = diff.statistics.danger_count;
    let warning = diff.statistics.warning_count;

    if danger == 0 && warning == 0 {
        return "low-risk change set, safe to apply".to_string();
    }

    let mut parts = Vec::new();
    if danger > 0 {
        parts.push(format!("{danger} destructive operation(s)"));
    }
    if warning > 0 {
        parts.push(format!("{warning} warning(s)"));
    }
    let prefix = parts.join(", ");
    match level {
        RiskLevel::High => format!("{prefix}; validate in a sandbox before applying"),
        _ => format!("{prefix}; review before applying"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn empty_diff() -> SchemaDiff {
        SchemaDiff {
            source_database: "dev".to_string(),
            target_database: "prod".to_string(),
            table_diffs: Vec::new(),
            view_diffs: Vec::new(),
            proc_diffs: Vec::new(),
            func_diffs: Vec::new(),
            trigger_diffs: Vec::new(),
            statistics: DiffStatistics::default(),
            generated_at: Utc::now(),
        }
    }

    fn removed_table(name: &str) -> TableDiff {
        TableDiff {
            table_name: name.to_string(),
            kind: DiffKind::Removed,
            severity: Severity::Danger,
            old_table: None,
            new_table: None,
            column_diffs: Vec::new(),
            index_diffs: Vec::new(),
            fkey_diffs: Vec::new(),
            table_props: Vec::new(),
            description: String::new(),
        }
    }

    #[test]
    fn test_empty_diff_scores_zero() {
        let assessment = RiskAssessor::new().assess(&empty_diff());
        assert_eq!(assessment.score, 0);
        assert_eq!(assessment.level, RiskLevel::Low);
    }

    #[test]
    fn test_dropped_table_scores_thirty() {
        let mut diff = empty_diff();
        diff.table_diffs.push(removed_table("temp_logs"));
        let assessment = RiskAssessor::new().assess(&diff);
        assert_eq!(assessment.score, 30);
        assert_eq!(assessment.level, RiskLevel::Low);
        assert!(!assessment.warnings.is_empty());
    }

    #[test]
    fn test_level_thresholds() {
        let mut diff = empty_diff();
        diff.table_diffs.push(removed_table("a"));
        diff.table_diffs.push(removed_table("b"));
        let assessment = RiskAssessor::new().assess(&diff);
        assert_eq!(assessment.score, 60);
        assert_eq!(assessment.level, RiskLevel::Medium);

        diff.table_diffs.push(removed_table("c"));
        let assessment = RiskAssessor::new().assess(&diff);
        assert_eq!(assessment.score, 90);
        assert_eq!(assessment.level, RiskLevel::High);
    }

    #[test]
    fn test_score_is_monotonic_in_danger_changes() {
        let mut diff = empty_diff();
        diff.trigger_diffs.push(TriggerDiff {
            trigger_name: "trg_audit".to_string(),
            kind: DiffKind::Removed,
            severity: Severity::Warning,
            old_trigger: None,
            new_trigger: None,
            description: String::new(),
        });
        let before = RiskAssessor::new().assess(&diff).score;

        diff.table_diffs.push(removed_table("temp_logs"));
        let after = RiskAssessor::new().assess(&diff).score;
        assert!(after > before);
    }

    #[test]
    fn test_score_is_clamped_to_hundred() {
        let mut diff = empty_diff();
        for i in 0..10 {
            diff.table_diffs.push(removed_table(&format!("t{i}")));
        }
        let assessment = RiskAssessor::new().assess(&diff);
        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.level, RiskLevel::High);
    }
}
