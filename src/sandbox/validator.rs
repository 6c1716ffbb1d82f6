//! Sandbox migration validator
//!
//! Replays a migration script inside an ephemeral MySQL container seeded
//! with the target schema, then checks the result converges toward the
//! source schema. Statement failures are recorded and execution continues
//! so callers see the full failure profile; only pre-replay problems (no
//! docker, startup timeout, import failure) surface as hard errors.

use crate::connection::Environment;
use crate::diff::compare::sorted_keys;
use crate::error::AppError;
use crate::extractor::{DatabaseSchema, ExtractOptions, MySqlExtractor};
use crate::sandbox::container::{Container, ContainerConfig, DockerHost};
use crate::sqlgen::{MigrationScript, Operation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Delimiter used when transmitting routine and trigger bodies
const ROUTINE_DELIMITER: &str = "$$";

/// Validation options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationOptions {
    pub mysql_image: String,
    pub timeout_secs: u64,
    /// Remove the container afterwards; disable to keep it for post-mortem
    pub cleanup: bool,
    /// Re-extract the sandbox schema and compare against the source
    pub compare_schema: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            mysql_image: "mysql:8.0".to_string(),
            timeout_secs: 120,
            cleanup: true,
            compare_schema: true,
        }
    }
}

/// Result of a validation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub success: bool,
    pub execution_log: Vec<ExecutionLogEntry>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub schema_match: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub schema_diffs: Vec<String>,
    pub execution_time_ms: u64,
    pub container_log: String,
}

impl ValidationResult {
    fn new() -> Self {
        Self {
            success: false,
            execution_log: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            schema_match: false,
            schema_diffs: Vec::new(),
            execution_time_ms: 0,
            container_log: String::new(),
        }
    }
}

/// One entry of the execution log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub step: usize,
    pub total: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Progress callback: (step, total, message, error)
pub type ProgressCallback<'a> = &'a (dyn Fn(usize, usize, &str, Option<&str>) + Send + Sync);

/// Sandbox validator
pub struct Validator {
    host: DockerHost,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            host: DockerHost::new(),
        }
    }

    /// Validate a migration script.
    ///
    /// `source_schema` is the intended end state, `target_schema` the current
    /// state that seeds the sandbox before the script replays.
    pub async fn validate(
        &self,
        source_schema: &DatabaseSchema,
        target_schema: &DatabaseSchema,
        script: &MigrationScript,
        options: &ValidationOptions,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<ValidationResult, AppError> {
        let start = Instant::now();
        let mut result = ValidationResult::new();

        // docker check + container + readiness + import + statements + convergence
        let total = 5 + script.statements.len();
        let mut step = 0usize;

        let report = |result: &mut ValidationResult,
                      step: usize,
                      message: &str,
                      sql: Option<&str>,
                      err: Option<&str>| {
            log_step(result, step, total, message, sql, err);
            if let Some(cb) = progress {
                cb(step, total, message, err);
            }
        };

        step += 1;
        report(&mut result, step, "checking container host...", None, None);
        if let Err(e) = self.host.check_available().await {
            report(&mut result, step, "container host unavailable", None, Some(&e.to_string()));
            return Err(e);
        }

        step += 1;
        report(&mut result, step, "starting MySQL container...", None, None);
        if let Err(e) = self.host.pull_image(&options.mysql_image).await {
            warn!("image pull failed, continuing with the local cache: {}", e);
        }
        let config = ContainerConfig {
            image: options.mysql_image.clone(),
            charset: non_empty_or(&target_schema.charset, "utf8mb4"),
            collation: non_empty_or(&target_schema.collation, "utf8mb4_unicode_ci"),
            timeout: Duration::from_secs(options.timeout_secs),
            ..Default::default()
        };
        let container = match self.host.run_mysql(config).await {
            Ok(container) => container,
            Err(e) => {
                report(&mut result, step, "container start failed", None, Some(&e.to_string()));
                return Err(e);
            }
        };

        // Everything past this point must tear the container down
        let outcome = self
            .run_inside(
                &container,
                source_schema,
                target_schema,
                script,
                options,
                progress,
                &mut result,
                step,
                total,
            )
            .await;

        result.container_log = self.host.logs(&container.id, 50).await.unwrap_or_default();

        if options.cleanup {
            if let Err(e) = self.host.remove(&container.id).await {
                warn!("failed to remove sandbox container: {}", e);
            }
        } else {
            info!(
                "sandbox container {} left running on port {} for post-mortem",
                container.name, container.port
            );
        }

        result.execution_time_ms = start.elapsed().as_millis() as u64;
        outcome.map(|_| result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_inside(
        &self,
        container: &Container,
        source_schema: &DatabaseSchema,
        target_schema: &DatabaseSchema,
        script: &MigrationScript,
        options: &ValidationOptions,
        progress: Option<ProgressCallback<'_>>,
        result: &mut ValidationResult,
        mut step: usize,
        total: usize,
    ) -> Result<(), AppError> {
        let report = |result: &mut ValidationResult,
                      step: usize,
                      message: &str,
                      sql: Option<&str>,
                      err: Option<&str>| {
            log_step(result, step, total, message, sql, err);
            if let Some(cb) = progress {
                cb(step, total, message, err);
            }
        };

        step += 1;
        report(result, step, "waiting for MySQL...", None, None);
        if let Err(e) = self.host.wait_ready(container).await {
            report(result, step, "MySQL startup timed out", None, Some(&e.to_string()));
            result.errors.push(format!("MySQL startup timed out: {e}"));
            return Err(e);
        }

        step += 1;
        report(result, step, "importing target schema...", None, None);
        if let Err(e) = self.import_schema(container, target_schema).await {
            report(result, step, "schema import failed", None, Some(&e.to_string()));
            result.errors.push(format!("schema import failed: {e}"));
            return Err(e);
        }

        // Replay, recording failures without stopping
        let mut fail_count = 0usize;
        for (i, stmt) in script.statements.iter().enumerate() {
            step += 1;
            let message = format!(
                "executing [{}/{}]: {} {}",
                i + 1,
                script.statements.len(),
                stmt.operation,
                stmt.object_name
            );

            let outcome = if stmt.object_class.needs_delimiter() && stmt.operation != Operation::Drop {
                let body = stmt.sql.trim_end().trim_end_matches(';').to_string();
                self.host
                    .exec_sql_delimited(container, &format!("{body}\n{ROUTINE_DELIMITER}"), ROUTINE_DELIMITER)
                    .await
            } else {
                self.host.exec_sql(container, &stmt.sql).await
            };

            match outcome {
                Ok(exec) if exec.success => {
                    debug!("statement {} ok in {:?}", i + 1, exec.duration);
                    report(result, step, &message, Some(&stmt.sql), None);
                }
                Ok(exec) => {
                    fail_count += 1;
                    let err = exec.error.unwrap_or(exec.output);
                    error!("statement {} failed: {}", i + 1, err);
                    report(result, step, &message, Some(&stmt.sql), Some(&err));
                    result.errors.push(format!("statement {} failed: {err}", i + 1));
                }
                Err(e) => {
                    fail_count += 1;
                    let err = e.to_string();
                    error!("statement {} failed: {}", i + 1, err);
                    report(result, step, &message, Some(&stmt.sql), Some(&err));
                    result.errors.push(format!("statement {} failed: {err}", i + 1));
                }
            }
        }

        // Coarse convergence check: table presence and counts only, the full
        // diff engine is deliberately not re-run here
        if options.compare_schema && fail_count == 0 {
            step += 1;
            report(result, step, "verifying schema convergence...", None, None);
            let (matched, diffs) = self.compare_against(container, source_schema).await;
            result.schema_match = matched;
            result.schema_diffs = diffs;
            if !matched {
                // Residual differences stay warnings: the replay itself succeeded
                let residual = AppError::Validation(
                    "sandbox schema still differs from the source after replay".to_string(),
                );
                result.warnings.push(residual.to_string());
            }
        }

        result.success = fail_count == 0;
        Ok(())
    }

    /// Seed the sandbox with the target schema: one batch for tables and
    /// views with FK checks off, then routines and triggers individually
    /// under a switched delimiter (their bodies contain internal `;`).
    async fn import_schema(
        &self,
        container: &Container,
        schema: &DatabaseSchema,
    ) -> Result<(), AppError> {
        let mut batch = String::new();
        batch.push_str(&format!(
            "SET NAMES '{}';\n",
            non_empty_or(&schema.charset, "utf8mb4")
        ));
        batch.push_str("SET FOREIGN_KEY_CHECKS = 0;\n\n");

        for name in sorted_keys(&schema.tables) {
            let table = &schema.tables[name];
            if !table.create_sql.is_empty() {
                batch.push_str(&table.create_sql);
                batch.push_str(";\n\n");
            }
        }

        for name in sorted_keys(&schema.views) {
            let view = &schema.views[name];
            if !view.definition.is_empty() {
                batch.push_str(&format!(
                    "CREATE VIEW `{}` AS {};\n\n",
                    name.replace('`', "``"),
                    view.definition
                ));
            }
        }

        batch.push_str("SET FOREIGN_KEY_CHECKS = 1;\n");

        let outcome = self.host.exec_sql(container, &batch).await?;
        if !outcome.success {
            return Err(AppError::SqlExecution {
                sql: batch,
                message: outcome.error.unwrap_or_else(|| "schema import failed".to_string()),
            });
        }

        for name in sorted_keys(&schema.procedures) {
            let proc = &schema.procedures[name];
            if !proc.definition.is_empty() {
                self.import_routine(container, "procedure", name, &proc.definition).await?;
            }
        }

        for name in sorted_keys(&schema.functions) {
            let func = &schema.functions[name];
            if !func.definition.is_empty() {
                self.import_routine(container, "function", name, &func.definition).await?;
            }
        }

        for name in sorted_keys(&schema.triggers) {
            let trigger = &schema.triggers[name];
            let sql = format!(
                "CREATE TRIGGER `{}` {} {} ON `{}` FOR EACH ROW {}",
                trigger.name.replace('`', "``"),
                trigger.timing,
                trigger.event,
                trigger.table.replace('`', "``"),
                trigger.statement
            );
            self.import_routine(container, "trigger", name, &sql).await?;
        }

        Ok(())
    }

    async fn import_routine(
        &self,
        container: &Container,
        kind: &str,
        name: &str,
        definition: &str,
    ) -> Result<(), AppError> {
        let sql = format!("{definition}\n{ROUTINE_DELIMITER}");
        let outcome = self
            .host
            .exec_sql_delimited(container, &sql, ROUTINE_DELIMITER)
            .await?;
        if !outcome.success {
            return Err(AppError::SqlExecution {
                sql: definition.to_string(),
                message: format!(
                    "importing {kind} `{name}` failed: {}",
                    outcome.error.unwrap_or_default()
                ),
            });
        }
        Ok(())
    }

    /// Re-extract the sandbox and check every source table is present
    async fn compare_against(
        &self,
        container: &Container,
        expected: &DatabaseSchema,
    ) -> (bool, Vec<String>) {
        let env = Environment {
            host: container.host.clone(),
            port: container.port,
            username: "root".to_string(),
            password: container.config.root_password.clone(),
            database: container.config.database.clone(),
            charset: container.config.charset.clone(),
            ssl: None,
        };

        let extractor = match MySqlExtractor::connect(&env).await {
            Ok(extractor) => extractor,
            Err(e) => return (false, vec![format!("cannot connect to sandbox: {e}")]),
        };

        let current = match extractor.extract_schema(&ExtractOptions::default()).await {
            Ok(schema) => schema,
            Err(e) => {
                extractor.close().await;
                return (false, vec![format!("cannot re-extract sandbox schema: {e}")]);
            }
        };
        extractor.close().await;

        let mut diffs = Vec::new();
        if current.tables.len() != expected.tables.len() {
            diffs.push(format!(
                "table count mismatch: expected {}, found {}",
                expected.tables.len(),
                current.tables.len()
            ));
        }
        for name in sorted_keys(&expected.tables) {
            if !current.tables.contains_key(name) {
                diffs.push(format!("missing table: {name}"));
            }
        }

        (diffs.is_empty(), diffs)
    }

    /// Lexical sanity checks with no container involved. Returns warnings
    /// only and never fails.
    pub fn quick_validate(&self, script: &MigrationScript) -> ValidationResult {
        let mut result = ValidationResult::new();
        result.success = true;
        result.schema_match = true;

        for (i, stmt) in script.statements.iter().enumerate() {
            let sql = stmt.sql.trim();

            if sql.is_empty() || sql == ";" {
                result.warnings.push(format!("statement {} is empty", i + 1));
                continue;
            }

            if !sql.ends_with(';') {
                result
                    .warnings
                    .push(format!("statement {} is missing its terminator", i + 1));
            }

            let upper = sql.to_uppercase();
            if upper.contains("DROP TABLE") && !upper.contains("IF EXISTS") {
                result.warnings.push(format!(
                    "statement {}: DROP TABLE without IF EXISTS",
                    i + 1
                ));
            }
            if upper.contains("TRUNCATE") {
                result
                    .warnings
                    .push(format!("statement {}: contains TRUNCATE", i + 1));
            }
        }

        result
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn log_step(
    result: &mut ValidationResult,
    step: usize,
    total: usize,
    message: &str,
    sql: Option<&str>,
    err: Option<&str>,
) {
    result.execution_log.push(ExecutionLogEntry {
        timestamp: Utc::now(),
        step,
        total,
        message: message.to_string(),
        sql: sql.map(String::from),
        success: err.is_none(),
        error: err.map(String::from),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::Severity;
    use crate::sqlgen::{MigrationScript, ObjectClass, SqlStatement};

    fn statement(sql: &str) -> SqlStatement {
        SqlStatement {
            sql: sql.to_string(),
            object_class: ObjectClass::Table,
            object_name: "t".to_string(),
            operation: Operation::Drop,
            severity: Severity::Info,
            comment: String::new(),
            rollback_sql: None,
        }
    }

    fn script(statements: Vec<SqlStatement>) -> MigrationScript {
        MigrationScript {
            version: "20250101000000".to_string(),
            description: String::new(),
            statements,
            warnings: Vec::new(),
            up_sql: String::new(),
            down_sql: None,
            generated_at: None,
        }
    }

    #[test]
    fn test_quick_validate_never_fails() {
        let validator = Validator::new();
        let script = script(vec![
            statement(""),
            statement("DROP TABLE `users`;"),
            statement("TRUNCATE `logs`;"),
            statement("ALTER TABLE `users` ADD COLUMN `a` int"),
        ]);
        let result = validator.quick_validate(&script);
        assert!(result.success);
        assert_eq!(result.warnings.len(), 4);
    }

    #[test]
    fn test_quick_validate_flags_drop_without_if_exists() {
        let validator = Validator::new();
        let result = validator.quick_validate(&script(vec![statement("DROP TABLE `users`;")]));
        assert!(result.warnings[0].contains("IF EXISTS"));

        let result = validator.quick_validate(&script(vec![statement(
            "DROP TABLE IF EXISTS `users`;",
        )]));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_quick_validate_clean_script_has_no_warnings() {
        let validator = Validator::new();
        let result = validator.quick_validate(&script(vec![statement(
            "ALTER TABLE `users` ADD COLUMN `a` int;",
        )]));
        assert!(result.success);
        assert!(result.warnings.is_empty());
    }
}
