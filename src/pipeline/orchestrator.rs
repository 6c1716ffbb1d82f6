//! Pipeline orchestrator
//!
//! Sequences extract -> diff -> risk -> generate -> validate. The only
//! component that performs I/O on behalf of the caller: it owns the two
//! extractor connections and the sandbox lifecycle. Source and target are
//! extracted concurrently; the pure stages run synchronously on the results.

use crate::connection::Environment;
use crate::diff::{DiffEngine, IgnoreRules, RiskAssessment, RiskAssessor, SchemaDiff};
use crate::error::AppError;
use crate::extractor::{DatabaseSchema, ExtractOptions, MySqlExtractor};
use crate::sandbox::{ValidationOptions, ValidationResult, Validator};
use crate::sqlgen::{GenerateOptions, MigrationScript, MySqlGenerator};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

/// Result of the diff stage
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffOutcome {
    pub source_checksum: String,
    pub target_checksum: String,
    pub diff: SchemaDiff,
    pub risk: RiskAssessment,
}

/// Result of the generate stage
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOutcome {
    pub diff: SchemaDiff,
    pub risk: RiskAssessment,
    pub script: MigrationScript,
}

/// Result of the full pipeline including sandbox replay
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateOutcome {
    pub risk: RiskAssessment,
    pub script: MigrationScript,
    pub validation: ValidationResult,
}

/// Pipeline orchestrator
pub struct Orchestrator;

impl Orchestrator {
    pub fn new() -> Self {
        Self
    }

    /// Extract one environment's schema. The extractor connection is owned
    /// exclusively for the duration and closed on exit.
    pub async fn extract(
        &self,
        env: &Environment,
        options: &ExtractOptions,
    ) -> Result<DatabaseSchema, AppError> {
        let extractor = MySqlExtractor::connect(env).await?;
        if let Ok(version) = extractor.server_version().await {
            info!("📦 extracting `{}` from MySQL {}", env.database, version);
        }
        let result = extractor.extract_schema(options).await;
        extractor.close().await;
        result
    }

    /// Extract source and target concurrently
    pub async fn extract_pair(
        &self,
        source_env: &Environment,
        target_env: &Environment,
        options: &ExtractOptions,
    ) -> Result<(DatabaseSchema, DatabaseSchema), AppError> {
        let (source, target) = tokio::join!(
            self.extract(source_env, options),
            self.extract(target_env, options)
        );
        Ok((source?, target?))
    }

    /// Extract both environments, diff them and score the risk
    pub async fn diff(
        &self,
        source_env: &Environment,
        target_env: &Environment,
        ignore: IgnoreRules,
        options: &ExtractOptions,
    ) -> Result<DiffOutcome, AppError> {
        let (source, target) = self.extract_pair(source_env, target_env, options).await?;

        let diff = DiffEngine::new(ignore).compare(&source, &target);
        let risk = RiskAssessor::new().assess(&diff);

        info!(
            "📐 diff complete: {} difference(s), max severity {:?}, risk {:?} ({})",
            diff.statistics.total_diffs,
            diff.max_severity(),
            risk.level,
            risk.score
        );

        Ok(DiffOutcome {
            source_checksum: source.checksum(),
            target_checksum: target.checksum(),
            diff,
            risk,
        })
    }

    /// Diff and synthesize the migration script
    pub async fn generate(
        &self,
        source_env: &Environment,
        target_env: &Environment,
        ignore: IgnoreRules,
        extract_options: &ExtractOptions,
        generate_options: &GenerateOptions,
    ) -> Result<GenerateOutcome, AppError> {
        let (source, target) = self
            .extract_pair(source_env, target_env, extract_options)
            .await?;

        let diff = DiffEngine::new(ignore).compare(&source, &target);
        let risk = RiskAssessor::new().assess(&diff);
        let mut script = MySqlGenerator::new().generate(&diff, generate_options)?;
        script.stamp(Utc::now());

        if diff.has_diff() {
            info!(
                "📜 migration generated: {} statement(s), {} warning(s)",
                script.statements.len(),
                script.warnings.len()
            );
        } else {
            info!("📜 schemas are already equivalent, empty migration");
        }

        Ok(GenerateOutcome { diff, risk, script })
    }

    /// Full pipeline: extract, diff, generate, then replay the script in a
    /// sandbox seeded with the target schema.
    pub async fn validate(
        &self,
        source_env: &Environment,
        target_env: &Environment,
        ignore: IgnoreRules,
        extract_options: &ExtractOptions,
        generate_options: &GenerateOptions,
        validation_options: &ValidationOptions,
    ) -> Result<ValidateOutcome, AppError> {
        let (source, target) = self
            .extract_pair(source_env, target_env, extract_options)
            .await?;

        let diff = DiffEngine::new(ignore).compare(&source, &target);
        let risk = RiskAssessor::new().assess(&diff);
        let mut script = MySqlGenerator::new().generate(&diff, generate_options)?;
        script.stamp(Utc::now());

        let progress = |step: usize, total: usize, message: &str, err: Option<&str>| match err {
            None => info!("🧪 [{}/{}] {}", step, total, message),
            Some(err) => warn!("🧪 [{}/{}] {}: {}", step, total, message, err),
        };

        let validator = Validator::new();
        let validation = validator
            .validate(&source, &target, &script, validation_options, Some(&progress))
            .await?;

        info!(
            "🧪 validation finished: success={}, {} error(s)",
            validation.success,
            validation.errors.len()
        );

        Ok(ValidateOutcome {
            risk,
            script,
            validation,
        })
    }

    /// Generate and run the container-free lexical checks only
    pub async fn quick_validate(
        &self,
        source_env: &Environment,
        target_env: &Environment,
        ignore: IgnoreRules,
        extract_options: &ExtractOptions,
        generate_options: &GenerateOptions,
    ) -> Result<ValidateOutcome, AppError> {
        let outcome = self
            .generate(source_env, target_env, ignore, extract_options, generate_options)
            .await?;

        let validation = Validator::new().quick_validate(&outcome.script);

        Ok(ValidateOutcome {
            risk: outcome.risk,
            script: outcome.script,
            validation,
        })
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}
