// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Fact Loader
//!
//! Streams one fact's staging rows in business-key order, resolves each
//! declared dimension reference through the FK resolver, applies the
//! per-relationship missing-dimension policy, and upserts the assembled
//! fact row. Dimension keys are captured at load time; later dimension
//! versions never re-bind existing facts.
//!
//! Batching, transactions, retries, dry runs, and the error budget follow
//! the dimension loader. The loader additionally aggregates a per-dimension
//! missing-FK summary.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use core_merge_domain::entities::{FactLoadResult, FactRecord, RowError, RowErrorKind};
use core_merge_domain::handlers::{FactHandler, FactHandlerRegistry, FactType, MissingStrategy};
use core_merge_domain::repositories::{
    FactRepository, FieldDescriptor, StagingQuery, StagingRepository,
};
use core_merge_domain::services::ValueNormalizer;
use core_merge_domain::value_objects::{BusinessKey, FieldKind, Lineage, StagingRow, SurrogateKey};
use core_merge_domain::MergeError;
use uuid::Uuid;

use crate::application::services::fk_resolver::FkResolver;
use crate::application::services::row_mapper::map_attributes;
use crate::infrastructure::config::{ErrorHandlingConfig, FactConfig, UpsertMode};
use crate::infrastructure::runtime::CancellationToken;
use crate::infrastructure::services::ProgressTracker;

/// Per-invocation options for one fact load.
#[derive(Debug, Clone)]
pub struct FactLoadOptions {
    pub batch_size: usize,
    pub upsert_mode: UpsertMode,
    pub validate_fks: bool,
    pub dry_run: bool,
    pub continue_on_error: bool,
    pub timeout_ms: u64,
}

impl FactLoadOptions {
    pub fn from_config(fact: &FactConfig, errors: &ErrorHandlingConfig) -> Self {
        Self {
            batch_size: fact.batch_size,
            upsert_mode: fact.upsert_mode,
            validate_fks: fact.enable_fk_validation,
            dry_run: false,
            continue_on_error: errors.continue_on_error,
            timeout_ms: fact.timeout_ms,
        }
    }
}

/// What the FK policy decided for one row.
enum RowDisposition {
    /// Proceed with the resolved (possibly null) keys.
    Keep(BTreeMap<String, Option<SurrogateKey>>),
    /// Drop the row; the summary was already updated.
    Skip,
}

#[derive(Default)]
struct BatchOutcome {
    rows: u64,
    inserted: u64,
    updated: u64,
    skipped: u64,
    fks_nulled: u64,
    errors: Vec<RowError>,
    missing: BTreeMap<String, u64>,
}

/// Loads staging rows into one fact table.
pub struct FactLoader {
    staging: Arc<dyn StagingRepository>,
    facts: Arc<dyn FactRepository>,
    resolver: Arc<FkResolver>,
    registry: Arc<FactHandlerRegistry>,
    normalizer: ValueNormalizer,
    error_policy: ErrorHandlingConfig,
    progress: Option<Arc<ProgressTracker>>,
    cancel: CancellationToken,
}

impl FactLoader {
    pub fn new(
        staging: Arc<dyn StagingRepository>,
        facts: Arc<dyn FactRepository>,
        resolver: Arc<FkResolver>,
        registry: Arc<FactHandlerRegistry>,
        error_policy: ErrorHandlingConfig,
        progress: Option<Arc<ProgressTracker>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            staging,
            facts,
            resolver,
            registry,
            normalizer: ValueNormalizer::new(),
            error_policy,
            progress,
            cancel,
        }
    }

    /// Runs one fact load for a load run.
    pub async fn load_facts(
        &self,
        fact: FactType,
        load_run_id: Uuid,
        options: &FactLoadOptions,
    ) -> Result<FactLoadResult, MergeError> {
        let handler = self.registry.handler(fact)?;
        let started = Instant::now();
        let mut result = FactLoadResult::new(handler.fact.as_str(), options.dry_run);

        let total = self
            .staging
            .count_rows(handler.source_table, load_run_id)
            .await?;
        info!(
            fact = %fact,
            load_run_id = %load_run_id,
            total_rows = total,
            dry_run = options.dry_run,
            "starting fact load"
        );
        if let Some(progress) = &self.progress {
            progress.begin_target(handler.fact.as_str(), total);
        }

        let fields = Self::field_descriptors(handler);
        let order_by: Vec<String> = handler
            .business_key_fields
            .iter()
            .map(|f| f.to_string())
            .collect();
        let mut offset = 0u64;

        while offset < total {
            if self.cancel.is_cancelled() {
                return Err(MergeError::Cancelled(format!(
                    "fact {} load cancelled at row {}",
                    fact, offset
                )));
            }
            if started.elapsed().as_millis() as u64 > options.timeout_ms {
                return Err(MergeError::TimeoutError(format!(
                    "fact {} load exceeded {} ms",
                    fact, options.timeout_ms
                )));
            }

            let query = StagingQuery {
                source_table: handler.source_table.to_string(),
                load_run_id,
                fields: fields.clone(),
                order_by: order_by.clone(),
                offset,
                limit: options.batch_size as u64,
            };
            let rows = self.staging.fetch_page(&query).await?;
            if rows.is_empty() {
                break;
            }
            offset += rows.len() as u64;

            match self
                .run_batch_with_retries(handler, &rows, load_run_id, options, &result)
                .await
            {
                Ok(outcome) => {
                    result.rows_processed += outcome.rows;
                    result.inserted += outcome.inserted;
                    result.updated += outcome.updated;
                    result.skipped += outcome.skipped;
                    result.fks_nulled += outcome.fks_nulled;
                    result.errors.extend(outcome.errors);
                    for (dimension, count) in outcome.missing {
                        *result.missing_fk_summary.entry(dimension).or_insert(0) += count;
                    }
                    if let Some(progress) = &self.progress {
                        progress.record_rows(rows.len() as u64);
                    }
                }
                Err(err) if err.is_merge_fatal() => return Err(err),
                Err(err) if options.continue_on_error => {
                    warn!(fact = %fact, error = %err, "batch failed, continuing with next batch");
                    result.failed_batches += 1;
                }
                Err(err) => return Err(err),
            }
        }

        result.finish(started.elapsed().as_millis() as u64);
        info!(
            fact = %fact,
            inserted = result.inserted,
            updated = result.updated,
            skipped = result.skipped,
            errors = result.error_count(),
            "fact load finished"
        );
        Ok(result)
    }

    fn field_descriptors(handler: &FactHandler) -> Vec<FieldDescriptor> {
        handler
            .source_fields()
            .into_iter()
            .map(|source| {
                let kind = handler
                    .mapping_for_source(source)
                    .map(|m| m.kind)
                    .unwrap_or(FieldKind::Text);
                FieldDescriptor::new(source, kind)
            })
            .collect()
    }

    async fn run_batch_with_retries(
        &self,
        handler: &FactHandler,
        rows: &[StagingRow],
        load_run_id: Uuid,
        options: &FactLoadOptions,
        result: &FactLoadResult,
    ) -> Result<BatchOutcome, MergeError> {
        let mut attempt = 0u32;
        loop {
            match self
                .apply_batch(handler, rows, load_run_id, options, result)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_recoverable() && attempt < self.error_policy.max_retries => {
                    attempt += 1;
                    warn!(fact = %handler.fact, attempt, error = %err, "recoverable batch failure, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(
                        self.error_policy.retry_delay_ms,
                    ))
                    .await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn apply_batch(
        &self,
        handler: &FactHandler,
        rows: &[StagingRow],
        load_run_id: Uuid,
        options: &FactLoadOptions,
        result: &FactLoadResult,
    ) -> Result<BatchOutcome, MergeError> {
        self.facts.begin().await?;
        match self
            .process_rows(handler, rows, load_run_id, options, result)
            .await
        {
            Ok(outcome) => {
                if options.dry_run {
                    self.facts.rollback().await?;
                } else {
                    self.facts.commit().await?;
                }
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = self.facts.rollback().await {
                    warn!(error = %rollback_err, "rollback after batch failure also failed");
                }
                Err(err)
            }
        }
    }

    async fn process_rows(
        &self,
        handler: &FactHandler,
        rows: &[StagingRow],
        load_run_id: Uuid,
        options: &FactLoadOptions,
        result: &FactLoadResult,
    ) -> Result<BatchOutcome, MergeError> {
        let mut outcome = BatchOutcome::default();

        for row in rows {
            // A cancel request rolls the in-flight batch back
            if self.cancel.is_cancelled() {
                return Err(MergeError::Cancelled(format!(
                    "fact {} batch cancelled",
                    handler.fact
                )));
            }
            outcome.rows += 1;

            let key = match BusinessKey::from_row(handler.business_key_fields, row) {
                Ok(key) => key,
                Err(err) => {
                    outcome.errors.push(RowError::new(
                        RowErrorKind::BusinessKeyConflict,
                        None,
                        err.to_string(),
                    ));
                    self.check_error_budget(result, &outcome, options)?;
                    continue;
                }
            };

            let disposition = self
                .resolve_foreign_keys(handler, row, &key, options, &mut outcome)
                .await?;
            let dimension_keys = match disposition {
                RowDisposition::Keep(keys) => keys,
                RowDisposition::Skip => {
                    outcome.skipped += 1;
                    continue;
                }
            };

            let attributes = match map_attributes(&handler.field_mappings, &self.normalizer, row) {
                Ok(attributes) => attributes,
                Err(err @ (MergeError::ValidationError(_) | MergeError::TransformationError(_))) => {
                    outcome.errors.push(RowError::new(
                        RowErrorKind::TransformationError,
                        Some(key.canonical().to_string()),
                        err.to_string(),
                    ));
                    self.check_error_budget(result, &outcome, options)?;
                    continue;
                }
                Err(err) => return Err(err),
            };

            let now = Utc::now();
            let fact = FactRecord::new(
                key.clone(),
                dimension_keys,
                attributes,
                Lineage::new(load_run_id, now),
            );

            if options.dry_run {
                // Classification parity only: probe existence, skip writes
                match options.upsert_mode {
                    UpsertMode::Upsert | UpsertMode::Update => {
                        if self.facts.exists(handler, &key).await? {
                            outcome.updated += 1;
                        } else if options.upsert_mode == UpsertMode::Upsert {
                            outcome.inserted += 1;
                        } else {
                            return Err(MergeError::database_error(format!(
                                "no fact row to update for business key {}",
                                key
                            )));
                        }
                    }
                    UpsertMode::Insert => outcome.inserted += 1,
                }
                continue;
            }

            match options.upsert_mode {
                UpsertMode::Upsert => {
                    if self.facts.exists(handler, &key).await? {
                        let affected = self.facts.update(handler, &fact).await?;
                        if affected == 0 {
                            return Err(MergeError::database_error(format!(
                                "fact row for business key {} vanished during upsert",
                                key
                            )));
                        }
                        outcome.updated += 1;
                    } else {
                        self.facts.insert(handler, &fact).await?;
                        outcome.inserted += 1;
                    }
                }
                UpsertMode::Insert => {
                    self.facts.insert(handler, &fact).await?;
                    outcome.inserted += 1;
                }
                UpsertMode::Update => {
                    let affected = self.facts.update(handler, &fact).await?;
                    if affected == 0 {
                        return Err(MergeError::database_error(format!(
                            "no fact row to update for business key {}",
                            key
                        )));
                    }
                    outcome.updated += 1;
                }
            }
            debug!(fact = %handler.fact, key = %key, "fact row applied");
        }

        Ok(outcome)
    }

    /// Resolves every declared relationship and applies the missing-FK
    /// policy matrix.
    async fn resolve_foreign_keys(
        &self,
        handler: &FactHandler,
        row: &StagingRow,
        key: &BusinessKey,
        options: &FactLoadOptions,
        outcome: &mut BatchOutcome,
    ) -> Result<RowDisposition, MergeError> {
        let mut keys: BTreeMap<String, Option<SurrogateKey>> = BTreeMap::new();

        for fk in &handler.foreign_keys {
            let lookup = BusinessKey::from_row(fk.lookup_fields, row).ok();
            let resolved = match &lookup {
                Some(lookup) => self.resolver.resolve(fk.dimension, lookup).await?,
                None => None,
            };

            if let Some(surrogate) = resolved {
                keys.insert(fk.fact_column.to_string(), Some(surrogate));
                continue;
            }

            if !options.validate_fks {
                // Validation disabled: never skip or abort on a miss
                if fk.nullable {
                    keys.insert(fk.fact_column.to_string(), None);
                    outcome.fks_nulled += 1;
                } else {
                    warn!(
                        fact = %handler.fact,
                        dimension = %fk.dimension,
                        key = %key,
                        "unresolved non-nullable reference with FK validation disabled, row skipped"
                    );
                    *outcome.missing.entry(fk.dimension.as_str().to_string()).or_insert(0) += 1;
                    return Ok(RowDisposition::Skip);
                }
                continue;
            }

            match (fk.required, fk.missing_strategy) {
                (true, MissingStrategy::Error) => {
                    if options.continue_on_error {
                        outcome.errors.push(RowError::new(
                            RowErrorKind::MissingForeignKey,
                            Some(key.canonical().to_string()),
                            format!("required {} reference not found", fk.dimension),
                        ));
                        *outcome.missing.entry(fk.dimension.as_str().to_string()).or_insert(0) += 1;
                        return Ok(RowDisposition::Skip);
                    }
                    return Err(MergeError::MissingForeignKey(format!(
                        "fact {} row {} references a missing {} dimension",
                        handler.fact, key, fk.dimension
                    )));
                }
                (true, _) => {
                    *outcome.missing.entry(fk.dimension.as_str().to_string()).or_insert(0) += 1;
                    return Ok(RowDisposition::Skip);
                }
                (false, MissingStrategy::Null) => {
                    keys.insert(fk.fact_column.to_string(), None);
                    outcome.fks_nulled += 1;
                }
                (false, _) => {
                    *outcome.missing.entry(fk.dimension.as_str().to_string()).or_insert(0) += 1;
                    return Ok(RowDisposition::Skip);
                }
            }
        }

        Ok(RowDisposition::Keep(keys))
    }

    fn check_error_budget(
        &self,
        result: &FactLoadResult,
        outcome: &BatchOutcome,
        options: &FactLoadOptions,
    ) -> Result<(), MergeError> {
        let errors = result.error_count() + outcome.errors.len() as u64;
        if errors > self.error_policy.max_errors {
            return Err(MergeError::TooManyErrors(format!(
                "{} row errors exceed the budget of {}",
                errors, self.error_policy.max_errors
            )));
        }
        let rows = result.rows_processed + outcome.rows;
        if rows >= options.batch_size as u64 {
            let rate = errors as f64 / rows as f64;
            if rate > self.error_policy.max_error_rate {
                return Err(MergeError::TooManyErrors(format!(
                    "error rate {:.3} exceeds the budget of {:.3}",
                    rate, self.error_policy.max_error_rate
                )));
            }
        }
        Ok(())
    }
}
