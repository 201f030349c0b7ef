// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Dimension Loader
//!
//! Streams one dimension's staging rows in business-key order, classifies
//! each against the current warehouse version, and applies the SCD2
//! outcome: INSERT a new version, EXPIRE the prior and INSERT, or UPDATE
//! non-significant columns in place.
//!
//! ## Batching & Transactions
//!
//! Rows are processed in batches; each batch runs inside one transaction on
//! one connection so a business key repeated within the batch observes the
//! earlier write. A database failure rolls the batch back; with
//! `continueOnError` the loader records the failure and moves to the next
//! batch on a fresh transaction, otherwise it surfaces the error. Recoverable
//! failures retry with a delay before the batch is declared failed.
//!
//! ## Dry Runs
//!
//! A dry run classifies and counts exactly like a real run but writes
//! nothing; each batch's transaction is rolled back and an in-invocation
//! overlay supplies read-your-writes visibility, so a business key repeated
//! across batches classifies identically to a committed run.
//!
//! ## Failure Semantics
//!
//! Validation and transformation failures are per-row: recorded, skipped,
//! never fatal to the batch. SCD2 invariant violations, cancellation, and
//! the error budget are merge-fatal and surface immediately.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use core_merge_domain::entities::{DimensionLoadResult, DimensionVersion, RowError, RowErrorKind};
use core_merge_domain::handlers::{DimensionHandler, DimensionHandlerRegistry, DimensionType};
use core_merge_domain::repositories::{FieldDescriptor, StagingQuery, StagingRepository};
use core_merge_domain::repositories::DimensionRepository;
use core_merge_domain::services::{ChangeClassifier, ChangeType, Scd2Strategy, ValueNormalizer};
use core_merge_domain::value_objects::{BusinessKey, FieldValue, Lineage, StagingRow};
use core_merge_domain::MergeError;
use uuid::Uuid;

use crate::application::services::row_mapper::map_attributes;
use crate::infrastructure::config::{DimensionConfig, ErrorHandlingConfig};
use crate::infrastructure::runtime::CancellationToken;
use crate::infrastructure::services::ProgressTracker;

/// Per-invocation options for one dimension load.
#[derive(Debug, Clone)]
pub struct DimensionLoadOptions {
    pub batch_size: usize,
    pub enable_scd2: bool,
    pub scd2_strategy: Scd2Strategy,
    pub dry_run: bool,
    pub continue_on_error: bool,
    pub timeout_ms: u64,
}

impl DimensionLoadOptions {
    pub fn from_config(dimension: &DimensionConfig, errors: &ErrorHandlingConfig) -> Self {
        Self {
            batch_size: dimension.batch_size,
            enable_scd2: dimension.enable_scd2,
            scd2_strategy: dimension.scd2_strategy,
            dry_run: false,
            continue_on_error: errors.continue_on_error,
            timeout_ms: dimension.timeout_ms,
        }
    }
}

/// Counters and decisions accumulated for one batch, merged into the load
/// result only when the batch lands.
#[derive(Default)]
struct BatchOutcome {
    rows: u64,
    created: u64,
    updated: u64,
    expired: u64,
    skipped: u64,
    warnings: u64,
    errors: Vec<RowError>,
    /// Dry-run overlay entries decided by this batch.
    overlay: Vec<(BusinessKey, DimensionVersion)>,
}

/// Loads staging rows into one SCD2 dimension.
pub struct DimensionLoader {
    staging: Arc<dyn StagingRepository>,
    dimensions: Arc<dyn DimensionRepository>,
    registry: Arc<DimensionHandlerRegistry>,
    classifier: ChangeClassifier,
    normalizer: ValueNormalizer,
    error_policy: ErrorHandlingConfig,
    progress: Option<Arc<ProgressTracker>>,
    cancel: CancellationToken,
}

impl DimensionLoader {
    pub fn new(
        staging: Arc<dyn StagingRepository>,
        dimensions: Arc<dyn DimensionRepository>,
        registry: Arc<DimensionHandlerRegistry>,
        error_policy: ErrorHandlingConfig,
        progress: Option<Arc<ProgressTracker>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            staging,
            dimensions,
            registry,
            classifier: ChangeClassifier::new(),
            normalizer: ValueNormalizer::new(),
            error_policy,
            progress,
            cancel,
        }
    }

    /// Runs one dimension load for a load run.
    pub async fn load_dimension(
        &self,
        dimension: DimensionType,
        load_run_id: Uuid,
        options: &DimensionLoadOptions,
    ) -> Result<DimensionLoadResult, MergeError> {
        let handler = self.registry.handler(dimension)?;
        let started = Instant::now();
        let mut result = DimensionLoadResult::new(handler.dimension.as_str(), options.dry_run);

        let total = self
            .staging
            .count_rows(handler.source_table, load_run_id)
            .await?;
        info!(
            dimension = %dimension,
            load_run_id = %load_run_id,
            total_rows = total,
            dry_run = options.dry_run,
            "starting dimension load"
        );
        if let Some(progress) = &self.progress {
            progress.begin_target(handler.dimension.as_str(), total);
        }

        let fields: Vec<FieldDescriptor> = handler
            .field_mappings
            .iter()
            .map(|m| FieldDescriptor::new(m.source_field, m.kind))
            .collect();
        let order_by: Vec<String> = handler
            .business_key_fields
            .iter()
            .map(|f| f.to_string())
            .collect();

        // Dry-run read-your-writes overlay, keyed by business key
        let mut overlay: HashMap<BusinessKey, DimensionVersion> = HashMap::new();
        let mut offset = 0u64;

        while offset < total {
            if self.cancel.is_cancelled() {
                return Err(MergeError::Cancelled(format!(
                    "dimension {} load cancelled at row {}",
                    dimension, offset
                )));
            }
            if started.elapsed().as_millis() as u64 > options.timeout_ms {
                return Err(MergeError::TimeoutError(format!(
                    "dimension {} load exceeded {} ms",
                    dimension, options.timeout_ms
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
                .run_batch_with_retries(handler, &rows, load_run_id, options, &overlay, &result)
                .await
            {
                Ok(outcome) => {
                    result.rows_processed += outcome.rows;
                    result.created += outcome.created;
                    result.updated += outcome.updated;
                    result.expired += outcome.expired;
                    result.skipped += outcome.skipped;
                    result.warnings += outcome.warnings;
                    result.errors.extend(outcome.errors);
                    for (key, version) in outcome.overlay {
                        overlay.insert(key, version);
                    }
                    if let Some(progress) = &self.progress {
                        progress.record_rows(rows.len() as u64);
                    }
                }
                Err(err) if err.is_merge_fatal() => return Err(err),
                Err(err) if options.continue_on_error => {
                    warn!(dimension = %dimension, error = %err, "batch failed, continuing with next batch");
                    result.failed_batches += 1;
                }
                Err(err) => return Err(err),
            }
        }

        result.finish(started.elapsed().as_millis() as u64);
        info!(
            dimension = %dimension,
            created = result.created,
            updated = result.updated,
            skipped = result.skipped,
            errors = result.error_count(),
            rows_per_second = result.rows_per_second,
            "dimension load finished"
        );
        Ok(result)
    }

    async fn run_batch_with_retries(
        &self,
        handler: &DimensionHandler,
        rows: &[StagingRow],
        load_run_id: Uuid,
        options: &DimensionLoadOptions,
        overlay: &HashMap<BusinessKey, DimensionVersion>,
        result: &DimensionLoadResult,
    ) -> Result<BatchOutcome, MergeError> {
        let mut attempt = 0u32;
        loop {
            match self
                .apply_batch(handler, rows, load_run_id, options, overlay, result)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_recoverable() && attempt < self.error_policy.max_retries => {
                    attempt += 1;
                    warn!(
                        dimension = %handler.dimension,
                        attempt,
                        error = %err,
                        "recoverable batch failure, retrying"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(
                        self.error_policy.retry_delay_ms,
                    ))
                    .await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Applies one batch inside a single transaction.
    async fn apply_batch(
        &self,
        handler: &DimensionHandler,
        rows: &[StagingRow],
        load_run_id: Uuid,
        options: &DimensionLoadOptions,
        overlay: &HashMap<BusinessKey, DimensionVersion>,
        result: &DimensionLoadResult,
    ) -> Result<BatchOutcome, MergeError> {
        self.dimensions.begin().await?;
        match self
            .process_rows(handler, rows, load_run_id, options, overlay, result)
            .await
        {
            Ok(outcome) => {
                if options.dry_run {
                    self.dimensions.rollback().await?;
                } else {
                    self.dimensions.commit().await?;
                }
                Ok(outcome)
            }
            Err(err) => {
                // Preserve the original failure over any rollback complaint
                if let Err(rollback_err) = self.dimensions.rollback().await {
                    warn!(error = %rollback_err, "rollback after batch failure also failed");
                }
                Err(err)
            }
        }
    }

    async fn process_rows(
        &self,
        handler: &DimensionHandler,
        rows: &[StagingRow],
        load_run_id: Uuid,
        options: &DimensionLoadOptions,
        overlay: &HashMap<BusinessKey, DimensionVersion>,
        result: &DimensionLoadResult,
    ) -> Result<BatchOutcome, MergeError> {
        let mut outcome = BatchOutcome::default();
        // Keys decided earlier in this batch, for dry-run visibility
        let mut batch_overlay: HashMap<BusinessKey, DimensionVersion> = HashMap::new();

        for row in rows {
            // A cancel request rolls the in-flight batch back
            if self.cancel.is_cancelled() {
                return Err(MergeError::Cancelled(format!(
                    "dimension {} batch cancelled",
                    handler.dimension
                )));
            }
            outcome.rows += 1;

            let key = match BusinessKey::from_row(handler.business_key_fields, row) {
                Ok(key) => key,
                Err(err) => {
                    outcome
                        .errors
                        .push(RowError::new(RowErrorKind::BusinessKeyMissing, None, err.to_string()));
                    self.check_error_budget(result, &outcome, options)?;
                    continue;
                }
            };

            let attributes = match map_attributes(&handler.field_mappings, &self.normalizer, row) {
                Ok(attributes) => attributes,
                Err(err @ MergeError::ValidationError(_)) => {
                    // Required-field gaps count as incomplete business data
                    outcome.errors.push(RowError::new(
                        RowErrorKind::BusinessKeyMissing,
                        Some(key.canonical().to_string()),
                        err.to_string(),
                    ));
                    self.check_error_budget(result, &outcome, options)?;
                    continue;
                }
                Err(err @ MergeError::TransformationError(_)) => {
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
            let incoming = DimensionVersion::new_current(
                key.clone(),
                attributes,
                now,
                Lineage::new(load_run_id, now),
            );

            let prior = if options.dry_run {
                match batch_overlay.get(&key).or_else(|| overlay.get(&key)) {
                    Some(version) => Some(version.clone()),
                    None => self.dimensions.find_current(handler, &key).await?,
                }
            } else {
                self.dimensions.find_current(handler, &key).await?
            };

            let change = self.classifier.classify_with_strategy(
                handler,
                prior.as_ref(),
                &incoming,
                options.scd2_strategy,
            );

            match change.change_type {
                ChangeType::New => {
                    if !options.dry_run {
                        self.dimensions.insert_version(handler, &incoming).await?;
                    }
                    outcome.created += 1;
                    debug!(dimension = %handler.dimension, key = %key, "inserted new dimension row");
                    if options.dry_run {
                        batch_overlay.insert(key.clone(), incoming);
                    }
                }
                ChangeType::Updated => {
                    let Some(prior) = prior else {
                        return Err(MergeError::internal_error(
                            "classifier returned UPDATED without a prior version".to_string(),
                        ));
                    };
                    if options.enable_scd2 {
                        if !options.dry_run {
                            let prior_key = prior.surrogate_key().ok_or_else(|| {
                                MergeError::internal_error(
                                    "stored version is missing its surrogate key".to_string(),
                                )
                            })?;
                            self.dimensions.expire_version(handler, prior_key, now).await?;
                            self.dimensions.insert_version(handler, &incoming).await?;
                        }
                        outcome.expired += 1;
                        outcome.updated += 1;
                        debug!(
                            dimension = %handler.dimension,
                            key = %key,
                            score = change.significance_score,
                            "expired prior version and inserted new version"
                        );
                        if options.dry_run {
                            batch_overlay.insert(key.clone(), incoming);
                        }
                    } else {
                        // Versioning disabled: apply every changed mapped
                        // column in place.
                        let changes: BTreeMap<String, FieldValue> = change
                            .attribute_changes
                            .iter()
                            .map(|c| (c.field.clone(), c.incoming.clone()))
                            .collect();
                        if !options.dry_run {
                            let prior_key = prior.surrogate_key().ok_or_else(|| {
                                MergeError::internal_error(
                                    "stored version is missing its surrogate key".to_string(),
                                )
                            })?;
                            self.dimensions
                                .update_in_place(handler, prior_key, &changes, incoming.lineage())
                                .await?;
                        }
                        outcome.updated += 1;
                        if options.dry_run {
                            let mut merged = prior.clone();
                            merged.apply_in_place(&changes, *incoming.lineage());
                            batch_overlay.insert(key.clone(), merged);
                        }
                    }
                }
                ChangeType::NoChange => {
                    let in_place: BTreeMap<String, FieldValue> = change
                        .in_place_changes()
                        .map(|c| (c.field.clone(), c.incoming.clone()))
                        .collect();
                    if in_place.is_empty() {
                        outcome.skipped += 1;
                    } else {
                        let Some(prior) = prior else {
                            return Err(MergeError::internal_error(
                                "classifier returned NO_CHANGE without a prior version".to_string(),
                            ));
                        };
                        if !options.dry_run {
                            let prior_key = prior.surrogate_key().ok_or_else(|| {
                                MergeError::internal_error(
                                    "stored version is missing its surrogate key".to_string(),
                                )
                            })?;
                            self.dimensions
                                .update_in_place(handler, prior_key, &in_place, incoming.lineage())
                                .await?;
                        }
                        outcome.skipped += 1;
                        outcome.warnings += 1;
                        warn!(
                            dimension = %handler.dimension,
                            key = %key,
                            fields = in_place.len(),
                            "non-significant fields updated in place"
                        );
                        if options.dry_run {
                            let mut merged = prior.clone();
                            merged.apply_in_place(&in_place, *incoming.lineage());
                            batch_overlay.insert(key.clone(), merged);
                        }
                    }
                }
            }
        }

        outcome.overlay = batch_overlay.into_iter().collect();
        Ok(outcome)
    }

    /// Enforces the configured error budget.
    fn check_error_budget(
        &self,
        result: &DimensionLoadResult,
        outcome: &BatchOutcome,
        options: &DimensionLoadOptions,
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
