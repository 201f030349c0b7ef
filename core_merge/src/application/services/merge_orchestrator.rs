// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Merge Orchestrator
//!
//! Drives one core merge end to end: resolve the load run, check
//! idempotency, open the audit run, load dimensions in dependency order,
//! warm the FK cache, load facts, and finalise the audit run.
//!
//! ## Phases
//!
//! 1. **Preconditions**: the load run must exist; a completed non-dry run
//!    for the same `(loadRunId, extractType)` returns its stored result
//!    without side effects unless `forceReprocess` is set.
//! 2. **Dimensions**: practice first (patient and provider reference it),
//!    then patient and provider, then vaccine and medicine.
//! 3. **Cache warmup**: one preload between phases; the cache is not
//!    refreshed mid-fact-phase.
//! 4. **Facts**: appointment first, then the remaining facts.
//! 5. **Finalisation**: terminal status, counters, result blob, duration.
//!    Terminal states are immutable.
//!
//! A load failure fails the audit run but still returns the counters that
//! committed before the failing batch.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use core_merge_domain::entities::{
    DimensionLoadResult, FactLoadResult, LoadRun, MergeCounters, MergeRun, MergeRunStatus,
};
use core_merge_domain::handlers::{
    DimensionHandlerRegistry, DimensionType, FactHandlerRegistry, FactType,
};
use core_merge_domain::repositories::{LoadRunRepository, MergeRunRepository};
use core_merge_domain::value_objects::MergeRunId;
use core_merge_domain::MergeError;

use crate::application::services::dimension_loader::{DimensionLoadOptions, DimensionLoader};
use crate::application::services::fact_loader::{FactLoadOptions, FactLoader};
use crate::application::services::fk_resolver::FkResolver;
use crate::infrastructure::config::MergeConfig;
use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::services::{MergePhase, ProgressTracker};

/// Fixed dimension load order: practice before the dimensions that
/// reference it, reference data last.
pub const DIMENSION_LOAD_ORDER: [DimensionType; 5] = [
    DimensionType::Practice,
    DimensionType::Patient,
    DimensionType::Provider,
    DimensionType::Vaccine,
    DimensionType::Medicine,
];

/// Fixed fact load order, appointment first.
pub const FACT_LOAD_ORDER: [FactType; 6] = [
    FactType::Appointment,
    FactType::Immunisation,
    FactType::Invoice,
    FactType::InvoiceDetail,
    FactType::Diagnosis,
    FactType::Measurement,
];

/// Caller-facing options for one merge invocation.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub load_run_id: Uuid,
    /// Restrict the merge to these extract types; `None` merges everything.
    pub extract_types: Option<Vec<String>>,
    pub dry_run: bool,
    pub force_reprocess: bool,
    /// Overrides both loaders' configured batch sizes.
    pub batch_size: Option<usize>,
}

impl MergeOptions {
    pub fn new(load_run_id: Uuid) -> Self {
        Self {
            load_run_id,
            extract_types: None,
            dry_run: false,
            force_reprocess: false,
            batch_size: None,
        }
    }
}

/// Full outcome of one merge invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResult {
    pub merge_run_id: MergeRunId,
    pub load_run_id: Uuid,
    pub extract_types: Vec<String>,
    pub status: MergeRunStatus,
    pub dimensions: BTreeMap<String, DimensionLoadResult>,
    pub facts: BTreeMap<String, FactLoadResult>,
    pub counters: MergeCounters,
    pub total_errors: u64,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub dry_run: bool,
    /// True when this is a stored result returned by the idempotency check.
    #[serde(default)]
    pub from_cache: bool,
}

/// Drives dimension and fact loads for one load run.
pub struct MergeOrchestrator {
    load_runs: Arc<dyn LoadRunRepository>,
    merge_runs: Arc<dyn MergeRunRepository>,
    dimension_loader: Arc<DimensionLoader>,
    fact_loader: Arc<FactLoader>,
    resolver: Arc<FkResolver>,
    dimension_registry: Arc<DimensionHandlerRegistry>,
    fact_registry: Arc<FactHandlerRegistry>,
    config: MergeConfig,
    progress: Option<Arc<ProgressTracker>>,
    metrics: Option<Arc<MetricsService>>,
}

impl MergeOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        load_runs: Arc<dyn LoadRunRepository>,
        merge_runs: Arc<dyn MergeRunRepository>,
        dimension_loader: Arc<DimensionLoader>,
        fact_loader: Arc<FactLoader>,
        resolver: Arc<FkResolver>,
        dimension_registry: Arc<DimensionHandlerRegistry>,
        fact_registry: Arc<FactHandlerRegistry>,
        config: MergeConfig,
        progress: Option<Arc<ProgressTracker>>,
        metrics: Option<Arc<MetricsService>>,
    ) -> Result<Self, MergeError> {
        dimension_registry.validate()?;
        fact_registry.validate()?;
        config.validate()?;
        Ok(Self {
            load_runs,
            merge_runs,
            dimension_loader,
            fact_loader,
            resolver,
            dimension_registry,
            fact_registry,
            config,
            progress,
            metrics,
        })
    }

    /// Runs one merge. Load failures finalise the audit run as failed and
    /// are reported through the returned result's status; precondition and
    /// audit-infrastructure failures surface as errors.
    pub async fn merge_to_core(&self, options: MergeOptions) -> Result<MergeResult, MergeError> {
        let load_run = self.resolve_load_run(options.load_run_id).await?;
        let requested = self.requested_extract_types(&options)?;
        let extract_key = canonical_extract_key(&requested);

        // Idempotency: a completed non-dry run is authoritative
        if !options.dry_run {
            if let Some(previous) = self
                .merge_runs
                .find_completed(options.load_run_id, &extract_key)
                .await?
            {
                if options.force_reprocess {
                    // Free the idempotency key, keep the audit history
                    self.merge_runs.supersede(previous.id()).await?;
                    warn!(
                        load_run_id = %options.load_run_id,
                        superseded = %previous.id(),
                        "forced reprocess superseded the previous completed run"
                    );
                } else {
                    info!(
                        load_run_id = %options.load_run_id,
                        extract_type = %extract_key,
                        merge_run_id = %previous.id(),
                        "merge already completed, returning stored result"
                    );
                    return stored_result(&previous);
                }
            }
        }

        let mut run = MergeRun::start(load_run.id, extract_key.clone(), options.dry_run);
        self.merge_runs.insert(&run).await?;
        info!(
            merge_run_id = %run.id(),
            load_run_id = %load_run.id,
            extract_types = ?requested,
            dry_run = options.dry_run,
            "merge run started"
        );

        match self.run_phases(&options, &requested).await {
            Ok((dimensions, facts)) => {
                let counters = aggregate_counters(&dimensions, &facts);
                let completed_at = Utc::now();
                let mut result = MergeResult {
                    merge_run_id: run.id(),
                    load_run_id: load_run.id,
                    extract_types: requested,
                    status: MergeRunStatus::Completed,
                    total_errors: total_errors(&dimensions, &facts),
                    dimensions,
                    facts,
                    counters,
                    error: None,
                    started_at: run.started_at(),
                    completed_at,
                    duration_ms: (completed_at - run.started_at()).num_milliseconds().max(0) as u64,
                    dry_run: options.dry_run,
                    from_cache: false,
                };
                let blob = serde_json::to_value(&result)?;
                run.complete(counters, blob)?;
                self.merge_runs.finalize(&run).await?;
                result.completed_at = run.completed_at().unwrap_or(completed_at);
                if let Some(progress) = &self.progress {
                    progress.begin_phase(MergePhase::Finalising);
                }
                if let Some(metrics) = &self.metrics {
                    metrics.record_merge_completed();
                }
                info!(merge_run_id = %run.id(), "merge run completed");
                Ok(result)
            }
            Err((err, dimensions, facts)) => {
                error!(merge_run_id = %run.id(), error = %err, "merge run failed");
                let counters = aggregate_counters(&dimensions, &facts);
                run.fail(counters, err.to_string())?;
                self.merge_runs.finalize(&run).await?;
                if let Some(metrics) = &self.metrics {
                    metrics.record_merge_failed();
                }
                let completed_at = run.completed_at().unwrap_or_else(Utc::now);
                Ok(MergeResult {
                    merge_run_id: run.id(),
                    load_run_id: load_run.id,
                    extract_types: requested,
                    status: MergeRunStatus::Failed,
                    total_errors: total_errors(&dimensions, &facts),
                    dimensions,
                    facts,
                    counters,
                    error: Some(err.to_string()),
                    started_at: run.started_at(),
                    completed_at,
                    duration_ms: (completed_at - run.started_at()).num_milliseconds().max(0) as u64,
                    dry_run: options.dry_run,
                    from_cache: false,
                })
            }
        }
    }

    /// Succeeds iff a trivial round-trip query to the warehouse succeeds.
    pub async fn health_check(&self) -> Result<bool, MergeError> {
        self.merge_runs.health_check().await
    }

    async fn resolve_load_run(&self, load_run_id: Uuid) -> Result<LoadRun, MergeError> {
        self.load_runs
            .find(load_run_id)
            .await?
            .ok_or_else(|| MergeError::LoadRunNotFound(load_run_id.to_string()))
    }

    /// The extract types this merge covers, in no particular order.
    fn requested_extract_types(&self, options: &MergeOptions) -> Result<Vec<String>, MergeError> {
        let known: Vec<&'static str> = self
            .dimension_registry
            .handlers()
            .map(|h| h.extract_type)
            .chain(self.fact_registry.handlers().map(|h| h.extract_type))
            .collect();

        match &options.extract_types {
            None => Ok(known.iter().map(|s| s.to_string()).collect()),
            Some(requested) => {
                let mut accepted = Vec::new();
                for extract in requested {
                    if known.contains(&extract.as_str()) {
                        accepted.push(extract.clone());
                    } else {
                        warn!(extract_type = %extract, "unknown extract type requested, ignoring");
                    }
                }
                if accepted.is_empty() {
                    return Err(MergeError::precondition(
                        "no known extract types requested".to_string(),
                    ));
                }
                Ok(accepted)
            }
        }
    }

    /// Phases A through C. On failure, returns the error together with
    /// whatever per-target results had already committed.
    #[allow(clippy::type_complexity)]
    async fn run_phases(
        &self,
        options: &MergeOptions,
        requested: &[String],
    ) -> Result<
        (BTreeMap<String, DimensionLoadResult>, BTreeMap<String, FactLoadResult>),
        (MergeError, BTreeMap<String, DimensionLoadResult>, BTreeMap<String, FactLoadResult>),
    > {
        let mut dimensions = BTreeMap::new();
        let mut facts = BTreeMap::new();

        // Phase A: dimensions in dependency order
        if let Some(progress) = &self.progress {
            progress.begin_phase(MergePhase::Dimensions);
        }
        let mut dim_options =
            DimensionLoadOptions::from_config(&self.config.dimension, &self.config.error_handling);
        dim_options.dry_run = options.dry_run;
        if let Some(batch_size) = options.batch_size {
            dim_options.batch_size = batch_size;
        }

        for dimension in DIMENSION_LOAD_ORDER {
            let extract = match self.dimension_registry.handler(dimension) {
                Ok(handler) => handler.extract_type,
                Err(err) => return Err((err, dimensions, facts)),
            };
            if !requested.iter().any(|e| e == extract) {
                continue;
            }
            match self
                .dimension_loader
                .load_dimension(dimension, options.load_run_id, &dim_options)
                .await
            {
                Ok(result) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_dimension_load(&result);
                    }
                    dimensions.insert(dimension.as_str().to_string(), result);
                }
                Err(err) => return Err((err, dimensions, facts)),
            }
        }

        // Phase B: warm the FK cache once between phases
        if let Some(progress) = &self.progress {
            progress.begin_phase(MergePhase::CacheWarmup);
        }
        match self.resolver.preload(None).await {
            Ok(loaded) => {
                info!(entries = loaded, "FK cache preloaded");
                if let Some(metrics) = &self.metrics {
                    metrics.set_cache_entries(self.resolver.cache_entries());
                }
            }
            Err(err) => return Err((err, dimensions, facts)),
        }

        // Phase C: facts, appointment first
        if let Some(progress) = &self.progress {
            progress.begin_phase(MergePhase::Facts);
        }
        let mut fact_options =
            FactLoadOptions::from_config(&self.config.fact, &self.config.error_handling);
        fact_options.dry_run = options.dry_run;
        if let Some(batch_size) = options.batch_size {
            fact_options.batch_size = batch_size;
        }

        for fact in FACT_LOAD_ORDER {
            let extract = match self.fact_registry.handler(fact) {
                Ok(handler) => handler.extract_type,
                Err(err) => return Err((err, dimensions, facts)),
            };
            if !requested.iter().any(|e| e == extract) {
                continue;
            }
            match self
                .fact_loader
                .load_facts(fact, options.load_run_id, &fact_options)
                .await
            {
                Ok(result) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_fact_load(&result);
                    }
                    facts.insert(fact.as_str().to_string(), result);
                }
                Err(err) => return Err((err, dimensions, facts)),
            }
        }

        Ok((dimensions, facts))
    }
}

/// Canonical audit form of a requested extract set: sorted and
/// comma-joined, `all` when nothing was restricted.
fn canonical_extract_key(requested: &[String]) -> String {
    let known_total = DIMENSION_LOAD_ORDER.len() + FACT_LOAD_ORDER.len();
    if requested.len() == known_total {
        return "all".to_string();
    }
    let mut sorted: Vec<String> = requested.to_vec();
    sorted.sort();
    sorted.join(",")
}

fn aggregate_counters(
    dimensions: &BTreeMap<String, DimensionLoadResult>,
    facts: &BTreeMap<String, FactLoadResult>,
) -> MergeCounters {
    MergeCounters {
        dimensions_created: dimensions.values().map(|r| r.created).sum(),
        dimensions_updated: dimensions.values().map(|r| r.updated).sum(),
        facts_inserted: facts.values().map(|r| r.inserted).sum(),
        facts_updated: facts.values().map(|r| r.updated).sum(),
    }
}

fn total_errors(
    dimensions: &BTreeMap<String, DimensionLoadResult>,
    facts: &BTreeMap<String, FactLoadResult>,
) -> u64 {
    dimensions.values().map(|r| r.error_count()).sum::<u64>()
        + facts.values().map(|r| r.error_count()).sum::<u64>()
}

/// Rebuilds a caller-facing result from a stored completed run.
fn stored_result(run: &MergeRun) -> Result<MergeResult, MergeError> {
    if let Some(blob) = run.result() {
        let mut result: MergeResult = serde_json::from_value(blob.clone())?;
        result.from_cache = true;
        return Ok(result);
    }
    // Older audit rows may lack the blob; reconstruct the summary
    Ok(MergeResult {
        merge_run_id: run.id(),
        load_run_id: run.load_run_id(),
        extract_types: run.extract_type().split(',').map(|s| s.to_string()).collect(),
        status: run.status(),
        dimensions: BTreeMap::new(),
        facts: BTreeMap::new(),
        counters: *run.counters(),
        total_errors: 0,
        error: run.error().map(|e| e.to_string()),
        started_at: run.started_at(),
        completed_at: run.completed_at().unwrap_or_else(Utc::now),
        duration_ms: run.duration_ms().unwrap_or(0).max(0) as u64,
        dry_run: run.dry_run(),
        from_cache: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_key_is_sorted_and_joined() {
        let key = canonical_extract_key(&["patient".to_string(), "appointment".to_string()]);
        assert_eq!(key, "appointment,patient");
    }

    #[test]
    fn full_extract_set_keys_as_all() {
        let all: Vec<String> = DIMENSION_LOAD_ORDER
            .iter()
            .map(|d| d.as_str().to_string())
            .chain(FACT_LOAD_ORDER.iter().map(|f| f.as_str().to_string()))
            .collect();
        assert_eq!(canonical_extract_key(&all), "all");
    }
}
