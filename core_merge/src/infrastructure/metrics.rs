// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Service
//!
//! Prometheus metrics for merge observability: per-dimension and per-fact
//! outcome counters, batch duration histogram, error totals, and the FK
//! cache gauge. The service owns its registry so embedding hosts can
//! scrape or export it however they like.

use std::sync::Arc;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use core_merge_domain::entities::{DimensionLoadResult, FactLoadResult};
use core_merge_domain::MergeError;

/// Prometheus counters and gauges for the merge engine.
pub struct MetricsService {
    registry: Arc<Registry>,

    dimension_rows_total: IntCounterVec,
    fact_rows_total: IntCounterVec,
    row_errors_total: IntCounter,
    failed_batches_total: IntCounter,
    batch_duration_seconds: Histogram,
    cache_entries: IntGauge,
    merges_completed_total: IntCounter,
    merges_failed_total: IntCounter,
}

impl MetricsService {
    pub fn new() -> Result<Self, MergeError> {
        let registry = Registry::new();

        let dimension_rows_total = IntCounterVec::new(
            Opts::new(
                "core_merge_dimension_rows_total",
                "Dimension rows by dimension and outcome",
            ),
            &["dimension", "outcome"],
        )
        .map_err(|e| MergeError::internal_error(format!("metrics init failed: {}", e)))?;

        let fact_rows_total = IntCounterVec::new(
            Opts::new("core_merge_fact_rows_total", "Fact rows by fact and outcome"),
            &["fact", "outcome"],
        )
        .map_err(|e| MergeError::internal_error(format!("metrics init failed: {}", e)))?;

        let row_errors_total = IntCounter::with_opts(Opts::new(
            "core_merge_row_errors_total",
            "Per-row errors recorded across all loads",
        ))
        .map_err(|e| MergeError::internal_error(format!("metrics init failed: {}", e)))?;

        let failed_batches_total = IntCounter::with_opts(Opts::new(
            "core_merge_failed_batches_total",
            "Batches rolled back by database failures",
        ))
        .map_err(|e| MergeError::internal_error(format!("metrics init failed: {}", e)))?;

        let batch_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "core_merge_batch_duration_seconds",
                "Wall time of committed batches",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )
        .map_err(|e| MergeError::internal_error(format!("metrics init failed: {}", e)))?;

        let cache_entries = IntGauge::with_opts(Opts::new(
            "core_merge_fk_cache_entries",
            "Entries currently held by the FK cache",
        ))
        .map_err(|e| MergeError::internal_error(format!("metrics init failed: {}", e)))?;

        let merges_completed_total = IntCounter::with_opts(Opts::new(
            "core_merge_runs_completed_total",
            "Merge runs finalised as completed",
        ))
        .map_err(|e| MergeError::internal_error(format!("metrics init failed: {}", e)))?;

        let merges_failed_total = IntCounter::with_opts(Opts::new(
            "core_merge_runs_failed_total",
            "Merge runs finalised as failed",
        ))
        .map_err(|e| MergeError::internal_error(format!("metrics init failed: {}", e)))?;

        for collector in [
            Box::new(dimension_rows_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(fact_rows_total.clone()),
            Box::new(row_errors_total.clone()),
            Box::new(failed_batches_total.clone()),
            Box::new(batch_duration_seconds.clone()),
            Box::new(cache_entries.clone()),
            Box::new(merges_completed_total.clone()),
            Box::new(merges_failed_total.clone()),
        ] {
            registry
                .register(collector)
                .map_err(|e| MergeError::internal_error(format!("metrics registration failed: {}", e)))?;
        }

        Ok(Self {
            registry: Arc::new(registry),
            dimension_rows_total,
            fact_rows_total,
            row_errors_total,
            failed_batches_total,
            batch_duration_seconds,
            cache_entries,
            merges_completed_total,
            merges_failed_total,
        })
    }

    /// Folds one dimension load result into the counters.
    pub fn record_dimension_load(&self, result: &DimensionLoadResult) {
        let dim = result.dimension.as_str();
        self.dimension_rows_total
            .with_label_values(&[dim, "created"])
            .inc_by(result.created);
        self.dimension_rows_total
            .with_label_values(&[dim, "updated"])
            .inc_by(result.updated);
        self.dimension_rows_total
            .with_label_values(&[dim, "expired"])
            .inc_by(result.expired);
        self.dimension_rows_total
            .with_label_values(&[dim, "skipped"])
            .inc_by(result.skipped);
        self.row_errors_total.inc_by(result.error_count());
        self.failed_batches_total.inc_by(result.failed_batches);
    }

    /// Folds one fact load result into the counters.
    pub fn record_fact_load(&self, result: &FactLoadResult) {
        let fact = result.fact.as_str();
        self.fact_rows_total
            .with_label_values(&[fact, "inserted"])
            .inc_by(result.inserted);
        self.fact_rows_total
            .with_label_values(&[fact, "updated"])
            .inc_by(result.updated);
        self.fact_rows_total
            .with_label_values(&[fact, "skipped"])
            .inc_by(result.skipped);
        self.row_errors_total.inc_by(result.error_count());
        self.failed_batches_total.inc_by(result.failed_batches);
    }

    pub fn observe_batch_duration(&self, duration: std::time::Duration) {
        self.batch_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn set_cache_entries(&self, entries: usize) {
        self.cache_entries.set(entries as i64);
    }

    pub fn record_merge_completed(&self) {
        self.merges_completed_total.inc();
    }

    pub fn record_merge_failed(&self) {
        self.merges_failed_total.inc();
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn gather(&self) -> Result<String, MergeError> {
        let encoder = TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .map_err(|e| MergeError::internal_error(format!("metrics encoding failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_load_results() {
        let metrics = MetricsService::new().unwrap();
        let mut result = DimensionLoadResult::new("patient", false);
        result.created = 3;
        result.skipped = 2;
        metrics.record_dimension_load(&result);
        let rendered = metrics.gather().unwrap();
        assert!(rendered.contains("core_merge_dimension_rows_total"));
        assert!(rendered.contains("patient"));
    }

    #[test]
    fn cache_gauge_tracks_entries() {
        let metrics = MetricsService::new().unwrap();
        metrics.set_cache_entries(42);
        let rendered = metrics.gather().unwrap();
        assert!(rendered.contains("core_merge_fk_cache_entries 42"));
    }
}
