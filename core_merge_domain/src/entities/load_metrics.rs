// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Load Results & Metrics
//!
//! Counter and error records returned by the dimension and fact loaders.
//! Per-row errors accumulate here with their taxonomy kind and offending
//! business key; batch failures are counted separately because their rows
//! were rolled back and are not reflected in the committed counters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Taxonomy kind of a per-row error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowErrorKind {
    BusinessKeyMissing,
    BusinessKeyConflict,
    TransformationError,
    MissingForeignKey,
}

impl RowErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowErrorKind::BusinessKeyMissing => "business_key_missing",
            RowErrorKind::BusinessKeyConflict => "business_key_conflict",
            RowErrorKind::TransformationError => "transformation_error",
            RowErrorKind::MissingForeignKey => "missing_foreign_key",
        }
    }
}

/// One recorded per-row failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub kind: RowErrorKind,
    /// Canonical business key of the offending row, where one could be built.
    pub business_key: Option<String>,
    pub message: String,
}

impl RowError {
    pub fn new(kind: RowErrorKind, business_key: Option<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            business_key,
            message: message.into(),
        }
    }
}

/// Result of one dimension load invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DimensionLoadResult {
    pub dimension: String,
    pub rows_processed: u64,
    /// New business keys inserted.
    pub created: u64,
    /// New versions inserted for existing keys.
    pub updated: u64,
    /// Prior versions whose effective range was closed.
    pub expired: u64,
    /// Rows classified NO_CHANGE (including in-place updates).
    pub skipped: u64,
    /// In-place updates of non-significant columns.
    pub warnings: u64,
    pub errors: Vec<RowError>,
    /// Batches rolled back by a database failure.
    pub failed_batches: u64,
    pub duration_ms: u64,
    pub rows_per_second: f64,
    pub dry_run: bool,
}

impl DimensionLoadResult {
    pub fn new(dimension: impl Into<String>, dry_run: bool) -> Self {
        Self {
            dimension: dimension.into(),
            dry_run,
            ..Default::default()
        }
    }

    pub fn error_count(&self) -> u64 {
        self.errors.len() as u64
    }

    /// Running error rate over rows seen so far.
    pub fn error_rate(&self) -> f64 {
        if self.rows_processed == 0 {
            return 0.0;
        }
        self.error_count() as f64 / self.rows_processed as f64
    }

    /// Stamps the duration and derives the throughput figure.
    pub fn finish(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
        self.rows_per_second = if duration_ms == 0 {
            self.rows_processed as f64
        } else {
            self.rows_processed as f64 * 1000.0 / duration_ms as f64
        };
    }
}

/// Result of one fact load invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactLoadResult {
    pub fact: String,
    pub rows_processed: u64,
    pub inserted: u64,
    pub updated: u64,
    /// Rows skipped by validation or missing-FK policy.
    pub skipped: u64,
    pub errors: Vec<RowError>,
    /// Unresolved required relationships, per dimension type.
    pub missing_fk_summary: BTreeMap<String, u64>,
    /// Optional relationships resolved to NULL.
    pub fks_nulled: u64,
    pub failed_batches: u64,
    pub duration_ms: u64,
    pub rows_per_second: f64,
    pub dry_run: bool,
}

impl FactLoadResult {
    pub fn new(fact: impl Into<String>, dry_run: bool) -> Self {
        Self {
            fact: fact.into(),
            dry_run,
            ..Default::default()
        }
    }

    pub fn error_count(&self) -> u64 {
        self.errors.len() as u64
    }

    pub fn error_rate(&self) -> f64 {
        if self.rows_processed == 0 {
            return 0.0;
        }
        self.error_count() as f64 / self.rows_processed as f64
    }

    pub fn record_missing_fk(&mut self, dimension: &str) {
        *self
            .missing_fk_summary
            .entry(dimension.to_string())
            .or_insert(0) += 1;
    }

    pub fn finish(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms;
        self.rows_per_second = if duration_ms == 0 {
            self.rows_processed as f64
        } else {
            self.rows_processed as f64 * 1000.0 / duration_ms as f64
        };
    }
}
