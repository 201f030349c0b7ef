// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Staging Repository Port
//!
//! Read-only access to validated `stg.*` rows joined to the load-run-files
//! audit table. Loaders page through rows in business-key order so batch
//! boundaries and row ordering stay deterministic across runs.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::MergeError;
use crate::value_objects::{FieldKind, StagingRow};

/// A typed column the query should project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// One paged read over a staging table for a load run.
#[derive(Debug, Clone)]
pub struct StagingQuery {
    /// Qualified staging table, e.g. `stg.patients`.
    pub source_table: String,
    pub load_run_id: Uuid,
    /// Columns to project, with their declared kinds.
    pub fields: Vec<FieldDescriptor>,
    /// Ordering columns (the business key) for deterministic paging.
    pub order_by: Vec<String>,
    pub offset: u64,
    pub limit: u64,
}

/// Port over the staging subsystem's output tables.
#[async_trait]
pub trait StagingRepository: Send + Sync {
    /// Counts the rows one load run contributed to a staging table.
    async fn count_rows(&self, source_table: &str, load_run_id: Uuid) -> Result<u64, MergeError>;

    /// Fetches one page of rows in the query's declared order.
    async fn fetch_page(&self, query: &StagingQuery) -> Result<Vec<StagingRow>, MergeError>;
}
