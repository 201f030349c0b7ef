// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Merge Run Repository Port
//!
//! Persistence for `etl.core_merge_runs` audit records. The partial unique
//! index on `(load_run_id, extract_type)` for completed non-dry runs is the
//! database-side idempotency guarantee; `find_completed` is the read side
//! the orchestrator consults first.

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::MergeRun;
use crate::error::MergeError;
use crate::value_objects::MergeRunId;

/// Port over the merge-run audit table.
#[async_trait]
pub trait MergeRunRepository: Send + Sync {
    /// Inserts a freshly started run.
    async fn insert(&self, run: &MergeRun) -> Result<(), MergeError>;

    /// Writes a run's terminal state, counters, and result blob.
    async fn finalize(&self, run: &MergeRun) -> Result<(), MergeError>;

    /// Finds the completed non-dry run for an idempotency key, if any.
    async fn find_completed(
        &self,
        load_run_id: Uuid,
        extract_type: &str,
    ) -> Result<Option<MergeRun>, MergeError>;

    /// Marks a completed run as superseded ahead of a forced reprocess,
    /// freeing its idempotency key while keeping the audit history.
    async fn supersede(&self, merge_run_id: MergeRunId) -> Result<(), MergeError>;

    /// Trivial round-trip query against the warehouse.
    async fn health_check(&self) -> Result<bool, MergeError>;
}
