// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Merge Run
//!
//! The audit record for one core-merge invocation, persisted in
//! `etl.core_merge_runs`. A run is created `running`, finalised exactly once
//! as `completed` or `failed`, and terminal states are immutable. Completed
//! non-dry runs are the idempotency anchors: at most one exists per
//! `(load_run_id, extract_type)`, enforced by a partial unique index.
//!
//! ## State Machine
//!
//! ```text
//! running ──► completed ──► superseded (forced reprocess only)
//!    │
//!    └─────► failed
//! ```
//!
//! The entity only transitions out of `running`; the superseded mark is a
//! repository-level operation that frees the idempotency key when a forced
//! reprocess replaces a completed run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MergeError;
use crate::value_objects::MergeRunId;

/// Lifecycle status of a merge run.
///
/// `Superseded` marks an old completed run that a forced reprocess
/// replaced; it keeps the audit history while freeing the idempotency key
/// for the new run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeRunStatus {
    Running,
    Completed,
    Failed,
    Superseded,
}

impl MergeRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeRunStatus::Running => "running",
            MergeRunStatus::Completed => "completed",
            MergeRunStatus::Failed => "failed",
            MergeRunStatus::Superseded => "superseded",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, MergeError> {
        match s {
            "running" => Ok(MergeRunStatus::Running),
            "completed" => Ok(MergeRunStatus::Completed),
            "failed" => Ok(MergeRunStatus::Failed),
            "superseded" => Ok(MergeRunStatus::Superseded),
            other => Err(MergeError::validation_error(format!(
                "unknown merge run status '{}'",
                other
            ))),
        }
    }
}

/// Aggregate counters accumulated across all loads of one merge run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeCounters {
    pub dimensions_created: u64,
    pub dimensions_updated: u64,
    pub facts_inserted: u64,
    pub facts_updated: u64,
}

/// Audit record for one merge invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRun {
    id: MergeRunId,
    load_run_id: Uuid,
    extract_type: String,
    status: MergeRunStatus,
    counters: MergeCounters,
    error: Option<String>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    result: Option<serde_json::Value>,
    dry_run: bool,
}

impl MergeRun {
    /// Opens a new run in the `running` state.
    pub fn start(load_run_id: Uuid, extract_type: impl Into<String>, dry_run: bool) -> Self {
        Self {
            id: MergeRunId::new(),
            load_run_id,
            extract_type: extract_type.into(),
            status: MergeRunStatus::Running,
            counters: MergeCounters::default(),
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            result: None,
            dry_run,
        }
    }

    /// Rehydrates a run read back from the audit table.
    #[allow(clippy::too_many_arguments)]
    pub fn from_store(
        id: MergeRunId,
        load_run_id: Uuid,
        extract_type: String,
        status: MergeRunStatus,
        counters: MergeCounters,
        error: Option<String>,
        started_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        result: Option<serde_json::Value>,
        dry_run: bool,
    ) -> Self {
        Self {
            id,
            load_run_id,
            extract_type,
            status,
            counters,
            error,
            started_at,
            completed_at,
            result,
            dry_run,
        }
    }

    pub fn id(&self) -> MergeRunId {
        self.id
    }

    pub fn load_run_id(&self) -> Uuid {
        self.load_run_id
    }

    pub fn extract_type(&self) -> &str {
        &self.extract_type
    }

    pub fn status(&self) -> MergeRunStatus {
        self.status
    }

    pub fn counters(&self) -> &MergeCounters {
        &self.counters
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    fn ensure_running(&self) -> Result<(), MergeError> {
        if self.status != MergeRunStatus::Running {
            return Err(MergeError::validation_error(format!(
                "merge run {} is terminal ({}), cannot transition",
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }

    /// Finalises the run as `completed` with its counters and result blob.
    pub fn complete(
        &mut self,
        counters: MergeCounters,
        result: serde_json::Value,
    ) -> Result<(), MergeError> {
        self.ensure_running()?;
        self.status = MergeRunStatus::Completed;
        self.counters = counters;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Finalises the run as `failed`, keeping whatever counters committed.
    pub fn fail(&mut self, counters: MergeCounters, error: impl Into<String>) -> Result<(), MergeError> {
        self.ensure_running()?;
        self.status = MergeRunStatus::Failed;
        self.counters = counters;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}
