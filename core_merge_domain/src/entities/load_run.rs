// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Load Run
//!
//! Read-only view of one upstream ingest recorded in `etl.load_runs`. The
//! merge core consumes these as a precondition check and lineage anchor; it
//! never writes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MergeError;

/// Status of an upstream load run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadRunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl LoadRunStatus {
    pub fn from_str(s: &str) -> Result<Self, MergeError> {
        match s {
            "running" => Ok(LoadRunStatus::Running),
            "completed" => Ok(LoadRunStatus::Completed),
            "failed" => Ok(LoadRunStatus::Failed),
            "cancelled" => Ok(LoadRunStatus::Cancelled),
            other => Err(MergeError::validation_error(format!(
                "unknown load run status '{}'",
                other
            ))),
        }
    }
}

/// One upstream ingest, as recorded by the staging subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRun {
    pub id: Uuid,
    pub status: LoadRunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub file_count: i64,
    pub row_count: i64,
}
