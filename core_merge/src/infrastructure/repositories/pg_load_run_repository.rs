// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Read-only adapter over `etl.load_runs`, the external staging audit table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use core_merge_domain::entities::{LoadRun, LoadRunStatus};
use core_merge_domain::repositories::LoadRunRepository;
use core_merge_domain::MergeError;

use super::sql::classify_sqlx_error;

pub struct PgLoadRunRepository {
    pool: PgPool,
}

impl PgLoadRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoadRunRepository for PgLoadRunRepository {
    async fn find(&self, load_run_id: Uuid) -> Result<Option<LoadRun>, MergeError> {
        let row = sqlx::query(
            "SELECT load_run_id, status, started_at, completed_at, file_count, row_count \
             FROM etl.load_runs WHERE load_run_id = $1",
        )
        .bind(load_run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: Uuid = row
            .try_get("load_run_id")
            .map_err(|e| MergeError::database_error(format!("failed to decode load_run_id: {}", e)))?;
        let status: String = row
            .try_get("status")
            .map_err(|e| MergeError::database_error(format!("failed to decode status: {}", e)))?;
        let started_at: DateTime<Utc> = row
            .try_get("started_at")
            .map_err(|e| MergeError::database_error(format!("failed to decode started_at: {}", e)))?;
        let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").unwrap_or(None);
        let file_count: i64 = row.try_get("file_count").unwrap_or(0);
        let row_count: i64 = row.try_get("row_count").unwrap_or(0);

        Ok(Some(LoadRun {
            id,
            status: LoadRunStatus::from_str(&status)?,
            started_at,
            completed_at,
            file_count,
            row_count,
        }))
    }
}
