// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # PostgreSQL Merge Run Repository
//!
//! Audit records in `etl.core_merge_runs`. The table carries a partial
//! unique index on `(load_run_id, extract_type)` for completed non-dry
//! runs, which makes the completed row the durable idempotency anchor even
//! if two processes race the orchestrator's read-side check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use core_merge_domain::entities::{MergeCounters, MergeRun, MergeRunStatus};
use core_merge_domain::repositories::MergeRunRepository;
use core_merge_domain::value_objects::MergeRunId;
use core_merge_domain::MergeError;

use super::sql::classify_sqlx_error;

/// Merge-run adapter over one warehouse pool.
pub struct PgMergeRunRepository {
    pool: PgPool,
}

impl PgMergeRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_run(row: &sqlx::postgres::PgRow) -> Result<MergeRun, MergeError> {
        let id: Uuid = row
            .try_get("merge_run_id")
            .map_err(|e| MergeError::database_error(format!("failed to decode merge_run_id: {}", e)))?;
        let load_run_id: Uuid = row
            .try_get("load_run_id")
            .map_err(|e| MergeError::database_error(format!("failed to decode load_run_id: {}", e)))?;
        let extract_type: String = row
            .try_get("extract_type")
            .map_err(|e| MergeError::database_error(format!("failed to decode extract_type: {}", e)))?;
        let status: String = row
            .try_get("status")
            .map_err(|e| MergeError::database_error(format!("failed to decode status: {}", e)))?;
        let counters = MergeCounters {
            dimensions_created: row.try_get::<i64, _>("dimensions_created").unwrap_or(0) as u64,
            dimensions_updated: row.try_get::<i64, _>("dimensions_updated").unwrap_or(0) as u64,
            facts_inserted: row.try_get::<i64, _>("facts_inserted").unwrap_or(0) as u64,
            facts_updated: row.try_get::<i64, _>("facts_updated").unwrap_or(0) as u64,
        };
        let error: Option<String> = row.try_get("error").unwrap_or(None);
        let started_at: DateTime<Utc> = row
            .try_get("started_at")
            .map_err(|e| MergeError::database_error(format!("failed to decode started_at: {}", e)))?;
        let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").unwrap_or(None);
        let result: Option<serde_json::Value> = row.try_get("result").unwrap_or(None);
        let dry_run: bool = row.try_get("dry_run").unwrap_or(false);

        Ok(MergeRun::from_store(
            MergeRunId::from_uuid(id),
            load_run_id,
            extract_type,
            MergeRunStatus::from_str(&status)?,
            counters,
            error,
            started_at,
            completed_at,
            result,
            dry_run,
        ))
    }
}

#[async_trait]
impl MergeRunRepository for PgMergeRunRepository {
    async fn insert(&self, run: &MergeRun) -> Result<(), MergeError> {
        sqlx::query(
            "INSERT INTO etl.core_merge_runs \
             (merge_run_id, load_run_id, extract_type, status, dimensions_created, \
              dimensions_updated, facts_inserted, facts_updated, started_at, dry_run) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(run.id().as_uuid())
        .bind(run.load_run_id())
        .bind(run.extract_type())
        .bind(run.status().as_str())
        .bind(run.counters().dimensions_created as i64)
        .bind(run.counters().dimensions_updated as i64)
        .bind(run.counters().facts_inserted as i64)
        .bind(run.counters().facts_updated as i64)
        .bind(run.started_at())
        .bind(run.dry_run())
        .execute(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn finalize(&self, run: &MergeRun) -> Result<(), MergeError> {
        let affected = sqlx::query(
            "UPDATE etl.core_merge_runs SET status = $1, dimensions_created = $2, \
             dimensions_updated = $3, facts_inserted = $4, facts_updated = $5, \
             error = $6, completed_at = $7, duration_ms = $8, result = $9 \
             WHERE merge_run_id = $10 AND status = 'running'",
        )
        .bind(run.status().as_str())
        .bind(run.counters().dimensions_created as i64)
        .bind(run.counters().dimensions_updated as i64)
        .bind(run.counters().facts_inserted as i64)
        .bind(run.counters().facts_updated as i64)
        .bind(run.error())
        .bind(run.completed_at())
        .bind(run.duration_ms())
        .bind(run.result())
        .bind(run.id().as_uuid())
        .execute(&self.pool)
        .await
        .map_err(classify_sqlx_error)?
        .rows_affected();

        if affected == 0 {
            return Err(MergeError::database_error(format!(
                "merge run {} was not running when finalised",
                run.id()
            )));
        }
        Ok(())
    }

    async fn find_completed(
        &self,
        load_run_id: Uuid,
        extract_type: &str,
    ) -> Result<Option<MergeRun>, MergeError> {
        let row = sqlx::query(
            "SELECT merge_run_id, load_run_id, extract_type, status, dimensions_created, \
             dimensions_updated, facts_inserted, facts_updated, error, started_at, \
             completed_at, result, dry_run \
             FROM etl.core_merge_runs \
             WHERE load_run_id = $1 AND extract_type = $2 \
               AND status = 'completed' AND NOT dry_run",
        )
        .bind(load_run_id)
        .bind(extract_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        row.as_ref().map(Self::row_to_run).transpose()
    }

    async fn supersede(&self, merge_run_id: MergeRunId) -> Result<(), MergeError> {
        let affected = sqlx::query(
            "UPDATE etl.core_merge_runs SET status = 'superseded' \
             WHERE merge_run_id = $1 AND status = 'completed'",
        )
        .bind(merge_run_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(classify_sqlx_error)?
        .rows_affected();

        if affected == 0 {
            return Err(MergeError::database_error(format!(
                "merge run {} was not completed when superseded",
                merge_run_id
            )));
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, MergeError> {
        let value: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(value == 1)
    }
}
