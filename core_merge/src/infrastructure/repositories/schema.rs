// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Audit Schema Bootstrap
//!
//! Idempotent DDL for the one table the merge core owns,
//! `etl.core_merge_runs`. The `stg.*` inputs and `core.*` targets are
//! provisioned by the warehouse's own migrations; the core only assumes the
//! target tables back each `<dim>_key` column with a sequence.

use sqlx::PgPool;
use tracing::{debug, info};

use core_merge_domain::MergeError;

use super::sql::classify_sqlx_error;

const AUDIT_DDL: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS etl",
    "CREATE TABLE IF NOT EXISTS etl.core_merge_runs (
        merge_run_id uuid PRIMARY KEY,
        load_run_id uuid NOT NULL,
        extract_type text NOT NULL,
        status text NOT NULL,
        dimensions_created bigint NOT NULL DEFAULT 0,
        dimensions_updated bigint NOT NULL DEFAULT 0,
        facts_inserted bigint NOT NULL DEFAULT 0,
        facts_updated bigint NOT NULL DEFAULT 0,
        error text,
        started_at timestamptz NOT NULL,
        completed_at timestamptz,
        duration_ms bigint,
        result jsonb,
        dry_run boolean NOT NULL DEFAULT FALSE
    )",
    // One completed non-dry run per idempotency key
    "CREATE UNIQUE INDEX IF NOT EXISTS ux_core_merge_runs_idempotency
        ON etl.core_merge_runs (load_run_id, extract_type)
        WHERE status = 'completed' AND NOT dry_run",
    "CREATE INDEX IF NOT EXISTS ix_core_merge_runs_load_run
        ON etl.core_merge_runs (load_run_id)",
];

/// Ensures the merge audit table and its indexes exist.
pub async fn ensure_audit_schema(pool: &PgPool) -> Result<(), MergeError> {
    debug!("ensuring merge audit schema is present");
    for statement in AUDIT_DDL {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(classify_sqlx_error)?;
    }
    info!("merge audit schema is up to date");
    Ok(())
}
