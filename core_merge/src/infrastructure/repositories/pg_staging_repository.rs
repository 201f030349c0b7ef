// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # PostgreSQL Staging Repository
//!
//! Paged, read-only access to `stg.*` rows. Rows join to
//! `etl.load_run_files` on `load_run_file_id` so one load run's
//! contribution can be selected; ordering by the business-key columns keeps
//! paging deterministic.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use core_merge_domain::repositories::{StagingQuery, StagingRepository};
use core_merge_domain::value_objects::StagingRow;
use core_merge_domain::MergeError;

use super::session::PgSession;
use super::sql::decode_column;

/// Staging adapter over one warehouse pool.
pub struct PgStagingRepository {
    session: PgSession,
}

impl PgStagingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            session: PgSession::new(pool),
        }
    }
}

#[async_trait]
impl StagingRepository for PgStagingRepository {
    async fn count_rows(&self, source_table: &str, load_run_id: Uuid) -> Result<u64, MergeError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} s \
             JOIN etl.load_run_files f ON s.load_run_file_id = f.load_run_file_id \
             WHERE f.load_run_id = $1",
            source_table,
        );
        let row = self.session.fetch_one(sqlx::query(&sql).bind(load_run_id)).await?;
        let count: i64 = sqlx::Row::try_get(&row, 0)
            .map_err(|e| MergeError::database_error(format!("failed to decode row count: {}", e)))?;
        Ok(count as u64)
    }

    async fn fetch_page(&self, query: &StagingQuery) -> Result<Vec<StagingRow>, MergeError> {
        let projection: Vec<String> = query
            .fields
            .iter()
            .map(|f| format!("s.{}", f.name))
            .collect();
        let order: Vec<String> = query.order_by.iter().map(|c| format!("s.{}", c)).collect();

        let sql = format!(
            "SELECT s.load_run_file_id, {} FROM {} s \
             JOIN etl.load_run_files f ON s.load_run_file_id = f.load_run_file_id \
             WHERE f.load_run_id = $1 ORDER BY {} OFFSET $2 LIMIT $3",
            projection.join(", "),
            query.source_table,
            order.join(", "),
        );

        let rows = self
            .session
            .fetch_all(
                sqlx::query(&sql)
                    .bind(query.load_run_id)
                    .bind(query.offset as i64)
                    .bind(query.limit as i64),
            )
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let load_run_file_id: i64 = sqlx::Row::try_get(row, "load_run_file_id").map_err(|e| {
                MergeError::database_error(format!("failed to decode load_run_file_id: {}", e))
            })?;
            let mut fields = BTreeMap::new();
            for descriptor in &query.fields {
                let value = decode_column(row, &descriptor.name, descriptor.kind)?;
                fields.insert(descriptor.name.clone(), value);
            }
            out.push(StagingRow::new(load_run_file_id, fields));
        }
        Ok(out)
    }
}
