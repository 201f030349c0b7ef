// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Warehouse Session
//!
//! Shared connection handling for the PostgreSQL repositories. A session
//! wraps the pool plus at most one open batch transaction. While a
//! transaction is open every statement runs on its connection, so a row can
//! observe writes from earlier in the same batch; outside a transaction
//! statements run on the pool. The transaction always releases its
//! connection on commit and rollback, and on drop if a batch is abandoned.

use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;

use core_merge_domain::MergeError;

use super::sql::classify_sqlx_error;

/// Pool plus optional in-flight batch transaction.
pub struct PgSession {
    pool: PgPool,
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
}

impl PgSession {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tx: Mutex::new(None),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Opens the batch transaction, holding one pooled connection.
    pub async fn begin(&self) -> Result<(), MergeError> {
        let mut guard = self.tx.lock().await;
        if guard.is_some() {
            return Err(MergeError::internal_error(
                "batch transaction already open".to_string(),
            ));
        }
        let tx = self.pool.begin().await.map_err(classify_sqlx_error)?;
        *guard = Some(tx);
        Ok(())
    }

    pub async fn commit(&self) -> Result<(), MergeError> {
        let mut guard = self.tx.lock().await;
        match guard.take() {
            Some(tx) => tx.commit().await.map_err(classify_sqlx_error),
            None => Err(MergeError::internal_error(
                "no batch transaction to commit".to_string(),
            )),
        }
    }

    /// Rolls the batch back; a no-op when no transaction is open.
    pub async fn rollback(&self) -> Result<(), MergeError> {
        let mut guard = self.tx.lock().await;
        match guard.take() {
            Some(tx) => tx.rollback().await.map_err(classify_sqlx_error),
            None => Ok(()),
        }
    }

    pub async fn fetch_all(
        &self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Result<Vec<PgRow>, MergeError> {
        let mut guard = self.tx.lock().await;
        match guard.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await.map_err(classify_sqlx_error),
            None => query.fetch_all(&self.pool).await.map_err(classify_sqlx_error),
        }
    }

    pub async fn fetch_optional(
        &self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Result<Option<PgRow>, MergeError> {
        let mut guard = self.tx.lock().await;
        match guard.as_mut() {
            Some(tx) => query
                .fetch_optional(&mut **tx)
                .await
                .map_err(classify_sqlx_error),
            None => query
                .fetch_optional(&self.pool)
                .await
                .map_err(classify_sqlx_error),
        }
    }

    pub async fn fetch_one(
        &self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Result<PgRow, MergeError> {
        let mut guard = self.tx.lock().await;
        match guard.as_mut() {
            Some(tx) => query.fetch_one(&mut **tx).await.map_err(classify_sqlx_error),
            None => query.fetch_one(&self.pool).await.map_err(classify_sqlx_error),
        }
    }

    /// Executes a statement, returning the affected row count.
    pub async fn execute(&self, query: Query<'_, Postgres, PgArguments>) -> Result<u64, MergeError> {
        let mut guard = self.tx.lock().await;
        match guard.as_mut() {
            Some(tx) => query
                .execute(&mut **tx)
                .await
                .map(|r| r.rows_affected())
                .map_err(classify_sqlx_error),
            None => query
                .execute(&self.pool)
                .await
                .map(|r| r.rows_affected())
                .map_err(classify_sqlx_error),
        }
    }
}
