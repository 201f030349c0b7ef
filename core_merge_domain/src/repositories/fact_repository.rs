// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Fact Repository Port
//!
//! Write access to `core.fact_*` tables. Facts are keyed by business key;
//! the loader chooses probe-then-insert, insert-only, or update-only per its
//! upsert mode. Transaction bracketing matches the dimension port.

use async_trait::async_trait;

use crate::entities::FactRecord;
use crate::error::MergeError;
use crate::handlers::FactHandler;
use crate::value_objects::BusinessKey;

/// Port over the fact tables.
#[async_trait]
pub trait FactRepository: Send + Sync {
    async fn begin(&self) -> Result<(), MergeError>;

    async fn commit(&self) -> Result<(), MergeError>;

    async fn rollback(&self) -> Result<(), MergeError>;

    /// Probes for an existing fact row by business key.
    async fn exists(&self, handler: &FactHandler, key: &BusinessKey) -> Result<bool, MergeError>;

    /// Inserts a fact row. A duplicate business key surfaces as a
    /// constraint violation.
    async fn insert(&self, handler: &FactHandler, fact: &FactRecord) -> Result<(), MergeError>;

    /// Updates all non-business-key columns of an existing fact row.
    /// Returns the number of rows affected; zero means no row matched.
    async fn update(&self, handler: &FactHandler, fact: &FactRecord) -> Result<u64, MergeError>;
}
