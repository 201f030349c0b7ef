// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Dimension Repository Port
//!
//! Write access to `core.<dim>` tables under SCD2 rules. The loader brackets
//! each batch with `begin`/`commit` (or `rollback`); between those calls all
//! statements run on the batch's single connection so a row can observe
//! writes made earlier in the same batch. Reads outside a bracket (FK
//! resolution, cache preload) run on the pool.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::DimensionVersion;
use crate::error::MergeError;
use crate::handlers::DimensionHandler;
use crate::value_objects::{BusinessKey, FieldValue, Lineage, SurrogateKey};

/// Port over the SCD2 dimension tables.
#[async_trait]
pub trait DimensionRepository: Send + Sync {
    /// Opens the batch transaction.
    async fn begin(&self) -> Result<(), MergeError>;

    /// Commits the batch transaction.
    async fn commit(&self) -> Result<(), MergeError>;

    /// Rolls the batch transaction back. Safe to call when none is open.
    async fn rollback(&self) -> Result<(), MergeError>;

    /// Point query for the current version of one business key.
    ///
    /// # Errors
    /// Returns `MergeError::Scd2ConstraintViolation` when more than one
    /// current version exists.
    async fn find_current(
        &self,
        handler: &DimensionHandler,
        key: &BusinessKey,
    ) -> Result<Option<DimensionVersion>, MergeError>;

    /// Inserts a new version and returns the sequence-assigned surrogate key.
    async fn insert_version(
        &self,
        handler: &DimensionHandler,
        version: &DimensionVersion,
    ) -> Result<SurrogateKey, MergeError>;

    /// Closes a prior version's effective range.
    async fn expire_version(
        &self,
        handler: &DimensionHandler,
        surrogate_key: SurrogateKey,
        effective_to: DateTime<Utc>,
    ) -> Result<(), MergeError>;

    /// Updates non-significant columns plus lineage in place, without
    /// touching the version chain.
    async fn update_in_place(
        &self,
        handler: &DimensionHandler,
        surrogate_key: SurrogateKey,
        changes: &BTreeMap<String, FieldValue>,
        lineage: &Lineage,
    ) -> Result<(), MergeError>;

    /// Streams every current `(business key, surrogate key)` pair, for
    /// cache preload. `limit` bounds the scan when the cache is near
    /// capacity.
    async fn current_keys(
        &self,
        handler: &DimensionHandler,
        limit: Option<u64>,
    ) -> Result<Vec<(BusinessKey, SurrogateKey)>, MergeError>;
}
