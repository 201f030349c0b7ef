// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the hierarchical error system for the core merge
//! domain. It categorizes failures by scope (per-row, per-batch, per-merge)
//! so callers can apply the right continuation policy, and provides
//! actionable error messages for diagnostics.
//!
//! ## Error Scopes
//!
//! ### Per-Row Errors
//!
//! Recorded against the offending staging row and never abort a batch:
//!
//! - **BusinessKeyMissing**: a dimension row without a complete natural key
//! - **BusinessKeyConflict**: a fact row without a complete natural key
//! - **TransformationError**: a field mapping or coercion failure
//! - **MissingForeignKey**: an unresolvable dimension reference
//!
//! ### Per-Batch Errors
//!
//! Roll back the in-flight transaction; the load continues on a new
//! transaction when `continueOnError` is set:
//!
//! - **ConstraintViolation**: a database constraint rejected a statement
//! - **DatabaseError**: any other database failure
//!
//! ### Merge-Fatal Errors
//!
//! Transition the merge run to `failed`:
//!
//! - **Scd2ConstraintViolation**: the warehouse holds multiple current
//!   versions or overlapping ranges for one business key
//! - **TooManyErrors**: the configured error budget was exhausted
//!
//! ### Preconditions
//!
//! Typed returns with no side effects:
//!
//! - **LoadRunNotFound**: the upstream load run does not exist
//! - **MergePrecondition**: the merge is already completed and
//!   `forceReprocess` was not requested
//!
//! ## Error Handling Patterns
//!
//! Errors are cheap to construct and `Clone`, so loaders can both record
//! them in result structs and propagate them with `?`.

use thiserror::Error;

/// Domain-specific errors for the core merge system.
///
/// Each variant carries a descriptive message. Variants map onto the error
/// taxonomy the loaders enforce: per-row errors are recorded and skipped,
/// per-batch errors roll the transaction back, and merge-fatal errors fail
/// the merge run.
#[derive(Error, Debug, Clone)]
pub enum MergeError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Business key missing: {0}")]
    BusinessKeyMissing(String),

    #[error("Business key conflict: {0}")]
    BusinessKeyConflict(String),

    #[error("Transformation error: {0}")]
    TransformationError(String),

    #[error("Missing foreign key: {0}")]
    MissingForeignKey(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("SCD2 constraint violation: {0}")]
    Scd2ConstraintViolation(String),

    #[error("Error budget exhausted: {0}")]
    TooManyErrors(String),

    #[error("Merge precondition failed: {0}")]
    MergePrecondition(String),

    #[error("Load run not found: {0}")]
    LoadRunNotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl MergeError {
    /// Creates a new configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a new validation error
    pub fn validation_error(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Creates a new missing business key error
    pub fn business_key_missing(msg: impl Into<String>) -> Self {
        Self::BusinessKeyMissing(msg.into())
    }

    /// Creates a new transformation error
    pub fn transformation_error(msg: impl Into<String>) -> Self {
        Self::TransformationError(msg.into())
    }

    /// Creates a new database error
    pub fn database_error(msg: impl Into<String>) -> Self {
        Self::DatabaseError(msg.into())
    }

    /// Creates a new SCD2 invariant violation error
    pub fn scd2_violation(msg: impl Into<String>) -> Self {
        Self::Scd2ConstraintViolation(msg.into())
    }

    /// Creates a new precondition error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::MergePrecondition(msg.into())
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Checks if the error is recoverable by retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MergeError::TimeoutError(_) | MergeError::DatabaseError(_))
    }

    /// Checks if the error is scoped to a single staging row
    pub fn is_row_scoped(&self) -> bool {
        matches!(
            self,
            MergeError::BusinessKeyMissing(_)
                | MergeError::BusinessKeyConflict(_)
                | MergeError::TransformationError(_)
                | MergeError::MissingForeignKey(_)
        )
    }

    /// Checks if the error must fail the whole merge run
    pub fn is_merge_fatal(&self) -> bool {
        matches!(
            self,
            MergeError::Scd2ConstraintViolation(_) | MergeError::TooManyErrors(_) | MergeError::Cancelled(_)
        )
    }

    /// Gets the error category
    pub fn category(&self) -> &'static str {
        match self {
            MergeError::InvalidConfiguration(_) => "configuration",
            MergeError::ValidationError(_) => "validation",
            MergeError::BusinessKeyMissing(_) => "business_key_missing",
            MergeError::BusinessKeyConflict(_) => "business_key_conflict",
            MergeError::TransformationError(_) => "transformation_error",
            MergeError::MissingForeignKey(_) => "missing_foreign_key",
            MergeError::ConstraintViolation(_) => "constraint_violation",
            MergeError::DatabaseError(_) => "database_error",
            MergeError::Scd2ConstraintViolation(_) => "scd2_constraint_violation",
            MergeError::TooManyErrors(_) => "error_budget",
            MergeError::MergePrecondition(_) => "merge_precondition",
            MergeError::LoadRunNotFound(_) => "merge_precondition",
            MergeError::SerializationError(_) => "serialization",
            MergeError::TimeoutError(_) => "timeout",
            MergeError::Cancelled(_) => "cancellation",
            MergeError::InternalError(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for MergeError {
    fn from(err: serde_json::Error) -> Self {
        MergeError::SerializationError(err.to_string())
    }
}
