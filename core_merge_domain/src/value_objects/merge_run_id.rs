// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Merge Run Identifier
//!
//! Type-safe identifier for one core-merge invocation. Stored as a `uuid`
//! column in `etl.core_merge_runs`, matching the load-run identifiers the
//! upstream audit tables carry.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MergeError;

/// Identifier for one merge run audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MergeRunId(Uuid);

impl MergeRunId {
    /// Generates a fresh identifier for a new merge run.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an identifier read back from the audit table.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Parses an identifier from its canonical string form.
    pub fn from_string(s: &str) -> Result<Self, MergeError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| MergeError::validation_error(format!("invalid merge run id '{}': {}", s, e)))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MergeRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MergeRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
