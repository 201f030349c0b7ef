// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Surrogate Key
//!
//! A warehouse-assigned identifier for one dimension version. Surrogate
//! keys come from the target table's sequence, are strictly positive, and
//! are never reused or mutated once assigned.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MergeError;

/// Monotonic integer key assigned on dimension version INSERT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SurrogateKey(i64);

impl SurrogateKey {
    /// Wraps a key read back from the warehouse.
    ///
    /// # Errors
    /// Returns `MergeError::ValidationError` for non-positive values, which
    /// the sequences backing the key columns never produce.
    pub fn new(value: i64) -> Result<Self, MergeError> {
        if value <= 0 {
            return Err(MergeError::validation_error(format!(
                "surrogate key must be positive, got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for SurrogateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_keys() {
        assert!(SurrogateKey::new(0).is_err());
        assert!(SurrogateKey::new(-5).is_err());
        assert_eq!(SurrogateKey::new(42).unwrap().value(), 42);
    }
}
