// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Business Key
//!
//! The composite natural key identifying an entity independently of
//! warehouse surrogate keys. Parts canonicalise at construction and the key
//! carries a stable canonical string used for ordering, hashing, and the FK
//! cache entry key.
//!
//! ## Completeness
//!
//! Every part must be present and non-null in the source row; an incomplete
//! key is the per-row `business_key_missing` error and never reaches the
//! warehouse.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::MergeError;
use crate::services::normalizer::ValueNormalizer;
use crate::value_objects::{FieldValue, StagingRow};

/// Ordered composite natural key in canonical form.
#[derive(Debug, Clone)]
pub struct BusinessKey {
    parts: Vec<(String, FieldValue)>,
    canonical: String,
}

impl BusinessKey {
    /// Builds a key from explicit parts, canonicalising each value.
    ///
    /// # Errors
    /// Returns `MergeError::BusinessKeyMissing` when any part is null.
    pub fn new(parts: Vec<(String, FieldValue)>) -> Result<Self, MergeError> {
        let normalizer = ValueNormalizer::new();
        let mut canonical_parts = Vec::with_capacity(parts.len());
        for (field, value) in parts {
            let canonical = normalizer.canonicalize(&value);
            if canonical.is_null() {
                return Err(MergeError::business_key_missing(format!(
                    "business key field '{}' is null or missing",
                    field
                )));
            }
            canonical_parts.push((field, canonical));
        }
        if canonical_parts.is_empty() {
            return Err(MergeError::business_key_missing(
                "business key has no fields".to_string(),
            ));
        }
        let canonical = render_canonical(&canonical_parts);
        Ok(Self {
            parts: canonical_parts,
            canonical,
        })
    }

    /// Extracts the key from a staging row using the handler's ordered
    /// business-key field list.
    pub fn from_row(fields: &[&str], row: &StagingRow) -> Result<Self, MergeError> {
        Self::new(
            fields
                .iter()
                .map(|f| ((*f).to_string(), row.get(f).clone()))
                .collect(),
        )
    }

    pub fn parts(&self) -> &[(String, FieldValue)] {
        &self.parts
    }

    /// The canonical string form, stable across construction paths.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

fn render_canonical(parts: &[(String, FieldValue)]) -> String {
    let mut out = String::new();
    for (field, value) in parts {
        out.push_str(field);
        out.push('=');
        out.push_str(&value.to_json().to_string());
        out.push(';');
    }
    out
}

impl PartialEq for BusinessKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for BusinessKey {}

impl Hash for BusinessKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for BusinessKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BusinessKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl fmt::Display for BusinessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(parts: &[(&str, &str)]) -> BusinessKey {
        BusinessKey::new(
            parts
                .iter()
                .map(|(f, v)| ((*f).to_string(), FieldValue::Text((*v).to_string())))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn equal_keys_compare_equal_after_canonicalisation() {
        let a = key(&[("patient_id", "P1"), ("practice_id", "PR1")]);
        let b = key(&[("patient_id", " p1 "), ("practice_id", "pr1")]);
        assert_eq!(a, b);
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn null_part_is_business_key_missing() {
        let err = BusinessKey::new(vec![
            ("patient_id".to_string(), FieldValue::Null),
        ])
        .unwrap_err();
        assert_eq!(err.category(), "business_key_missing");
    }

    #[test]
    fn missing_row_field_is_business_key_missing() {
        let row = StagingRow::default();
        let err = BusinessKey::from_row(&["patient_id"], &row).unwrap_err();
        assert_eq!(err.category(), "business_key_missing");
    }

    #[test]
    fn ordering_follows_canonical_string() {
        let a = key(&[("id", "a")]);
        let b = key(&[("id", "b")]);
        assert!(a < b);
    }
}
