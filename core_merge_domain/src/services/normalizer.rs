// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Value Normaliser & Hasher
//!
//! This module provides the deterministic canonical form for field values
//! and the collision-resistant fingerprint over a dimension's tracked
//! fields. Everything downstream that compares values (the change
//! classifier, the FK cache key, the business key ordering) compares
//! canonical forms, so canonicalisation rules live in exactly one place.
//!
//! ## Canonical Form Rules
//!
//! Applied before hashing and before equality under the significant
//! comparator:
//!
//! - null and missing are the same token
//! - timestamps truncate to millisecond precision in UTC
//! - numbers round to 6 decimal places; NaN and non-finite become null
//! - strings are trimmed and lowercased
//! - booleans are preserved
//! - nested structures normalise recursively; arrays preserve order
//!
//! ## Fingerprint
//!
//! The tracked-field subset serialises as a JSON object with keys in
//! lexicographic order, hashed with SHA-256, output as the hex digest.
//! Two records with identical tracked-field canonical values yield
//! identical fingerprints regardless of non-tracked fields or key order.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::value_objects::{FieldValue, Fingerprint};

/// Numeric tolerance under the significant comparator.
const SIGNIFICANT_EPSILON: f64 = 1e-4;

/// Rounding factor for canonical floats (6 decimal places).
const FLOAT_SCALE: f64 = 1_000_000.0;

/// Stateless domain service producing canonical values and fingerprints.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueNormalizer;

impl ValueNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Produces the canonical form of a value.
    pub fn canonicalize(&self, value: &FieldValue) -> FieldValue {
        match value {
            FieldValue::Null => FieldValue::Null,
            FieldValue::Boolean(b) => FieldValue::Boolean(*b),
            FieldValue::Integer(i) => FieldValue::Integer(*i),
            FieldValue::Float(f) => {
                if f.is_finite() {
                    let scaled = f * FLOAT_SCALE;
                    // Magnitudes past the scale window have no fractional
                    // digits to round
                    if scaled.is_finite() {
                        FieldValue::Float(scaled.round() / FLOAT_SCALE)
                    } else {
                        FieldValue::Float(*f)
                    }
                } else {
                    FieldValue::Null
                }
            }
            FieldValue::Text(s) => FieldValue::Text(s.trim().to_lowercase()),
            FieldValue::Timestamp(ts) => {
                let millis = ts.timestamp_millis();
                match chrono::DateTime::from_timestamp_millis(millis) {
                    Some(truncated) => FieldValue::Timestamp(truncated),
                    None => FieldValue::Null,
                }
            }
            FieldValue::Array(items) => {
                FieldValue::Array(items.iter().map(|v| self.canonicalize(v)).collect())
            }
            FieldValue::Object(map) => FieldValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.canonicalize(v)))
                    .collect(),
            ),
        }
    }

    /// Canonical equality: both sides canonicalised, then compared exactly.
    pub fn canonical_eq(&self, a: &FieldValue, b: &FieldValue) -> bool {
        self.canonicalize(a) == self.canonicalize(b)
    }

    /// Significant-match equality.
    ///
    /// Strings compare case-insensitively through the canonical form;
    /// numeric values compare within a tolerance of 1e-4. Everything else
    /// falls back to canonical equality.
    pub fn significant_eq(&self, a: &FieldValue, b: &FieldValue) -> bool {
        let ca = self.canonicalize(a);
        let cb = self.canonicalize(b);
        match (ca.as_f64(), cb.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < SIGNIFICANT_EPSILON,
            _ => ca == cb,
        }
    }

    /// Computes the fingerprint over the tracked subset of a field map.
    ///
    /// Tracked fields absent from the map hash as the null token, so a
    /// missing field and an explicit null are indistinguishable.
    pub fn fingerprint(&self, fields: &BTreeMap<String, FieldValue>, tracked: &[&str]) -> Fingerprint {
        let mut subset = BTreeMap::new();
        for field in tracked {
            let value = fields.get(*field).unwrap_or(&FieldValue::Null);
            subset.insert((*field).to_string(), self.canonicalize(value).to_json());
        }
        // BTreeMap keys serialise in lexicographic order
        let serialized =
            serde_json::to_string(&subset).unwrap_or_else(|_| String::from("{}"));
        let digest = Sha256::digest(serialized.as_bytes());
        Fingerprint::from_hex_digest(hex::encode(digest))
    }
}
