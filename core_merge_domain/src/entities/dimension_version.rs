// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Dimension Version
//!
//! One row of a `core.<dim>` table under SCD2 versioning. A business key
//! owns a totally ordered chain of versions: exactly one is current with a
//! null `effective_to`; the rest carry the timestamp at which a newer
//! version superseded them.
//!
//! ## Invariants
//!
//! - `effective_to` is null iff `is_current` is true
//! - the surrogate key, once assigned, never changes
//! - non-tracked attributes may mutate in place without versioning

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::MergeError;
use crate::value_objects::{BusinessKey, FieldValue, Lineage, SurrogateKey};

/// A single SCD2 version of one dimension entity.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionVersion {
    surrogate_key: Option<SurrogateKey>,
    business_key: BusinessKey,
    attributes: BTreeMap<String, FieldValue>,
    effective_from: DateTime<Utc>,
    effective_to: Option<DateTime<Utc>>,
    is_current: bool,
    lineage: Lineage,
}

impl DimensionVersion {
    /// Creates a new current version, as built from a staging row.
    ///
    /// The surrogate key stays unassigned until the warehouse INSERT
    /// returns one.
    pub fn new_current(
        business_key: BusinessKey,
        attributes: BTreeMap<String, FieldValue>,
        effective_from: DateTime<Utc>,
        lineage: Lineage,
    ) -> Self {
        Self {
            surrogate_key: None,
            business_key,
            attributes,
            effective_from,
            effective_to: None,
            is_current: true,
            lineage,
        }
    }

    /// Rehydrates a version read back from the warehouse.
    ///
    /// # Errors
    /// Returns `MergeError::Scd2ConstraintViolation` when the currency flag
    /// and the effective range disagree.
    pub fn from_store(
        surrogate_key: SurrogateKey,
        business_key: BusinessKey,
        attributes: BTreeMap<String, FieldValue>,
        effective_from: DateTime<Utc>,
        effective_to: Option<DateTime<Utc>>,
        is_current: bool,
        lineage: Lineage,
    ) -> Result<Self, MergeError> {
        if is_current != effective_to.is_none() {
            return Err(MergeError::scd2_violation(format!(
                "version {} for key {} has is_current={} but effective_to={:?}",
                surrogate_key, business_key, is_current, effective_to
            )));
        }
        Ok(Self {
            surrogate_key: Some(surrogate_key),
            business_key,
            attributes,
            effective_from,
            effective_to,
            is_current,
            lineage,
        })
    }

    pub fn surrogate_key(&self) -> Option<SurrogateKey> {
        self.surrogate_key
    }

    /// Records the key the warehouse assigned on INSERT.
    pub fn assign_surrogate_key(&mut self, key: SurrogateKey) {
        self.surrogate_key = Some(key);
    }

    pub fn business_key(&self) -> &BusinessKey {
        &self.business_key
    }

    pub fn attributes(&self) -> &BTreeMap<String, FieldValue> {
        &self.attributes
    }

    /// Reads one attribute; absent attributes read as null.
    pub fn attribute(&self, field: &str) -> &FieldValue {
        self.attributes.get(field).unwrap_or(&FieldValue::Null)
    }

    pub fn effective_from(&self) -> DateTime<Utc> {
        self.effective_from
    }

    pub fn effective_to(&self) -> Option<DateTime<Utc>> {
        self.effective_to
    }

    pub fn is_current(&self) -> bool {
        self.is_current
    }

    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }

    /// Closes this version's effective range when a newer version lands.
    pub fn expire(&mut self, effective_to: DateTime<Utc>) {
        self.effective_to = Some(effective_to);
        self.is_current = false;
    }

    /// Applies an in-place update of non-tracked attributes plus lineage.
    pub fn apply_in_place(&mut self, changes: &BTreeMap<String, FieldValue>, lineage: Lineage) {
        for (field, value) in changes {
            self.attributes.insert(field.clone(), value.clone());
        }
        self.lineage = lineage;
    }
}
