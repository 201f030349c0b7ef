// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Staging Row
//!
//! An opaque record produced by the staging subsystem. The merge core only
//! reads these; typing and validation happened upstream in the raw to
//! staging step. Every row carries the `load_run_file_id` that joins it to
//! the load-run-files audit table.

use std::collections::BTreeMap;

use crate::value_objects::FieldValue;

/// One validated staging record, keyed by staging column name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StagingRow {
    load_run_file_id: i64,
    fields: BTreeMap<String, FieldValue>,
}

impl StagingRow {
    pub fn new(load_run_file_id: i64, fields: BTreeMap<String, FieldValue>) -> Self {
        Self {
            load_run_file_id,
            fields,
        }
    }

    pub fn load_run_file_id(&self) -> i64 {
        self.load_run_file_id
    }

    /// Reads a field; absent fields read as the null token.
    pub fn get(&self, field: &str) -> &FieldValue {
        self.fields.get(field).unwrap_or(&FieldValue::Null)
    }

    /// Returns true when the field is present and non-null.
    pub fn has_value(&self, field: &str) -> bool {
        !self.get(field).is_null()
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Inserts a field value, used by builders and adapters.
    pub fn set(&mut self, field: impl Into<String>, value: FieldValue) {
        self.fields.insert(field.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_field_reads_as_null() {
        let row = StagingRow::default();
        assert!(row.get("anything").is_null());
        assert!(!row.has_value("anything"));
    }
}
