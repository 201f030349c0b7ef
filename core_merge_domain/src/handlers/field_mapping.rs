// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Field Mappings
//!
//! The static source-to-target column descriptions shared by dimension and
//! fact handlers. A mapping names the staging column, the camelCase target
//! field (whose snake_case form is the warehouse column), the declared value
//! kind, and optional default and transform applied during row conversion.

use crate::error::MergeError;
use crate::value_objects::{FieldKind, FieldValue};

/// A pure, named transform applied to a canonical value during mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTransform {
    /// Uppercases text values.
    Uppercase,
    /// Lowercases text values.
    Lowercase,
    /// Strips everything but ASCII digits, for phone-style fields.
    DigitsOnly,
}

impl FieldTransform {
    /// Applies the transform. Non-text values pass through unchanged.
    pub fn apply(&self, value: FieldValue) -> Result<FieldValue, MergeError> {
        let FieldValue::Text(s) = value else {
            return Ok(value);
        };
        let out = match self {
            FieldTransform::Uppercase => s.to_uppercase(),
            FieldTransform::Lowercase => s.to_lowercase(),
            FieldTransform::DigitsOnly => s.chars().filter(|c| c.is_ascii_digit()).collect(),
        };
        Ok(FieldValue::Text(out))
    }
}

/// One source-to-target field mapping.
#[derive(Debug, Clone)]
pub struct FieldMapping {
    /// Staging column name.
    pub source_field: &'static str,
    /// Target field in camelCase; the warehouse column is its snake_case.
    pub target_field: &'static str,
    /// Declared kind, used for coercion and typed SQL binding.
    pub kind: FieldKind,
    /// Required fields must be non-null after defaulting.
    pub required: bool,
    /// Substituted when the staging value is null or missing.
    pub default_value: Option<FieldValue>,
    pub transform: Option<FieldTransform>,
}

impl FieldMapping {
    pub const fn new(source_field: &'static str, target_field: &'static str, kind: FieldKind) -> Self {
        Self {
            source_field,
            target_field,
            kind,
            required: false,
            default_value: None,
            transform: None,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: FieldValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub const fn with_transform(mut self, transform: FieldTransform) -> Self {
        self.transform = Some(transform);
        self
    }
}
