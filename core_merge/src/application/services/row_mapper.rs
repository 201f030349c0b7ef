// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Row Mapping
//!
//! Shared conversion from a staging row to target attributes: for every
//! field mapping, default the missing value, canonicalise, apply the
//! declared transform, and coerce into the declared kind. Used by both the
//! dimension and fact loaders so incoming records and stored records carry
//! the same canonical attribute forms.

use std::collections::BTreeMap;

use core_merge_domain::handlers::FieldMapping;
use core_merge_domain::services::ValueNormalizer;
use core_merge_domain::value_objects::{FieldValue, StagingRow};
use core_merge_domain::MergeError;

/// Maps one staging row through a handler's field mappings.
///
/// # Errors
/// - `MergeError::ValidationError` when a required field is null after
///   defaulting
/// - `MergeError::TransformationError` when a transform or kind coercion
///   fails
pub fn map_attributes(
    mappings: &[FieldMapping],
    normalizer: &ValueNormalizer,
    row: &StagingRow,
) -> Result<BTreeMap<String, FieldValue>, MergeError> {
    let mut attributes = BTreeMap::new();
    for mapping in mappings {
        let raw = row.get(mapping.source_field);
        let value = if raw.is_null() {
            mapping.default_value.clone().unwrap_or(FieldValue::Null)
        } else {
            raw.clone()
        };

        let canonical = normalizer.canonicalize(&value);
        let transformed = match &mapping.transform {
            Some(transform) => transform.apply(canonical)?,
            None => canonical,
        };
        let coerced = transformed.coerce_to(mapping.kind).map_err(|e| {
            MergeError::transformation_error(format!(
                "field '{}': {}",
                mapping.source_field, e
            ))
        })?;

        if mapping.required && coerced.is_null() {
            return Err(MergeError::validation_error(format!(
                "required field '{}' is null",
                mapping.source_field
            )));
        }
        attributes.insert(mapping.target_field.to_string(), coerced);
    }
    Ok(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_merge_domain::value_objects::FieldKind;

    fn row(fields: &[(&str, FieldValue)]) -> StagingRow {
        let mut row = StagingRow::new(1, BTreeMap::new());
        for (name, value) in fields {
            row.set(*name, value.clone());
        }
        row
    }

    #[test]
    fn maps_defaults_and_kinds() {
        let mappings = vec![
            FieldMapping::new("family_name", "familyName", FieldKind::Text).required(),
            FieldMapping::new("deceased_flag", "deceasedFlag", FieldKind::Boolean)
                .with_default(FieldValue::Boolean(false)),
            FieldMapping::new("dob", "dob", FieldKind::Timestamp),
        ];
        let normalizer = ValueNormalizer::new();
        let attributes = map_attributes(
            &mappings,
            &normalizer,
            &row(&[
                ("family_name", FieldValue::Text("  Doe ".to_string())),
                ("dob", FieldValue::Text("1990-01-01".to_string())),
            ]),
        )
        .unwrap();
        assert_eq!(attributes["familyName"], FieldValue::Text("doe".to_string()));
        assert_eq!(attributes["deceasedFlag"], FieldValue::Boolean(false));
        assert!(matches!(attributes["dob"], FieldValue::Timestamp(_)));
    }

    #[test]
    fn required_null_is_a_validation_error() {
        let mappings = vec![FieldMapping::new("family_name", "familyName", FieldKind::Text).required()];
        let normalizer = ValueNormalizer::new();
        let err = map_attributes(&mappings, &normalizer, &row(&[])).unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn bad_coercion_is_a_transformation_error() {
        let mappings = vec![FieldMapping::new("dob", "dob", FieldKind::Timestamp)];
        let normalizer = ValueNormalizer::new();
        let err = map_attributes(
            &mappings,
            &normalizer,
            &row(&[("dob", FieldValue::Text("not a date".to_string()))]),
        )
        .unwrap_err();
        assert_eq!(err.category(), "transformation_error");
    }
}
