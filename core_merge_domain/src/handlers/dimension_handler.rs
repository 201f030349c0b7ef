// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Dimension Handler Registry
//!
//! Static per-dimension configuration: staging source and core target
//! tables, the surrogate-key column, the ordered business-key fields, field
//! mappings, the tracked-field subset the fingerprint covers, and the
//! per-field comparison rules with their weights and change threshold.
//!
//! Handlers are data, not behavior. The dimension loader and change
//! classifier interpret them; nothing here touches a database. Load
//! ordering among dimensions is not part of a handler; the orchestrator
//! encodes it.
//!
//! ## Comparison Rule Kinds
//!
//! | Kind | Equality | Produces new version? |
//! |---|---|---|
//! | `exact` | canonical equality | yes if differ |
//! | `significant` | significant-match | yes if differ |
//! | `always_version` | strict | always, ignores threshold |
//! | `never_version` | canonical equality | never |

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;

use crate::error::MergeError;
use crate::handlers::field_mapping::{FieldMapping, FieldTransform};
use crate::services::field_case::to_snake_case;
use crate::value_objects::FieldKind;

/// The dimension types the warehouse models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DimensionType {
    Practice,
    Patient,
    Provider,
    Vaccine,
    Medicine,
}

impl DimensionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionType::Practice => "practice",
            DimensionType::Patient => "patient",
            DimensionType::Provider => "provider",
            DimensionType::Vaccine => "vaccine",
            DimensionType::Medicine => "medicine",
        }
    }

    pub fn all() -> [DimensionType; 5] {
        [
            DimensionType::Practice,
            DimensionType::Patient,
            DimensionType::Provider,
            DimensionType::Vaccine,
            DimensionType::Medicine,
        ]
    }
}

impl fmt::Display for DimensionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How changes to one field count toward versioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Exact,
    Significant,
    AlwaysVersion,
    NeverVersion,
}

impl RuleKind {
    /// True when a difference under this rule marks the diff significant.
    pub fn is_significant(&self) -> bool {
        matches!(self, RuleKind::Exact | RuleKind::Significant | RuleKind::AlwaysVersion)
    }
}

/// Per-field comparison rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComparisonRule {
    pub kind: RuleKind,
    /// Weight in [0,1]; `never_version` rules always contribute zero.
    pub weight: f64,
}

impl ComparisonRule {
    pub const fn new(kind: RuleKind, weight: f64) -> Self {
        Self { kind, weight }
    }

    /// Effective scoring weight.
    pub fn effective_weight(&self) -> f64 {
        match self.kind {
            RuleKind::NeverVersion => 0.0,
            _ => self.weight,
        }
    }
}

/// Static description of one dimension.
#[derive(Debug, Clone)]
pub struct DimensionHandler {
    pub dimension: DimensionType,
    /// The extract type whose files feed this dimension.
    pub extract_type: &'static str,
    pub source_table: &'static str,
    pub target_table: &'static str,
    /// Declared explicitly rather than derived from a naming convention.
    pub surrogate_key_column: &'static str,
    /// Ordered staging field names forming the natural key.
    pub business_key_fields: &'static [&'static str],
    pub field_mappings: Vec<FieldMapping>,
    /// Target fields the fingerprint covers.
    pub tracked_fields: Vec<&'static str>,
    /// Rules keyed by target field name.
    pub comparison_rules: BTreeMap<&'static str, ComparisonRule>,
    pub change_threshold: f64,
}

impl DimensionHandler {
    pub fn rule_for(&self, target_field: &str) -> Option<&ComparisonRule> {
        self.comparison_rules.get(target_field)
    }

    pub fn is_tracked(&self, target_field: &str) -> bool {
        self.tracked_fields.iter().any(|f| *f == target_field)
    }

    pub fn mapping_for_source(&self, source_field: &str) -> Option<&FieldMapping> {
        self.field_mappings.iter().find(|m| m.source_field == source_field)
    }

    pub fn mapping_for_target(&self, target_field: &str) -> Option<&FieldMapping> {
        self.field_mappings.iter().find(|m| m.target_field == target_field)
    }

    /// Warehouse columns of the business key, in key order.
    pub fn business_key_columns(&self) -> Result<Vec<String>, MergeError> {
        self.business_key_fields
            .iter()
            .map(|source| {
                self.mapping_for_source(source)
                    .map(|m| to_snake_case(m.target_field))
                    .ok_or_else(|| {
                        MergeError::invalid_config(format!(
                            "dimension {} business key field '{}' has no mapping",
                            self.dimension, source
                        ))
                    })
            })
            .collect()
    }

    /// Staging columns this handler reads, in a stable order.
    pub fn source_fields(&self) -> Vec<&'static str> {
        self.field_mappings.iter().map(|m| m.source_field).collect()
    }

    /// Checks internal consistency of the static description.
    pub fn validate(&self) -> Result<(), MergeError> {
        if !(0.0..=1.0).contains(&self.change_threshold) {
            return Err(MergeError::invalid_config(format!(
                "dimension {} change threshold {} outside [0,1]",
                self.dimension, self.change_threshold
            )));
        }
        for field in self.business_key_fields {
            if self.mapping_for_source(field).is_none() {
                return Err(MergeError::invalid_config(format!(
                    "dimension {} business key field '{}' has no mapping",
                    self.dimension, field
                )));
            }
        }
        for field in &self.tracked_fields {
            if self.mapping_for_target(field).is_none() {
                return Err(MergeError::invalid_config(format!(
                    "dimension {} tracked field '{}' has no mapping",
                    self.dimension, field
                )));
            }
            match self.rule_for(field) {
                Some(rule) if rule.kind != RuleKind::NeverVersion => {}
                _ => {
                    return Err(MergeError::invalid_config(format!(
                        "dimension {} tracked field '{}' needs a versioning rule",
                        self.dimension, field
                    )))
                }
            }
        }
        for (field, rule) in &self.comparison_rules {
            if !(0.0..=1.0).contains(&rule.weight) {
                return Err(MergeError::invalid_config(format!(
                    "dimension {} rule for '{}' has weight {} outside [0,1]",
                    self.dimension, field, rule.weight
                )));
            }
        }
        Ok(())
    }
}

/// Registry of the standard dimension handlers.
#[derive(Debug, Clone)]
pub struct DimensionHandlerRegistry {
    handlers: BTreeMap<DimensionType, DimensionHandler>,
}

static STANDARD_DIMENSIONS: Lazy<DimensionHandlerRegistry> =
    Lazy::new(DimensionHandlerRegistry::standard);

impl DimensionHandlerRegistry {
    /// The process-wide standard registry.
    pub fn shared() -> &'static Self {
        &STANDARD_DIMENSIONS
    }

    /// Builds the standard registry covering all five dimensions.
    pub fn standard() -> Self {
        Self::from_handlers([
            practice_handler(),
            patient_handler(),
            provider_handler(),
            vaccine_handler(),
            medicine_handler(),
        ])
    }

    /// Builds a registry from explicit handlers; later handlers replace
    /// earlier ones for the same dimension type.
    pub fn from_handlers(handlers: impl IntoIterator<Item = DimensionHandler>) -> Self {
        let mut map = BTreeMap::new();
        for handler in handlers {
            map.insert(handler.dimension, handler);
        }
        Self { handlers: map }
    }

    pub fn handler(&self, dimension: DimensionType) -> Result<&DimensionHandler, MergeError> {
        self.handlers.get(&dimension).ok_or_else(|| {
            MergeError::invalid_config(format!("no handler registered for dimension {}", dimension))
        })
    }

    pub fn by_extract_type(&self, extract_type: &str) -> Option<&DimensionHandler> {
        self.handlers.values().find(|h| h.extract_type == extract_type)
    }

    pub fn handlers(&self) -> impl Iterator<Item = &DimensionHandler> {
        self.handlers.values()
    }

    pub fn validate(&self) -> Result<(), MergeError> {
        for handler in self.handlers.values() {
            handler.validate()?;
        }
        Ok(())
    }
}

fn practice_handler() -> DimensionHandler {
    use FieldKind::*;
    DimensionHandler {
        dimension: DimensionType::Practice,
        extract_type: "practice",
        source_table: "stg.practices",
        target_table: "core.practice",
        surrogate_key_column: "practice_key",
        business_key_fields: &["practice_id", "per_org_id"],
        field_mappings: vec![
            FieldMapping::new("practice_id", "practiceId", Text).required(),
            FieldMapping::new("per_org_id", "perOrgId", Text).required(),
            FieldMapping::new("practice_name", "practiceName", Text).required(),
            FieldMapping::new("legal_name", "legalName", Text),
            FieldMapping::new("address_line1", "addressLine1", Text),
            FieldMapping::new("address_line2", "addressLine2", Text),
            FieldMapping::new("city", "city", Text),
            FieldMapping::new("postcode", "postcode", Text),
            FieldMapping::new("phone", "phone", Text).with_transform(FieldTransform::DigitsOnly),
            FieldMapping::new("email", "email", Text),
            FieldMapping::new("opened_on", "openedOn", Timestamp),
        ],
        tracked_fields: vec![
            "practiceName",
            "legalName",
            "addressLine1",
            "addressLine2",
            "city",
            "postcode",
            "openedOn",
        ],
        comparison_rules: BTreeMap::from([
            ("practiceName", ComparisonRule::new(RuleKind::Exact, 0.9)),
            ("legalName", ComparisonRule::new(RuleKind::Significant, 0.6)),
            ("addressLine1", ComparisonRule::new(RuleKind::Significant, 0.5)),
            ("addressLine2", ComparisonRule::new(RuleKind::Significant, 0.3)),
            ("city", ComparisonRule::new(RuleKind::Significant, 0.4)),
            ("postcode", ComparisonRule::new(RuleKind::Exact, 0.5)),
            ("openedOn", ComparisonRule::new(RuleKind::Exact, 0.4)),
            ("phone", ComparisonRule::new(RuleKind::NeverVersion, 0.0)),
            ("email", ComparisonRule::new(RuleKind::NeverVersion, 0.0)),
        ]),
        change_threshold: 0.4,
    }
}

fn patient_handler() -> DimensionHandler {
    use FieldKind::*;
    DimensionHandler {
        dimension: DimensionType::Patient,
        extract_type: "patient",
        source_table: "stg.patients",
        target_table: "core.patient",
        surrogate_key_column: "patient_key",
        business_key_fields: &["patient_id", "practice_id", "per_org_id"],
        field_mappings: vec![
            FieldMapping::new("patient_id", "patientId", Text).required(),
            FieldMapping::new("practice_id", "practiceId", Text).required(),
            FieldMapping::new("per_org_id", "perOrgId", Text).required(),
            FieldMapping::new("nhi_number", "nhiNumber", Text).with_transform(FieldTransform::Uppercase),
            FieldMapping::new("first_name", "firstName", Text).required(),
            FieldMapping::new("family_name", "familyName", Text).required(),
            FieldMapping::new("dob", "dob", Timestamp),
            FieldMapping::new("gender", "gender", Text),
            FieldMapping::new("ethnicity", "ethnicity", Text),
            FieldMapping::new("deceased_flag", "deceasedFlag", Boolean)
                .with_default(crate::value_objects::FieldValue::Boolean(false)),
            FieldMapping::new("enrolment_status", "enrolmentStatus", Text),
            FieldMapping::new("email", "email", Text),
            FieldMapping::new("phone_mobile", "phoneMobile", Text)
                .with_transform(FieldTransform::DigitsOnly),
            FieldMapping::new("address_line1", "addressLine1", Text),
        ],
        tracked_fields: vec![
            "nhiNumber",
            "firstName",
            "familyName",
            "dob",
            "gender",
            "ethnicity",
            "deceasedFlag",
            "enrolmentStatus",
        ],
        comparison_rules: BTreeMap::from([
            ("nhiNumber", ComparisonRule::new(RuleKind::AlwaysVersion, 1.0)),
            ("firstName", ComparisonRule::new(RuleKind::Exact, 0.8)),
            ("familyName", ComparisonRule::new(RuleKind::Exact, 0.8)),
            ("dob", ComparisonRule::new(RuleKind::Exact, 0.9)),
            ("gender", ComparisonRule::new(RuleKind::Significant, 0.4)),
            ("ethnicity", ComparisonRule::new(RuleKind::Significant, 0.3)),
            ("deceasedFlag", ComparisonRule::new(RuleKind::AlwaysVersion, 1.0)),
            ("enrolmentStatus", ComparisonRule::new(RuleKind::Significant, 0.5)),
            ("email", ComparisonRule::new(RuleKind::NeverVersion, 0.0)),
            ("phoneMobile", ComparisonRule::new(RuleKind::NeverVersion, 0.0)),
            ("addressLine1", ComparisonRule::new(RuleKind::NeverVersion, 0.0)),
        ]),
        change_threshold: 0.45,
    }
}

fn provider_handler() -> DimensionHandler {
    use FieldKind::*;
    DimensionHandler {
        dimension: DimensionType::Provider,
        extract_type: "provider",
        source_table: "stg.providers",
        target_table: "core.provider",
        surrogate_key_column: "provider_key",
        business_key_fields: &["provider_id", "practice_id", "per_org_id"],
        field_mappings: vec![
            FieldMapping::new("provider_id", "providerId", Text).required(),
            FieldMapping::new("practice_id", "practiceId", Text).required(),
            FieldMapping::new("per_org_id", "perOrgId", Text).required(),
            FieldMapping::new("council_number", "councilNumber", Text)
                .with_transform(FieldTransform::Uppercase),
            FieldMapping::new("first_name", "firstName", Text).required(),
            FieldMapping::new("family_name", "familyName", Text).required(),
            FieldMapping::new("provider_type", "providerType", Text),
            FieldMapping::new("specialty", "specialty", Text),
            FieldMapping::new("active_flag", "activeFlag", Boolean)
                .with_default(crate::value_objects::FieldValue::Boolean(true)),
            FieldMapping::new("email", "email", Text),
            FieldMapping::new("phone", "phone", Text).with_transform(FieldTransform::DigitsOnly),
        ],
        tracked_fields: vec![
            "councilNumber",
            "firstName",
            "familyName",
            "providerType",
            "specialty",
            "activeFlag",
        ],
        comparison_rules: BTreeMap::from([
            ("councilNumber", ComparisonRule::new(RuleKind::AlwaysVersion, 1.0)),
            ("firstName", ComparisonRule::new(RuleKind::Exact, 0.8)),
            ("familyName", ComparisonRule::new(RuleKind::Exact, 0.8)),
            ("providerType", ComparisonRule::new(RuleKind::Significant, 0.5)),
            ("specialty", ComparisonRule::new(RuleKind::Significant, 0.4)),
            ("activeFlag", ComparisonRule::new(RuleKind::Significant, 0.6)),
            ("email", ComparisonRule::new(RuleKind::NeverVersion, 0.0)),
            ("phone", ComparisonRule::new(RuleKind::NeverVersion, 0.0)),
        ]),
        change_threshold: 0.4,
    }
}

fn vaccine_handler() -> DimensionHandler {
    use FieldKind::*;
    DimensionHandler {
        dimension: DimensionType::Vaccine,
        extract_type: "vaccine",
        source_table: "stg.vaccines",
        target_table: "core.vaccine",
        surrogate_key_column: "vaccine_key",
        business_key_fields: &["vaccine_id", "per_org_id"],
        field_mappings: vec![
            FieldMapping::new("vaccine_id", "vaccineId", Text).required(),
            FieldMapping::new("per_org_id", "perOrgId", Text).required(),
            FieldMapping::new("vaccine_code", "vaccineCode", Text).required(),
            FieldMapping::new("vaccine_name", "vaccineName", Text).required(),
            FieldMapping::new("long_description", "longDescription", Text),
            FieldMapping::new("coding_system", "codingSystem", Text),
            FieldMapping::new("is_funded", "isFunded", Boolean)
                .with_default(crate::value_objects::FieldValue::Boolean(false)),
            FieldMapping::new("notes", "notes", Text),
        ],
        tracked_fields: vec![
            "vaccineCode",
            "vaccineName",
            "longDescription",
            "codingSystem",
            "isFunded",
        ],
        comparison_rules: BTreeMap::from([
            ("vaccineCode", ComparisonRule::new(RuleKind::AlwaysVersion, 1.0)),
            ("vaccineName", ComparisonRule::new(RuleKind::Exact, 0.8)),
            ("longDescription", ComparisonRule::new(RuleKind::Significant, 0.3)),
            ("codingSystem", ComparisonRule::new(RuleKind::Exact, 0.5)),
            ("isFunded", ComparisonRule::new(RuleKind::Significant, 0.4)),
            ("notes", ComparisonRule::new(RuleKind::NeverVersion, 0.0)),
        ]),
        change_threshold: 0.4,
    }
}

fn medicine_handler() -> DimensionHandler {
    use FieldKind::*;
    DimensionHandler {
        dimension: DimensionType::Medicine,
        extract_type: "medicine",
        source_table: "stg.medicines",
        target_table: "core.medicine",
        surrogate_key_column: "medicine_key",
        business_key_fields: &["medicine_id", "per_org_id"],
        field_mappings: vec![
            FieldMapping::new("medicine_id", "medicineId", Text).required(),
            FieldMapping::new("per_org_id", "perOrgId", Text).required(),
            FieldMapping::new("medicine_code", "medicineCode", Text).required(),
            FieldMapping::new("medicine_name", "medicineName", Text).required(),
            FieldMapping::new("form", "form", Text),
            FieldMapping::new("strength", "strength", Text),
            FieldMapping::new("route", "route", Text),
            FieldMapping::new("is_prescribable", "isPrescribable", Boolean)
                .with_default(crate::value_objects::FieldValue::Boolean(true)),
            FieldMapping::new("notes", "notes", Text),
        ],
        tracked_fields: vec![
            "medicineCode",
            "medicineName",
            "form",
            "strength",
            "route",
            "isPrescribable",
        ],
        comparison_rules: BTreeMap::from([
            ("medicineCode", ComparisonRule::new(RuleKind::AlwaysVersion, 1.0)),
            ("medicineName", ComparisonRule::new(RuleKind::Exact, 0.8)),
            ("form", ComparisonRule::new(RuleKind::Significant, 0.4)),
            ("strength", ComparisonRule::new(RuleKind::Significant, 0.5)),
            ("route", ComparisonRule::new(RuleKind::Significant, 0.3)),
            ("isPrescribable", ComparisonRule::new(RuleKind::Significant, 0.4)),
            ("notes", ComparisonRule::new(RuleKind::NeverVersion, 0.0)),
        ]),
        change_threshold: 0.4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_is_internally_consistent() {
        let registry = DimensionHandlerRegistry::standard();
        registry.validate().unwrap();
        assert_eq!(registry.handlers().count(), 5);
    }

    #[test]
    fn business_key_columns_follow_target_casing() {
        let registry = DimensionHandlerRegistry::standard();
        let patient = registry.handler(DimensionType::Patient).unwrap();
        assert_eq!(
            patient.business_key_columns().unwrap(),
            vec!["patient_id", "practice_id", "per_org_id"]
        );
    }

    #[test]
    fn tracked_fields_exclude_never_version_rules() {
        let registry = DimensionHandlerRegistry::standard();
        for handler in registry.handlers() {
            for field in &handler.tracked_fields {
                let rule = handler.rule_for(field).unwrap();
                assert_ne!(rule.kind, RuleKind::NeverVersion, "{} {}", handler.dimension, field);
            }
        }
    }

    #[test]
    fn extract_type_lookup_finds_handlers() {
        let registry = DimensionHandlerRegistry::shared();
        assert_eq!(
            registry.by_extract_type("vaccine").unwrap().dimension,
            DimensionType::Vaccine
        );
        assert!(registry.by_extract_type("unknown").is_none());
    }
}
