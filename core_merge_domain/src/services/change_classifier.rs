// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Change Classifier (SCD2 engine)
//!
//! Given the prior current version (or none) and the incoming version built
//! from a staging row, classify the row as NEW, UPDATED, or NO_CHANGE and
//! compute the significance score backing the decision.
//!
//! ## Algorithm
//!
//! 1. No prior version: NEW, score 1.0, no attribute changes.
//! 2. Compute the incoming fingerprint over the handler's tracked fields.
//! 3. Fast path (`hash` strategy): equal prior and incoming fingerprints
//!    mean no tracked changes; diff the non-tracked fields only and return
//!    NO_CHANGE so the loader can update them in place.
//! 4. Otherwise diff the union of fields present in prior and incoming,
//!    each under its rule's comparator. A diff is significant iff the rule
//!    kind is `exact`, `significant`, or `always_version`.
//! 5. Score = significant weight / rule-covered weight, clamped to [0,1],
//!    0 when no diff is rule-covered. `never_version` rules and fields
//!    without a rule contribute zero weight.
//! 6. UPDATED iff any `always_version` field differs, or score reaches the
//!    handler's change threshold.
//!
//! ## Strategy Parity
//!
//! The `field` strategy skips the fingerprint fast path and recomputes
//! per-field diffs unconditionally. Both strategies agree on the decision;
//! `hash` is the authoritative default.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::entities::DimensionVersion;
use crate::handlers::{DimensionHandler, RuleKind};
use crate::services::normalizer::ValueNormalizer;
use crate::value_objects::{FieldValue, Fingerprint};

/// Classification outcome for one staging row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    New,
    Updated,
    NoChange,
}

/// One field-level difference between prior and incoming.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    pub field: String,
    pub prior: FieldValue,
    pub incoming: FieldValue,
    /// True when the field's rule kind counts toward versioning.
    pub significant: bool,
}

/// The classifier's full answer for one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub change_type: ChangeType,
    pub attribute_changes: Vec<AttributeChange>,
    pub significance_score: f64,
    pub fingerprint: Fingerprint,
}

impl Change {
    /// Differences on fields that do not version, applied in place by the
    /// loader on NO_CHANGE.
    pub fn in_place_changes(&self) -> impl Iterator<Item = &AttributeChange> {
        self.attribute_changes.iter().filter(|c| !c.significant)
    }
}

/// Which comparison path the classifier takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scd2Strategy {
    /// Fingerprint fast path, per-field diffs only when it misses.
    Hash,
    /// Per-field diffs unconditionally.
    Field,
}

impl Default for Scd2Strategy {
    fn default() -> Self {
        Scd2Strategy::Hash
    }
}

/// Stateless SCD2 classification service.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeClassifier {
    normalizer: ValueNormalizer,
}

impl ChangeClassifier {
    pub fn new() -> Self {
        Self {
            normalizer: ValueNormalizer::new(),
        }
    }

    /// Classifies with the default `hash` strategy.
    pub fn classify(
        &self,
        handler: &DimensionHandler,
        prior: Option<&DimensionVersion>,
        incoming: &DimensionVersion,
    ) -> Change {
        self.classify_with_strategy(handler, prior, incoming, Scd2Strategy::Hash)
    }

    pub fn classify_with_strategy(
        &self,
        handler: &DimensionHandler,
        prior: Option<&DimensionVersion>,
        incoming: &DimensionVersion,
        strategy: Scd2Strategy,
    ) -> Change {
        let tracked = handler.tracked_fields.as_slice();
        let fingerprint = self.normalizer.fingerprint(incoming.attributes(), tracked);

        let Some(prior) = prior else {
            return Change {
                change_type: ChangeType::New,
                attribute_changes: Vec::new(),
                significance_score: 1.0,
                fingerprint,
            };
        };

        if strategy == Scd2Strategy::Hash {
            let prior_fingerprint = self.normalizer.fingerprint(prior.attributes(), tracked);
            if prior_fingerprint == fingerprint {
                // No tracked changes; surface non-tracked diffs for the
                // loader's in-place update.
                let changes = self.diff_non_tracked(handler, prior, incoming);
                return Change {
                    change_type: ChangeType::NoChange,
                    attribute_changes: changes,
                    significance_score: 0.0,
                    fingerprint,
                };
            }
        }

        let mut changes = Vec::new();
        let mut covered_weight = 0.0;
        let mut significant_weight = 0.0;
        let mut forced = false;

        for field in self.field_union(prior, incoming) {
            let prior_value = prior.attribute(&field);
            let incoming_value = incoming.attribute(&field);
            let rule = handler.rule_for(&field);

            let differs = match rule.map(|r| r.kind) {
                Some(RuleKind::Significant) => {
                    !self.normalizer.significant_eq(prior_value, incoming_value)
                }
                _ => !self.normalizer.canonical_eq(prior_value, incoming_value),
            };
            if !differs {
                continue;
            }

            let significant = rule.map(|r| r.kind.is_significant()).unwrap_or(false);
            if let Some(rule) = rule {
                let weight = rule.effective_weight();
                covered_weight += weight;
                if significant {
                    significant_weight += weight;
                }
                if rule.kind == RuleKind::AlwaysVersion {
                    forced = true;
                }
            }
            changes.push(AttributeChange {
                field,
                prior: prior_value.clone(),
                incoming: incoming_value.clone(),
                significant,
            });
        }

        let significance_score = if covered_weight > 0.0 {
            (significant_weight / covered_weight).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let change_type = if forced || significance_score >= handler.change_threshold {
            ChangeType::Updated
        } else {
            ChangeType::NoChange
        };

        Change {
            change_type,
            attribute_changes: changes,
            significance_score,
            fingerprint,
        }
    }

    fn field_union(&self, prior: &DimensionVersion, incoming: &DimensionVersion) -> Vec<String> {
        let mut fields: BTreeSet<String> = prior.attributes().keys().cloned().collect();
        fields.extend(incoming.attributes().keys().cloned());
        fields.into_iter().collect()
    }

    fn diff_non_tracked(
        &self,
        handler: &DimensionHandler,
        prior: &DimensionVersion,
        incoming: &DimensionVersion,
    ) -> Vec<AttributeChange> {
        self.field_union(prior, incoming)
            .into_iter()
            .filter(|field| !handler.is_tracked(field))
            .filter_map(|field| {
                let prior_value = prior.attribute(&field);
                let incoming_value = incoming.attribute(&field);
                if self.normalizer.canonical_eq(prior_value, incoming_value) {
                    None
                } else {
                    Some(AttributeChange {
                        field,
                        prior: prior_value.clone(),
                        incoming: incoming_value.clone(),
                        significant: false,
                    })
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{DimensionHandlerRegistry, DimensionType};
    use crate::value_objects::{BusinessKey, Lineage};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn patient_handler() -> DimensionHandler {
        DimensionHandlerRegistry::standard()
            .handler(DimensionType::Patient)
            .unwrap()
            .clone()
    }

    fn version(fields: &[(&str, &str)]) -> DimensionVersion {
        let key = BusinessKey::new(vec![
            ("patient_id".to_string(), FieldValue::Text("P1".to_string())),
            ("practice_id".to_string(), FieldValue::Text("PR1".to_string())),
            ("per_org_id".to_string(), FieldValue::Text("O1".to_string())),
        ])
        .unwrap();
        let attributes: BTreeMap<String, FieldValue> = fields
            .iter()
            .map(|(f, v)| ((*f).to_string(), FieldValue::Text((*v).to_string())))
            .collect();
        DimensionVersion::new_current(key, attributes, Utc::now(), Lineage::new(Uuid::new_v4(), Utc::now()))
    }

    #[test]
    fn absent_prior_is_new() {
        let handler = patient_handler();
        let incoming = version(&[("firstName", "John"), ("familyName", "Doe")]);
        let change = ChangeClassifier::new().classify(&handler, None, &incoming);
        assert_eq!(change.change_type, ChangeType::New);
        assert_eq!(change.significance_score, 1.0);
        assert!(change.attribute_changes.is_empty());
    }

    #[test]
    fn tracked_change_versions() {
        let handler = patient_handler();
        let prior = version(&[("firstName", "John"), ("familyName", "Doe")]);
        let incoming = version(&[("firstName", "John"), ("familyName", "Smith")]);
        let change = ChangeClassifier::new().classify(&handler, Some(&prior), &incoming);
        assert_eq!(change.change_type, ChangeType::Updated);
        assert!(change.significance_score >= handler.change_threshold);
        assert!(change.attribute_changes.iter().any(|c| c.field == "familyName" && c.significant));
    }

    #[test]
    fn never_version_change_is_no_change_with_diffs() {
        let handler = patient_handler();
        let prior = version(&[("firstName", "John"), ("email", "a@x")]);
        let incoming = version(&[("firstName", "John"), ("email", "b@x")]);
        let change = ChangeClassifier::new().classify(&handler, Some(&prior), &incoming);
        assert_eq!(change.change_type, ChangeType::NoChange);
        assert_eq!(change.significance_score, 0.0);
        let diffs: Vec<_> = change.in_place_changes().collect();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].field, "email");
    }

    #[test]
    fn always_version_forces_update_regardless_of_threshold() {
        let mut handler = patient_handler();
        handler.change_threshold = 1.0;
        let prior = version(&[("firstName", "John"), ("nhiNumber", "ZZZ1")]);
        let incoming = version(&[("firstName", "John"), ("nhiNumber", "ZZZ2")]);
        let change = ChangeClassifier::new().classify(&handler, Some(&prior), &incoming);
        assert_eq!(change.change_type, ChangeType::Updated);
    }

    #[test]
    fn unknown_fields_never_trigger_updates_alone() {
        let handler = patient_handler();
        let prior = version(&[("firstName", "John"), ("mystery", "a")]);
        let incoming = version(&[("firstName", "John"), ("mystery", "b")]);
        let change = ChangeClassifier::new().classify(&handler, Some(&prior), &incoming);
        assert_eq!(change.change_type, ChangeType::NoChange);
        assert_eq!(change.significance_score, 0.0);
        assert_eq!(change.attribute_changes.len(), 1);
        assert!(!change.attribute_changes[0].significant);
    }

    #[test]
    fn hash_and_field_strategies_agree() {
        let handler = patient_handler();
        let classifier = ChangeClassifier::new();
        let cases = [
            (
                version(&[("firstName", "John"), ("familyName", "Doe")]),
                version(&[("firstName", "John"), ("familyName", "Doe")]),
            ),
            (
                version(&[("firstName", "John"), ("familyName", "Doe")]),
                version(&[("firstName", "John"), ("familyName", "Smith")]),
            ),
            (
                version(&[("firstName", "John"), ("email", "a@x")]),
                version(&[("firstName", "John"), ("email", "b@x")]),
            ),
        ];
        for (prior, incoming) in &cases {
            let hash = classifier.classify_with_strategy(&handler, Some(prior), incoming, Scd2Strategy::Hash);
            let field =
                classifier.classify_with_strategy(&handler, Some(prior), incoming, Scd2Strategy::Field);
            assert_eq!(hash.change_type, field.change_type);
        }
    }

    #[test]
    fn case_only_difference_is_not_a_change() {
        let handler = patient_handler();
        let prior = version(&[("firstName", "John"), ("familyName", "Doe")]);
        let incoming = version(&[("firstName", "JOHN "), ("familyName", "doe")]);
        let change = ChangeClassifier::new().classify(&handler, Some(&prior), &incoming);
        assert_eq!(change.change_type, ChangeType::NoChange);
        assert!(change.attribute_changes.is_empty());
    }
}
