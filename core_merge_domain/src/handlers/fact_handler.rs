// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Fact Handler Registry
//!
//! Static per-fact configuration: staging source and core target tables,
//! the business key, field mappings, and the foreign-key relationships with
//! their per-relationship missing-dimension policy.
//!
//! ## Missing-FK Policy Matrix
//!
//! | required | strategy | on absent dimension |
//! |---|---|---|
//! | true | `error` | abort the load (or record and skip with continueOnError) |
//! | true | `skip` | skip the fact row, count per dimension |
//! | false | `null` | null the column, proceed |
//! | false | `skip` | skip the fact row |
//! | any | `placeholder` | reserved, rejected by validation |

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;

use crate::error::MergeError;
use crate::handlers::dimension_handler::DimensionType;
use crate::handlers::field_mapping::FieldMapping;
use crate::value_objects::FieldKind;

/// The fact types the warehouse models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FactType {
    Appointment,
    Immunisation,
    Invoice,
    InvoiceDetail,
    Diagnosis,
    Measurement,
}

impl FactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactType::Appointment => "appointment",
            FactType::Immunisation => "immunisation",
            FactType::Invoice => "invoice",
            FactType::InvoiceDetail => "invoice_detail",
            FactType::Diagnosis => "diagnosis",
            FactType::Measurement => "measurement",
        }
    }

    pub fn all() -> [FactType; 6] {
        [
            FactType::Appointment,
            FactType::Immunisation,
            FactType::Invoice,
            FactType::InvoiceDetail,
            FactType::Diagnosis,
            FactType::Measurement,
        ]
    }
}

impl fmt::Display for FactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy when a referenced dimension cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingStrategy {
    Error,
    Skip,
    Null,
    /// Reserved by the policy matrix; no handler may declare it.
    Placeholder,
}

/// One dimension reference carried by a fact.
#[derive(Debug, Clone)]
pub struct ForeignKeyRelationship {
    pub dimension: DimensionType,
    /// Target FK column, e.g. `patient_key`.
    pub fact_column: &'static str,
    /// Staging fields forming the dimension's business key, in key order.
    pub lookup_fields: &'static [&'static str],
    pub required: bool,
    pub missing_strategy: MissingStrategy,
    pub nullable: bool,
}

/// Static description of one fact.
#[derive(Debug, Clone)]
pub struct FactHandler {
    pub fact: FactType,
    pub extract_type: &'static str,
    pub source_table: &'static str,
    pub target_table: &'static str,
    /// Ordered staging field names forming the fact's natural key.
    pub business_key_fields: &'static [&'static str],
    pub foreign_keys: Vec<ForeignKeyRelationship>,
    pub field_mappings: Vec<FieldMapping>,
}

impl FactHandler {
    pub fn mapping_for_source(&self, source_field: &str) -> Option<&FieldMapping> {
        self.field_mappings.iter().find(|m| m.source_field == source_field)
    }

    /// Warehouse columns of the business key, in key order.
    pub fn business_key_columns(&self) -> Result<Vec<String>, MergeError> {
        self.business_key_fields
            .iter()
            .map(|source| {
                self.mapping_for_source(source)
                    .map(|m| crate::services::field_case::to_snake_case(m.target_field))
                    .ok_or_else(|| {
                        MergeError::invalid_config(format!(
                            "fact {} business key field '{}' has no mapping",
                            self.fact, source
                        ))
                    })
            })
            .collect()
    }

    /// Staging columns this handler reads, mappings plus FK lookups.
    pub fn source_fields(&self) -> Vec<&'static str> {
        let mut fields: Vec<&'static str> =
            self.field_mappings.iter().map(|m| m.source_field).collect();
        for fk in &self.foreign_keys {
            for lookup in fk.lookup_fields {
                if !fields.contains(lookup) {
                    fields.push(lookup);
                }
            }
        }
        fields
    }

    pub fn validate(&self) -> Result<(), MergeError> {
        for field in self.business_key_fields {
            if self.mapping_for_source(field).is_none() {
                return Err(MergeError::invalid_config(format!(
                    "fact {} business key field '{}' has no mapping",
                    self.fact, field
                )));
            }
        }
        for fk in &self.foreign_keys {
            if fk.missing_strategy == MissingStrategy::Placeholder {
                return Err(MergeError::invalid_config(format!(
                    "fact {} relationship {} declares the reserved placeholder strategy",
                    self.fact, fk.fact_column
                )));
            }
            if fk.lookup_fields.is_empty() {
                return Err(MergeError::invalid_config(format!(
                    "fact {} relationship {} has no lookup fields",
                    self.fact, fk.fact_column
                )));
            }
            if !fk.required && fk.missing_strategy == MissingStrategy::Error {
                return Err(MergeError::invalid_config(format!(
                    "fact {} relationship {} is optional but declares the error strategy",
                    self.fact, fk.fact_column
                )));
            }
        }
        Ok(())
    }
}

/// Registry of the standard fact handlers.
#[derive(Debug, Clone)]
pub struct FactHandlerRegistry {
    handlers: BTreeMap<FactType, FactHandler>,
}

static STANDARD_FACTS: Lazy<FactHandlerRegistry> = Lazy::new(FactHandlerRegistry::standard);

impl FactHandlerRegistry {
    /// The process-wide standard registry.
    pub fn shared() -> &'static Self {
        &STANDARD_FACTS
    }

    /// Builds the standard registry covering all six facts.
    pub fn standard() -> Self {
        Self::from_handlers([
            appointment_handler(),
            immunisation_handler(),
            invoice_handler(),
            invoice_detail_handler(),
            diagnosis_handler(),
            measurement_handler(),
        ])
    }

    /// Builds a registry from explicit handlers; later handlers replace
    /// earlier ones for the same fact type.
    pub fn from_handlers(handlers: impl IntoIterator<Item = FactHandler>) -> Self {
        let mut map = BTreeMap::new();
        for handler in handlers {
            map.insert(handler.fact, handler);
        }
        Self { handlers: map }
    }

    pub fn handler(&self, fact: FactType) -> Result<&FactHandler, MergeError> {
        self.handlers.get(&fact).ok_or_else(|| {
            MergeError::invalid_config(format!("no handler registered for fact {}", fact))
        })
    }

    pub fn by_extract_type(&self, extract_type: &str) -> Option<&FactHandler> {
        self.handlers.values().find(|h| h.extract_type == extract_type)
    }

    pub fn handlers(&self) -> impl Iterator<Item = &FactHandler> {
        self.handlers.values()
    }

    pub fn validate(&self) -> Result<(), MergeError> {
        for handler in self.handlers.values() {
            handler.validate()?;
        }
        Ok(())
    }
}

const PATIENT_LOOKUP: &[&str] = &["patient_id", "practice_id", "per_org_id"];
const PROVIDER_LOOKUP: &[&str] = &["provider_id", "practice_id", "per_org_id"];
const PRACTICE_LOOKUP: &[&str] = &["practice_id", "per_org_id"];

fn patient_fk() -> ForeignKeyRelationship {
    ForeignKeyRelationship {
        dimension: DimensionType::Patient,
        fact_column: "patient_key",
        lookup_fields: PATIENT_LOOKUP,
        required: true,
        missing_strategy: MissingStrategy::Skip,
        nullable: false,
    }
}

fn practice_fk() -> ForeignKeyRelationship {
    ForeignKeyRelationship {
        dimension: DimensionType::Practice,
        fact_column: "practice_key",
        lookup_fields: PRACTICE_LOOKUP,
        required: true,
        missing_strategy: MissingStrategy::Skip,
        nullable: false,
    }
}

fn provider_fk() -> ForeignKeyRelationship {
    ForeignKeyRelationship {
        dimension: DimensionType::Provider,
        fact_column: "provider_key",
        lookup_fields: PROVIDER_LOOKUP,
        required: false,
        missing_strategy: MissingStrategy::Null,
        nullable: true,
    }
}

fn appointment_handler() -> FactHandler {
    use FieldKind::*;
    FactHandler {
        fact: FactType::Appointment,
        extract_type: "appointment",
        source_table: "stg.appointments",
        target_table: "core.fact_appointment",
        business_key_fields: &["appointment_id", "practice_id", "per_org_id"],
        foreign_keys: vec![patient_fk(), practice_fk(), provider_fk()],
        field_mappings: vec![
            FieldMapping::new("appointment_id", "appointmentId", Text).required(),
            FieldMapping::new("practice_id", "practiceId", Text).required(),
            FieldMapping::new("per_org_id", "perOrgId", Text).required(),
            FieldMapping::new("scheduled_at", "scheduledAt", Timestamp).required(),
            FieldMapping::new("duration_minutes", "durationMinutes", Integer),
            FieldMapping::new("appointment_type", "appointmentType", Text),
            FieldMapping::new("appointment_status", "appointmentStatus", Text),
            FieldMapping::new("arrived_at", "arrivedAt", Timestamp),
            FieldMapping::new("completed_at", "completedAt", Timestamp),
            FieldMapping::new("cancellation_reason", "cancellationReason", Text),
        ],
    }
}

fn immunisation_handler() -> FactHandler {
    use FieldKind::*;
    FactHandler {
        fact: FactType::Immunisation,
        extract_type: "immunisation",
        source_table: "stg.immunisations",
        target_table: "core.fact_immunisation",
        business_key_fields: &["immunisation_id", "practice_id", "per_org_id"],
        foreign_keys: vec![
            patient_fk(),
            practice_fk(),
            provider_fk(),
            ForeignKeyRelationship {
                dimension: DimensionType::Vaccine,
                fact_column: "vaccine_key",
                lookup_fields: &["vaccine_id", "per_org_id"],
                required: true,
                missing_strategy: MissingStrategy::Skip,
                nullable: false,
            },
        ],
        field_mappings: vec![
            FieldMapping::new("immunisation_id", "immunisationId", Text).required(),
            FieldMapping::new("practice_id", "practiceId", Text).required(),
            FieldMapping::new("per_org_id", "perOrgId", Text).required(),
            FieldMapping::new("administered_at", "administeredAt", Timestamp).required(),
            FieldMapping::new("dose_number", "doseNumber", Integer),
            FieldMapping::new("batch_number", "batchNumber", Text),
            FieldMapping::new("injection_site", "injectionSite", Text),
            FieldMapping::new("outcome", "outcome", Text),
        ],
    }
}

fn invoice_handler() -> FactHandler {
    use FieldKind::*;
    FactHandler {
        fact: FactType::Invoice,
        extract_type: "invoice",
        source_table: "stg.invoices",
        target_table: "core.fact_invoice",
        business_key_fields: &["invoice_id", "practice_id", "per_org_id"],
        foreign_keys: vec![patient_fk(), practice_fk(), provider_fk()],
        field_mappings: vec![
            FieldMapping::new("invoice_id", "invoiceId", Text).required(),
            FieldMapping::new("practice_id", "practiceId", Text).required(),
            FieldMapping::new("per_org_id", "perOrgId", Text).required(),
            FieldMapping::new("invoiced_at", "invoicedAt", Timestamp).required(),
            FieldMapping::new("total_amount", "totalAmount", Float).required(),
            FieldMapping::new("paid_amount", "paidAmount", Float),
            FieldMapping::new("payment_status", "paymentStatus", Text),
        ],
    }
}

fn invoice_detail_handler() -> FactHandler {
    use FieldKind::*;
    FactHandler {
        fact: FactType::InvoiceDetail,
        extract_type: "invoice_detail",
        source_table: "stg.invoice_details",
        target_table: "core.fact_invoice_detail",
        business_key_fields: &["invoice_detail_id", "practice_id", "per_org_id"],
        foreign_keys: vec![patient_fk(), practice_fk()],
        field_mappings: vec![
            FieldMapping::new("invoice_detail_id", "invoiceDetailId", Text).required(),
            FieldMapping::new("invoice_id", "invoiceId", Text).required(),
            FieldMapping::new("practice_id", "practiceId", Text).required(),
            FieldMapping::new("per_org_id", "perOrgId", Text).required(),
            FieldMapping::new("line_number", "lineNumber", Integer),
            FieldMapping::new("service_code", "serviceCode", Text),
            FieldMapping::new("description", "description", Text),
            FieldMapping::new("quantity", "quantity", Float),
            FieldMapping::new("unit_price", "unitPrice", Float),
            FieldMapping::new("line_amount", "lineAmount", Float).required(),
        ],
    }
}

fn diagnosis_handler() -> FactHandler {
    use FieldKind::*;
    FactHandler {
        fact: FactType::Diagnosis,
        extract_type: "diagnosis",
        source_table: "stg.diagnoses",
        target_table: "core.fact_diagnosis",
        business_key_fields: &["diagnosis_id", "practice_id", "per_org_id"],
        foreign_keys: vec![patient_fk(), practice_fk(), provider_fk()],
        field_mappings: vec![
            FieldMapping::new("diagnosis_id", "diagnosisId", Text).required(),
            FieldMapping::new("practice_id", "practiceId", Text).required(),
            FieldMapping::new("per_org_id", "perOrgId", Text).required(),
            FieldMapping::new("diagnosed_at", "diagnosedAt", Timestamp).required(),
            FieldMapping::new("diagnosis_code", "diagnosisCode", Text).required(),
            FieldMapping::new("coding_system", "codingSystem", Text),
            FieldMapping::new("description", "description", Text),
            FieldMapping::new("is_chronic", "isChronic", Boolean),
        ],
    }
}

fn measurement_handler() -> FactHandler {
    use FieldKind::*;
    FactHandler {
        fact: FactType::Measurement,
        extract_type: "measurement",
        source_table: "stg.measurements",
        target_table: "core.fact_measurement",
        business_key_fields: &["measurement_id", "practice_id", "per_org_id"],
        foreign_keys: vec![patient_fk(), practice_fk(), provider_fk()],
        field_mappings: vec![
            FieldMapping::new("measurement_id", "measurementId", Text).required(),
            FieldMapping::new("practice_id", "practiceId", Text).required(),
            FieldMapping::new("per_org_id", "perOrgId", Text).required(),
            FieldMapping::new("measured_at", "measuredAt", Timestamp).required(),
            FieldMapping::new("measurement_type", "measurementType", Text).required(),
            FieldMapping::new("value_numeric", "valueNumeric", Float),
            FieldMapping::new("value_text", "valueText", Text),
            FieldMapping::new("unit", "unit", Text),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_is_internally_consistent() {
        let registry = FactHandlerRegistry::standard();
        registry.validate().unwrap();
        assert_eq!(registry.handlers().count(), 6);
    }

    #[test]
    fn appointment_covers_the_policy_matrix() {
        let registry = FactHandlerRegistry::standard();
        let appointment = registry.handler(FactType::Appointment).unwrap();
        let patient = appointment
            .foreign_keys
            .iter()
            .find(|fk| fk.dimension == DimensionType::Patient)
            .unwrap();
        assert!(patient.required);
        assert_eq!(patient.missing_strategy, MissingStrategy::Skip);
        let provider = appointment
            .foreign_keys
            .iter()
            .find(|fk| fk.dimension == DimensionType::Provider)
            .unwrap();
        assert!(!provider.required);
        assert_eq!(provider.missing_strategy, MissingStrategy::Null);
        assert!(provider.nullable);
    }

    #[test]
    fn source_fields_include_fk_lookups_once() {
        let registry = FactHandlerRegistry::shared();
        let appointment = registry.handler(FactType::Appointment).unwrap();
        let fields = appointment.source_fields();
        assert!(fields.contains(&"patient_id"));
        assert!(fields.contains(&"provider_id"));
        assert_eq!(
            fields.iter().filter(|f| **f == "practice_id").count(),
            1,
            "lookup fields overlapping mappings must not duplicate"
        );
    }
}
