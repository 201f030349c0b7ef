// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Value objects for the core merge domain.
//!
//! Immutable, self-validating types defined by their attributes: dynamic
//! field values, staging rows, business keys, surrogate keys, fingerprints,
//! lineage, and identifiers.

pub mod business_key;
pub mod field_value;
pub mod fingerprint;
pub mod lineage;
pub mod merge_run_id;
pub mod staging_row;
pub mod surrogate_key;

pub use business_key::BusinessKey;
pub use field_value::{FieldKind, FieldValue};
pub use fingerprint::Fingerprint;
pub use lineage::Lineage;
pub use merge_run_id::MergeRunId;
pub use staging_row::StagingRow;
pub use surrogate_key::SurrogateKey;
