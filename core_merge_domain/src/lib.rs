// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Core Merge Domain
//!
//! The domain layer of the core warehouse merger: the subsystem that turns
//! validated staging rows into a dimensional model with SCD2 version
//! history. It is pure business logic, independent of databases, runtimes,
//! and configuration; those concerns live behind the repository ports and
//! are implemented in the `core-merge` crate.
//!
//! ## Module Structure
//!
//! ### Entities
//!
//! Objects with identity and lifecycle:
//!
//! - `DimensionVersion`: one SCD2 version of a dimension entity
//! - `FactRecord`: an assembled fact row with point-in-time FK capture
//! - `MergeRun`: the audit record and state machine of one merge
//! - `LoadRun`: read-only view of one upstream ingest
//!
//! ### Value Objects
//!
//! Immutable, self-validating types:
//!
//! - `FieldValue` / `FieldKind`: the dynamic row value sum type
//! - `StagingRow`: one opaque staging record
//! - `BusinessKey`: composite natural key in canonical form
//! - `SurrogateKey`, `MergeRunId`, `Fingerprint`, `Lineage`
//!
//! ### Domain Services
//!
//! Stateless logic that spans objects:
//!
//! - `ValueNormalizer`: canonical forms and tracked-field fingerprints
//! - `ChangeClassifier`: NEW / UPDATED / NO_CHANGE decisions with
//!   per-field significance scoring
//!
//! ### Handler Registries
//!
//! Static descriptions of the dimensional model: per-dimension field
//! mappings, tracked sets, comparison rules, and thresholds; per-fact
//! business keys, mappings, and FK relationships with missing-dimension
//! policies.
//!
//! ### Repository Ports
//!
//! Async traits over staging reads, SCD2 dimension writes, fact upserts,
//! merge-run audit records, and load-run lookups.
//!
//! ## Business Rules
//!
//! The domain enforces the SCD2 invariants:
//!
//! - exactly one current version per business key, `effective_to` null
//!   iff current
//! - version ranges are disjoint and ordered by `effective_from`
//! - surrogate keys are never reused and never mutate
//! - facts capture surrogate keys at load time and are never re-bound

pub mod entities;
pub mod error;
pub mod handlers;
pub mod repositories;
pub mod services;
pub mod value_objects;

pub use error::MergeError;
