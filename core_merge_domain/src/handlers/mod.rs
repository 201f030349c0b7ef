// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Static handler registries describing the dimensional model.

pub mod dimension_handler;
pub mod fact_handler;
pub mod field_mapping;

pub use dimension_handler::{
    ComparisonRule, DimensionHandler, DimensionHandlerRegistry, DimensionType, RuleKind,
};
pub use fact_handler::{
    FactHandler, FactHandlerRegistry, FactType, ForeignKeyRelationship, MissingStrategy,
};
pub use field_mapping::{FieldMapping, FieldTransform};
