// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain services: stateless operations on domain objects.

pub mod change_classifier;
pub mod field_case;
pub mod normalizer;

pub use change_classifier::{AttributeChange, Change, ChangeClassifier, ChangeType, Scd2Strategy};
pub use normalizer::ValueNormalizer;
