// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Repository ports: persistence abstractions the application layer
//! depends on. Adapters live in the `core-merge` crate.

pub mod dimension_repository;
pub mod fact_repository;
pub mod load_run_repository;
pub mod merge_run_repository;
pub mod staging_repository;

pub use dimension_repository::DimensionRepository;
pub use fact_repository::FactRepository;
pub use load_run_repository::LoadRunRepository;
pub use merge_run_repository::MergeRunRepository;
pub use staging_repository::{FieldDescriptor, StagingQuery, StagingRepository};
