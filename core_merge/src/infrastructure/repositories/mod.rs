// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! PostgreSQL adapters for the domain repository ports.

pub mod pg_dimension_repository;
pub mod pg_fact_repository;
pub mod pg_load_run_repository;
pub mod pg_merge_run_repository;
pub mod pg_staging_repository;
pub mod schema;
pub mod session;
pub mod sql;

pub use pg_dimension_repository::PgDimensionRepository;
pub use pg_fact_repository::PgFactRepository;
pub use pg_load_run_repository::PgLoadRunRepository;
pub use pg_merge_run_repository::PgMergeRunRepository;
pub use pg_staging_repository::PgStagingRepository;
