// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Core Merge
//!
//! The engine half of the core warehouse merger: application services that
//! drive SCD2 dimension loads, FK-resolved fact loads, and idempotent merge
//! runs, plus the PostgreSQL adapters, FK cache, configuration, logging,
//! metrics, and progress tracking they depend on.
//!
//! The domain model (entities, value objects, the change classifier, and
//! the handler registries) lives in the `core-merge-domain` crate; this
//! crate supplies everything that touches a runtime or a database.
//!
//! ## Typical Wiring
//!
//! Construct the PostgreSQL repositories over one `PgPool`, build the
//! loaders and the FK resolver over those, and hand everything to
//! [`MergeOrchestrator`](application::services::MergeOrchestrator).
//! `merge_to_core` then runs the phases: dimensions in dependency order,
//! cache warmup, facts, audit finalisation.

pub mod application;
pub mod infrastructure;

pub use application::services::{
    DimensionLoadOptions, DimensionLoader, FactLoadOptions, FactLoader, FkResolver, MergeOptions,
    MergeOrchestrator, MergeResult,
};
pub use infrastructure::config::MergeConfig;
