// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Tracing setup for the merge engine.
//!
//! The configured log level seeds the default filter; `RUST_LOG` still
//! overrides per module. Initialisation is idempotent so tests can call it
//! freely.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialises the global tracing subscriber.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("core_merge={},sqlx=warn", log_level)));
    // try_init: a second call (tests, embedding hosts) is a no-op
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
