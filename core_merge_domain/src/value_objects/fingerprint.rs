// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Fingerprint
//!
//! A stable SHA-256 digest over a dimension's tracked fields in canonical
//! form. Two records with identical tracked-field canonical values produce
//! identical fingerprints regardless of key order or non-tracked values,
//! which is what lets the change classifier take its fast path.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hex-encoded SHA-256 digest over the canonical tracked-field serialisation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wraps a hex digest produced by the value normaliser.
    pub(crate) fn from_hex_digest(digest: String) -> Self {
        Self(digest)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
