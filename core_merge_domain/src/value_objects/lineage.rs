// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Row lineage: the upstream load run that produced or last touched a row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-row reference back to the upstream load run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    pub load_run_id: Uuid,
    pub load_ts: DateTime<Utc>,
}

impl Lineage {
    pub fn new(load_run_id: Uuid, load_ts: DateTime<Utc>) -> Self {
        Self { load_run_id, load_ts }
    }
}
