// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Read-only port over the external staging-run audit service.

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::LoadRun;
use crate::error::MergeError;

/// Resolves load-run descriptors from `etl.load_runs`.
#[async_trait]
pub trait LoadRunRepository: Send + Sync {
    async fn find(&self, load_run_id: Uuid) -> Result<Option<LoadRun>, MergeError>;
}
