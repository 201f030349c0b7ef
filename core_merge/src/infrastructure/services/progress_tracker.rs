// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Progress Tracker
//!
//! Advisory side-channel monitor for a running merge. Loaders record batch
//! completions with atomic counters; observers poll `snapshot()` for phase,
//! current target, processed/total, rate, and ETA. Updates are best-effort
//! and losing one is never an error.
//!
//! ## Thread Safety
//!
//! Counters are lock-free atomics; the phase and target strings sit behind
//! a short-lived lock taken only on phase transitions and snapshots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;

/// Which stage of the merge is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePhase {
    Idle,
    Dimensions,
    CacheWarmup,
    Facts,
    Finalising,
}

/// One observed point of merge progress.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub phase: MergePhase,
    /// The dimension or fact currently loading, if any.
    pub current_target: Option<String>,
    pub processed: u64,
    pub total: u64,
    pub rows_per_second: f64,
    pub eta_seconds: Option<u64>,
}

struct PhaseState {
    phase: MergePhase,
    current_target: Option<String>,
    started: Instant,
}

/// Advisory progress monitor shared between the orchestrator and loaders.
pub struct ProgressTracker {
    state: RwLock<PhaseState>,
    processed: AtomicU64,
    total: AtomicU64,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(PhaseState {
                phase: MergePhase::Idle,
                current_target: None,
                started: Instant::now(),
            }),
            processed: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Enters a merge phase, resetting the counters.
    pub fn begin_phase(&self, phase: MergePhase) {
        let mut state = self.state.write();
        state.phase = phase;
        state.current_target = None;
        state.started = Instant::now();
        self.processed.store(0, Ordering::Relaxed);
        self.total.store(0, Ordering::Relaxed);
    }

    /// Starts one dimension or fact load within the current phase.
    pub fn begin_target(&self, name: &str, total_rows: u64) {
        let mut state = self.state.write();
        state.current_target = Some(name.to_string());
        state.started = Instant::now();
        self.processed.store(0, Ordering::Relaxed);
        self.total.store(total_rows, Ordering::Relaxed);
    }

    /// Records rows completed by one batch.
    pub fn record_rows(&self, rows: u64) {
        self.processed.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state.read();
        let processed = self.processed.load(Ordering::Relaxed);
        let total = self.total.load(Ordering::Relaxed);
        let elapsed = state.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            processed as f64 / elapsed
        } else {
            0.0
        };
        let eta_seconds = if rate > 0.0 && total > processed {
            Some(((total - processed) as f64 / rate).ceil() as u64)
        } else {
            None
        };
        ProgressSnapshot {
            phase: state.phase,
            current_target: state.current_target.clone(),
            processed,
            total,
            rows_per_second: rate,
            eta_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_rows() {
        let tracker = ProgressTracker::new();
        tracker.begin_phase(MergePhase::Dimensions);
        tracker.begin_target("patient", 100);
        tracker.record_rows(40);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.phase, MergePhase::Dimensions);
        assert_eq!(snapshot.current_target.as_deref(), Some("patient"));
        assert_eq!(snapshot.processed, 40);
        assert_eq!(snapshot.total, 100);
    }

    #[test]
    fn phase_change_resets_counters() {
        let tracker = ProgressTracker::new();
        tracker.begin_target("patient", 100);
        tracker.record_rows(100);
        tracker.begin_phase(MergePhase::Facts);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.processed, 0);
        assert_eq!(snapshot.total, 0);
        assert!(snapshot.current_target.is_none());
    }
}
