// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! In-memory warehouse for integration tests.
//!
//! Implements every repository port over one mutex-guarded state with
//! snapshot-based transactions, so loader and orchestrator behaviour
//! (batching, rollback, idempotency, SCD2 invariants) can be exercised
//! without a database.

// Each integration test binary compiles this module and uses a subset
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use core_merge_domain::entities::{
    DimensionVersion, FactRecord, LoadRun, LoadRunStatus, MergeRun, MergeRunStatus,
};
use core_merge_domain::handlers::{
    DimensionHandler, DimensionHandlerRegistry, FactHandler, FactHandlerRegistry,
};
use core_merge_domain::repositories::{
    DimensionRepository, FactRepository, LoadRunRepository, MergeRunRepository, StagingQuery,
    StagingRepository,
};
use core_merge_domain::services::ValueNormalizer;
use core_merge_domain::value_objects::{
    BusinessKey, FieldValue, Lineage, StagingRow, SurrogateKey,
};
use core_merge_domain::MergeError;

use core_merge::application::services::{DimensionLoader, FactLoader, FkResolver, MergeOrchestrator};
use core_merge::infrastructure::config::MergeConfig;
use core_merge::infrastructure::runtime::CancellationToken;

#[derive(Clone, Default)]
struct Snapshot {
    dimensions: HashMap<String, Vec<DimensionVersion>>,
    facts: HashMap<String, Vec<FactRecord>>,
    next_surrogate: i64,
}

#[derive(Default)]
struct State {
    staging: HashMap<(String, Uuid), Vec<StagingRow>>,
    dimensions: HashMap<String, Vec<DimensionVersion>>,
    facts: HashMap<String, Vec<FactRecord>>,
    merge_runs: Vec<MergeRun>,
    load_runs: HashMap<Uuid, LoadRun>,
    next_surrogate: i64,
    snapshot: Option<Snapshot>,
}

/// Shared in-memory warehouse implementing all repository ports.
#[derive(Clone)]
pub struct MemoryWarehouse {
    inner: Arc<Mutex<State>>,
}

impl Default for MemoryWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(State {
                next_surrogate: 1,
                ..Default::default()
            })),
        }
    }

    pub fn seed_load_run(&self, load_run_id: Uuid) {
        let mut state = self.inner.lock();
        state.load_runs.insert(
            load_run_id,
            LoadRun {
                id: load_run_id,
                status: LoadRunStatus::Completed,
                started_at: Utc::now(),
                completed_at: Some(Utc::now()),
                file_count: 1,
                row_count: 0,
            },
        );
    }

    pub fn seed_staging(&self, source_table: &str, load_run_id: Uuid, rows: Vec<StagingRow>) {
        let mut state = self.inner.lock();
        state
            .staging
            .entry((source_table.to_string(), load_run_id))
            .or_default()
            .extend(rows);
    }

    pub fn dimension_rows(&self, target_table: &str) -> Vec<DimensionVersion> {
        self.inner
            .lock()
            .dimensions
            .get(target_table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn fact_rows(&self, target_table: &str) -> Vec<FactRecord> {
        self.inner
            .lock()
            .facts
            .get(target_table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn merge_runs(&self) -> Vec<MergeRun> {
        self.inner.lock().merge_runs.clone()
    }

    fn begin_tx(&self) -> Result<(), MergeError> {
        let mut state = self.inner.lock();
        if state.snapshot.is_some() {
            return Err(MergeError::internal_error("batch transaction already open"));
        }
        state.snapshot = Some(Snapshot {
            dimensions: state.dimensions.clone(),
            facts: state.facts.clone(),
            next_surrogate: state.next_surrogate,
        });
        Ok(())
    }

    fn commit_tx(&self) -> Result<(), MergeError> {
        let mut state = self.inner.lock();
        if state.snapshot.take().is_none() {
            return Err(MergeError::internal_error("no batch transaction to commit"));
        }
        Ok(())
    }

    fn rollback_tx(&self) -> Result<(), MergeError> {
        let mut state = self.inner.lock();
        if let Some(snapshot) = state.snapshot.take() {
            state.dimensions = snapshot.dimensions;
            state.facts = snapshot.facts;
            state.next_surrogate = snapshot.next_surrogate;
        }
        Ok(())
    }
}

fn order_key(row: &StagingRow, order_by: &[String]) -> Vec<String> {
    let normalizer = ValueNormalizer::new();
    order_by
        .iter()
        .map(|field| normalizer.canonicalize(row.get(field)).to_json().to_string())
        .collect()
}

#[async_trait]
impl StagingRepository for MemoryWarehouse {
    async fn count_rows(&self, source_table: &str, load_run_id: Uuid) -> Result<u64, MergeError> {
        let state = self.inner.lock();
        Ok(state
            .staging
            .get(&(source_table.to_string(), load_run_id))
            .map(|rows| rows.len() as u64)
            .unwrap_or(0))
    }

    async fn fetch_page(&self, query: &StagingQuery) -> Result<Vec<StagingRow>, MergeError> {
        let state = self.inner.lock();
        let mut rows = state
            .staging
            .get(&(query.source_table.clone(), query.load_run_id))
            .cloned()
            .unwrap_or_default();
        rows.sort_by_key(|row| order_key(row, &query.order_by));
        Ok(rows
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }
}

#[async_trait]
impl DimensionRepository for MemoryWarehouse {
    async fn begin(&self) -> Result<(), MergeError> {
        self.begin_tx()
    }

    async fn commit(&self) -> Result<(), MergeError> {
        self.commit_tx()
    }

    async fn rollback(&self) -> Result<(), MergeError> {
        self.rollback_tx()
    }

    async fn find_current(
        &self,
        handler: &DimensionHandler,
        key: &BusinessKey,
    ) -> Result<Option<DimensionVersion>, MergeError> {
        let state = self.inner.lock();
        let matches: Vec<&DimensionVersion> = state
            .dimensions
            .get(handler.target_table)
            .map(|rows| {
                rows.iter()
                    .filter(|v| v.is_current() && v.business_key() == key)
                    .collect()
            })
            .unwrap_or_default();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches[0].clone())),
            n => Err(MergeError::scd2_violation(format!(
                "{} current versions for key {}",
                n, key
            ))),
        }
    }

    async fn insert_version(
        &self,
        handler: &DimensionHandler,
        version: &DimensionVersion,
    ) -> Result<SurrogateKey, MergeError> {
        let mut state = self.inner.lock();
        let surrogate = SurrogateKey::new(state.next_surrogate)?;
        state.next_surrogate += 1;
        let mut stored = version.clone();
        stored.assign_surrogate_key(surrogate);
        state
            .dimensions
            .entry(handler.target_table.to_string())
            .or_default()
            .push(stored);
        Ok(surrogate)
    }

    async fn expire_version(
        &self,
        handler: &DimensionHandler,
        surrogate_key: SurrogateKey,
        effective_to: DateTime<Utc>,
    ) -> Result<(), MergeError> {
        let mut state = self.inner.lock();
        let rows = state
            .dimensions
            .get_mut(handler.target_table)
            .ok_or_else(|| MergeError::database_error("no such dimension table"))?;
        let version = rows
            .iter_mut()
            .find(|v| v.surrogate_key() == Some(surrogate_key))
            .ok_or_else(|| MergeError::database_error("no such version"))?;
        version.expire(effective_to);
        Ok(())
    }

    async fn update_in_place(
        &self,
        handler: &DimensionHandler,
        surrogate_key: SurrogateKey,
        changes: &BTreeMap<String, FieldValue>,
        lineage: &Lineage,
    ) -> Result<(), MergeError> {
        let mut state = self.inner.lock();
        let rows = state
            .dimensions
            .get_mut(handler.target_table)
            .ok_or_else(|| MergeError::database_error("no such dimension table"))?;
        let version = rows
            .iter_mut()
            .find(|v| v.surrogate_key() == Some(surrogate_key))
            .ok_or_else(|| MergeError::database_error("no such version"))?;
        version.apply_in_place(changes, *lineage);
        Ok(())
    }

    async fn current_keys(
        &self,
        handler: &DimensionHandler,
        limit: Option<u64>,
    ) -> Result<Vec<(BusinessKey, SurrogateKey)>, MergeError> {
        let state = self.inner.lock();
        let mut keys: Vec<(BusinessKey, SurrogateKey)> = state
            .dimensions
            .get(handler.target_table)
            .map(|rows| {
                rows.iter()
                    .filter(|v| v.is_current())
                    .filter_map(|v| v.surrogate_key().map(|sk| (v.business_key().clone(), sk)))
                    .collect()
            })
            .unwrap_or_default();
        keys.sort_by_key(|(_, sk)| *sk);
        if let Some(limit) = limit {
            keys.truncate(limit as usize);
        }
        Ok(keys)
    }
}

#[async_trait]
impl FactRepository for MemoryWarehouse {
    async fn begin(&self) -> Result<(), MergeError> {
        self.begin_tx()
    }

    async fn commit(&self) -> Result<(), MergeError> {
        self.commit_tx()
    }

    async fn rollback(&self) -> Result<(), MergeError> {
        self.rollback_tx()
    }

    async fn exists(&self, handler: &FactHandler, key: &BusinessKey) -> Result<bool, MergeError> {
        let state = self.inner.lock();
        Ok(state
            .facts
            .get(handler.target_table)
            .map(|rows| rows.iter().any(|f| f.business_key() == key))
            .unwrap_or(false))
    }

    async fn insert(&self, handler: &FactHandler, fact: &FactRecord) -> Result<(), MergeError> {
        let mut state = self.inner.lock();
        let rows = state.facts.entry(handler.target_table.to_string()).or_default();
        if rows.iter().any(|f| f.business_key() == fact.business_key()) {
            return Err(MergeError::ConstraintViolation(format!(
                "duplicate fact business key {}",
                fact.business_key()
            )));
        }
        rows.push(fact.clone());
        Ok(())
    }

    async fn update(&self, handler: &FactHandler, fact: &FactRecord) -> Result<u64, MergeError> {
        let mut state = self.inner.lock();
        let rows = state.facts.entry(handler.target_table.to_string()).or_default();
        match rows.iter_mut().find(|f| f.business_key() == fact.business_key()) {
            Some(existing) => {
                *existing = fact.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

#[async_trait]
impl MergeRunRepository for MemoryWarehouse {
    async fn insert(&self, run: &MergeRun) -> Result<(), MergeError> {
        self.inner.lock().merge_runs.push(run.clone());
        Ok(())
    }

    async fn finalize(&self, run: &MergeRun) -> Result<(), MergeError> {
        let mut state = self.inner.lock();
        let stored = state
            .merge_runs
            .iter_mut()
            .find(|r| r.id() == run.id())
            .ok_or_else(|| MergeError::database_error("no such merge run"))?;
        if stored.status() != MergeRunStatus::Running {
            return Err(MergeError::database_error("merge run already terminal"));
        }
        *stored = run.clone();
        Ok(())
    }

    async fn find_completed(
        &self,
        load_run_id: Uuid,
        extract_type: &str,
    ) -> Result<Option<MergeRun>, MergeError> {
        let state = self.inner.lock();
        Ok(state
            .merge_runs
            .iter()
            .find(|r| {
                r.load_run_id() == load_run_id
                    && r.extract_type() == extract_type
                    && r.status() == MergeRunStatus::Completed
                    && !r.dry_run()
            })
            .cloned())
    }

    async fn supersede(
        &self,
        merge_run_id: core_merge_domain::value_objects::MergeRunId,
    ) -> Result<(), MergeError> {
        let mut state = self.inner.lock();
        let stored = state
            .merge_runs
            .iter_mut()
            .find(|r| r.id() == merge_run_id && r.status() == MergeRunStatus::Completed)
            .ok_or_else(|| MergeError::database_error("no completed run to supersede"))?;
        *stored = MergeRun::from_store(
            stored.id(),
            stored.load_run_id(),
            stored.extract_type().to_string(),
            MergeRunStatus::Superseded,
            *stored.counters(),
            stored.error().map(|e| e.to_string()),
            stored.started_at(),
            stored.completed_at(),
            stored.result().cloned(),
            stored.dry_run(),
        );
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, MergeError> {
        Ok(true)
    }
}

#[async_trait]
impl LoadRunRepository for MemoryWarehouse {
    async fn find(&self, load_run_id: Uuid) -> Result<Option<LoadRun>, MergeError> {
        Ok(self.inner.lock().load_runs.get(&load_run_id).cloned())
    }
}

/// One wired merge engine over a shared in-memory warehouse.
pub struct TestEngine {
    pub warehouse: MemoryWarehouse,
    pub dimension_loader: Arc<DimensionLoader>,
    pub fact_loader: Arc<FactLoader>,
    pub resolver: Arc<FkResolver>,
    pub orchestrator: MergeOrchestrator,
    pub config: MergeConfig,
    pub cancel: CancellationToken,
}

pub fn build_engine(config: MergeConfig) -> TestEngine {
    let warehouse = MemoryWarehouse::new();
    let staging: Arc<dyn StagingRepository> = Arc::new(warehouse.clone());
    let dimensions: Arc<dyn DimensionRepository> = Arc::new(warehouse.clone());
    let facts: Arc<dyn FactRepository> = Arc::new(warehouse.clone());
    let merge_runs: Arc<dyn MergeRunRepository> = Arc::new(warehouse.clone());
    let load_runs: Arc<dyn LoadRunRepository> = Arc::new(warehouse.clone());

    let dimension_registry = Arc::new(DimensionHandlerRegistry::standard());
    let fact_registry = Arc::new(FactHandlerRegistry::standard());
    let cancel = CancellationToken::new();

    let resolver = Arc::new(FkResolver::new(
        dimension_registry.clone(),
        dimensions.clone(),
        &config.cache,
    ));
    let dimension_loader = Arc::new(DimensionLoader::new(
        staging.clone(),
        dimensions,
        dimension_registry.clone(),
        config.error_handling.clone(),
        None,
        cancel.clone(),
    ));
    let fact_loader = Arc::new(FactLoader::new(
        staging,
        facts,
        resolver.clone(),
        fact_registry.clone(),
        config.error_handling.clone(),
        None,
        cancel.clone(),
    ));
    let orchestrator = MergeOrchestrator::new(
        load_runs,
        merge_runs,
        dimension_loader.clone(),
        fact_loader.clone(),
        resolver.clone(),
        dimension_registry,
        fact_registry,
        config.clone(),
        None,
        None,
    )
    .expect("engine wiring must validate");

    TestEngine {
        warehouse,
        dimension_loader,
        fact_loader,
        resolver,
        orchestrator,
        config,
        cancel,
    }
}

/// Builds a staging row from text fields.
pub fn staging_row(fields: &[(&str, &str)]) -> StagingRow {
    let mut row = StagingRow::new(1, BTreeMap::new());
    for (name, value) in fields {
        row.set(*name, FieldValue::Text((*value).to_string()));
    }
    row
}

/// A complete patient staging row for the S1 scenario family.
pub fn patient_row(patient_id: &str, family_name: &str, email: &str) -> StagingRow {
    staging_row(&[
        ("patient_id", patient_id),
        ("practice_id", "PR1"),
        ("per_org_id", "O1"),
        ("first_name", "John"),
        ("family_name", family_name),
        ("dob", "1990-01-01"),
        ("email", email),
    ])
}

/// A practice staging row matching the patient rows above.
pub fn practice_row(practice_id: &str) -> StagingRow {
    staging_row(&[
        ("practice_id", practice_id),
        ("per_org_id", "O1"),
        ("practice_name", "High Street Medical"),
        ("city", "Wellington"),
    ])
}

/// An appointment staging row referencing the standard patient and
/// practice keys.
pub fn appointment_row(appointment_id: &str, patient_id: &str, provider_id: Option<&str>) -> StagingRow {
    let mut row = staging_row(&[
        ("appointment_id", appointment_id),
        ("practice_id", "PR1"),
        ("per_org_id", "O1"),
        ("patient_id", patient_id),
        ("scheduled_at", "2024-06-01T09:00:00Z"),
        ("appointment_type", "consult"),
        ("appointment_status", "booked"),
    ]);
    if let Some(provider_id) = provider_id {
        row.set("provider_id", FieldValue::Text(provider_id.to_string()));
    }
    row
}

/// A vaccine staging row matching the immunisation rows below.
pub fn vaccine_row(vaccine_id: &str) -> StagingRow {
    staging_row(&[
        ("vaccine_id", vaccine_id),
        ("per_org_id", "O1"),
        ("vaccine_code", "MMR"),
        ("vaccine_name", "Measles Mumps Rubella"),
    ])
}

/// An immunisation staging row referencing the standard patient, practice,
/// and vaccine keys.
pub fn immunisation_row(immunisation_id: &str, patient_id: &str, vaccine_id: &str) -> StagingRow {
    staging_row(&[
        ("immunisation_id", immunisation_id),
        ("practice_id", "PR1"),
        ("per_org_id", "O1"),
        ("patient_id", patient_id),
        ("vaccine_id", vaccine_id),
        ("administered_at", "2024-06-02T10:30:00Z"),
        ("outcome", "completed"),
    ])
}

/// Asserts the single-current and disjoint-range invariants for every
/// business key in one dimension table.
pub fn assert_scd2_invariants(warehouse: &MemoryWarehouse, target_table: &str) {
    let rows = warehouse.dimension_rows(target_table);
    let mut by_key: HashMap<String, Vec<DimensionVersion>> = HashMap::new();
    for version in rows {
        by_key
            .entry(version.business_key().canonical().to_string())
            .or_default()
            .push(version);
    }
    for (key, mut versions) in by_key {
        let current = versions.iter().filter(|v| v.is_current()).count();
        assert_eq!(current, 1, "key {} must have exactly one current version", key);
        versions.sort_by_key(|v| v.effective_from());
        for pair in versions.windows(2) {
            let end = pair[0]
                .effective_to()
                .unwrap_or_else(|| panic!("non-final version of {} must be expired", key));
            assert!(
                end <= pair[1].effective_from(),
                "ranges for {} must be disjoint",
                key
            );
        }
        let last = versions.last().unwrap();
        assert!(last.effective_to().is_none(), "final version of {} must be open", key);
    }
}
