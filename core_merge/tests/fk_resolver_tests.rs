// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Foreign-key resolution scenarios: cache warmup, database fallback, TTL
//! expiry, and capacity behaviour.

mod common;

use common::{build_engine, patient_row, practice_row, TestEngine};
use core_merge::application::services::DimensionLoadOptions;
use core_merge::infrastructure::config::MergeConfig;
use core_merge_domain::handlers::DimensionType;
use core_merge_domain::value_objects::{BusinessKey, FieldValue};
use uuid::Uuid;

fn patient_key(patient_id: &str) -> BusinessKey {
    BusinessKey::new(vec![
        ("patient_id".to_string(), FieldValue::Text(patient_id.to_string())),
        ("practice_id".to_string(), FieldValue::Text("PR1".to_string())),
        ("per_org_id".to_string(), FieldValue::Text("O1".to_string())),
    ])
    .unwrap()
}

async fn load_patients(engine: &TestEngine, ids: &[&str]) {
    let opts = DimensionLoadOptions::from_config(
        &engine.config.dimension,
        &engine.config.error_handling,
    );
    let run = Uuid::new_v4();
    let rows = ids.iter().map(|id| patient_row(id, "Doe", "a@x")).collect();
    engine.warehouse.seed_staging("stg.patients", run, rows);
    engine
        .dimension_loader
        .load_dimension(DimensionType::Patient, run, &opts)
        .await
        .unwrap();
}

#[tokio::test]
async fn miss_falls_back_to_the_database_and_caches() {
    let engine = build_engine(MergeConfig::default());
    load_patients(&engine, &["P1"]).await;

    let first = engine
        .resolver
        .resolve(DimensionType::Patient, &patient_key("P1"))
        .await
        .unwrap();
    assert!(first.is_some());
    let stats = engine.resolver.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.size, 1);

    let second = engine
        .resolver
        .resolve(DimensionType::Patient, &patient_key("P1"))
        .await
        .unwrap();
    assert_eq!(second, first);
    assert_eq!(engine.resolver.stats().hits, 1);
}

#[tokio::test]
async fn unknown_key_resolves_to_none() {
    let engine = build_engine(MergeConfig::default());
    let resolved = engine
        .resolver
        .resolve(DimensionType::Patient, &patient_key("P404"))
        .await
        .unwrap();
    assert!(resolved.is_none());
    assert_eq!(engine.resolver.stats().size, 0, "absent keys are not cached");
}

#[tokio::test]
async fn preload_warms_every_current_version() {
    let engine = build_engine(MergeConfig::default());
    let opts = DimensionLoadOptions::from_config(
        &engine.config.dimension,
        &engine.config.error_handling,
    );
    let run = Uuid::new_v4();
    engine
        .warehouse
        .seed_staging("stg.practices", run, vec![practice_row("PR1")]);
    engine
        .dimension_loader
        .load_dimension(DimensionType::Practice, run, &opts)
        .await
        .unwrap();
    load_patients(&engine, &["P1", "P2"]).await;

    let loaded = engine.resolver.preload(None).await.unwrap();
    assert_eq!(loaded, 3);

    // A preloaded key resolves without touching the database counters
    let resolved = engine
        .resolver
        .resolve(DimensionType::Patient, &patient_key("P2"))
        .await
        .unwrap();
    assert!(resolved.is_some());
    assert_eq!(engine.resolver.stats().hits, 1);
    assert_eq!(engine.resolver.stats().misses, 0);
}

#[tokio::test]
async fn preload_stops_at_capacity_and_resolution_still_works() {
    let mut config = MergeConfig::default();
    config.cache.max_cache_size = 1;
    let engine = build_engine(config);
    load_patients(&engine, &["P1", "P2"]).await;

    let loaded = engine.resolver.preload(Some(DimensionType::Patient)).await.unwrap();
    assert_eq!(loaded, 1, "preload honours the capacity bound");
    assert_eq!(engine.resolver.stats().size, 1);

    // Keys the preload could not hold resolve through the database
    let resolved = engine
        .resolver
        .resolve(DimensionType::Patient, &patient_key("P2"))
        .await
        .unwrap();
    assert!(resolved.is_some());
    assert_eq!(engine.resolver.stats().size, 1, "capacity stays respected");
}

#[tokio::test]
async fn expired_entries_are_requeried_not_served() {
    let mut config = MergeConfig::default();
    config.cache.cache_ttl_ms = 0;
    let engine = build_engine(config);
    load_patients(&engine, &["P1"]).await;

    for _ in 0..2 {
        let resolved = engine
            .resolver
            .resolve(DimensionType::Patient, &patient_key("P1"))
            .await
            .unwrap();
        assert!(resolved.is_some());
    }
    let stats = engine.resolver.stats();
    assert_eq!(stats.hits, 0, "a zero TTL never serves a cached entry");
    assert_eq!(stats.misses, 2);
}

#[tokio::test]
async fn refresh_rewarms_after_clear() {
    let engine = build_engine(MergeConfig::default());
    load_patients(&engine, &["P1"]).await;

    engine.resolver.preload(None).await.unwrap();
    assert_eq!(engine.resolver.cache_entries(), 1);

    engine.resolver.clear(None);
    assert_eq!(engine.resolver.cache_entries(), 0);

    let reloaded = engine.resolver.refresh(None).await.unwrap();
    assert_eq!(reloaded, 1);
    assert_eq!(engine.resolver.cache_entries(), 1);
}

#[tokio::test]
async fn disabled_cache_resolves_straight_from_the_database() {
    let mut config = MergeConfig::default();
    config.cache.enable_dimension_cache = false;
    let engine = build_engine(config);
    load_patients(&engine, &["P1"]).await;

    assert_eq!(engine.resolver.preload(None).await.unwrap(), 0);
    let resolved = engine
        .resolver
        .resolve(DimensionType::Patient, &patient_key("P1"))
        .await
        .unwrap();
    assert!(resolved.is_some());
    assert_eq!(engine.resolver.cache_entries(), 0);
}
