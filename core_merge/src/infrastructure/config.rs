// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Merge Configuration
//!
//! Typed configuration for the merge engine, loaded from an optional TOML
//! file layered under `CORE_MERGE_*` environment variables. Every setting
//! has a default, so an empty configuration is a valid one.
//!
//! ## Recognised Sections
//!
//! - `dimension`: batch size, SCD2 switch and strategy, timeout
//! - `fact`: batch size, FK validation, missing-dimension default, upsert mode
//! - `cache`: FK cache switch, capacity, TTL, refresh interval
//! - `error_handling`: continue-on-error, error budget, retries
//! - `monitoring`: metrics and progress switches, log level

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use core_merge_domain::services::Scd2Strategy;
use core_merge_domain::MergeError;

/// Upsert mode for fact loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertMode {
    Insert,
    Update,
    Upsert,
}

impl Default for UpsertMode {
    fn default() -> Self {
        UpsertMode::Upsert
    }
}

/// Default policy when a fact references an absent dimension and the
/// relationship itself does not override it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDimensionDefault {
    Error,
    Skip,
    Null,
    Placeholder,
}

impl Default for MissingDimensionDefault {
    fn default() -> Self {
        MissingDimensionDefault::Skip
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionConfig {
    pub batch_size: usize,
    pub enable_scd2: bool,
    pub scd2_strategy: Scd2Strategy,
    pub timeout_ms: u64,
}

impl Default for DimensionConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            enable_scd2: true,
            scd2_strategy: Scd2Strategy::Hash,
            timeout_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FactConfig {
    pub batch_size: usize,
    pub enable_fk_validation: bool,
    pub missing_dimension_strategy: MissingDimensionDefault,
    pub upsert_mode: UpsertMode,
    pub timeout_ms: u64,
}

impl Default for FactConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            enable_fk_validation: true,
            missing_dimension_strategy: MissingDimensionDefault::Skip,
            upsert_mode: UpsertMode::Upsert,
            timeout_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enable_dimension_cache: bool,
    pub max_cache_size: usize,
    pub cache_ttl_ms: u64,
    pub cache_refresh_interval: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_dimension_cache: true,
            max_cache_size: 1_000_000,
            cache_ttl_ms: 300_000,
            cache_refresh_interval: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorHandlingConfig {
    pub continue_on_error: bool,
    pub max_errors: u64,
    pub max_error_rate: f64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for ErrorHandlingConfig {
    fn default() -> Self {
        Self {
            continue_on_error: true,
            max_errors: 1000,
            max_error_rate: 0.05,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enable_metrics: bool,
    pub enable_progress_tracking: bool,
    pub progress_update_interval: u64,
    pub log_level: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            enable_progress_tracking: true,
            progress_update_interval: 5000,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/warehouse".to_string(),
            max_connections: 10,
            acquire_timeout_ms: 30_000,
        }
    }
}

/// Root configuration for the merge engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub dimension: DimensionConfig,
    pub fact: FactConfig,
    pub cache: CacheConfig,
    pub error_handling: ErrorHandlingConfig,
    pub monitoring: MonitoringConfig,
    pub database: DatabaseConfig,
}

impl MergeConfig {
    /// Loads configuration from an optional TOML file plus `CORE_MERGE_*`
    /// environment variables. Environment wins over file, file over
    /// defaults.
    pub fn load(path: Option<&str>) -> Result<Self, MergeError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Toml).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix("CORE_MERGE")
                .separator("__")
                .try_parsing(true),
        );
        let config = builder
            .build()
            .map_err(|e| MergeError::invalid_config(format!("failed to load configuration: {}", e)))?;
        config
            .try_deserialize()
            .map_err(|e| MergeError::invalid_config(format!("invalid configuration: {}", e)))
    }

    /// Sanity checks on ranges the type system cannot express.
    pub fn validate(&self) -> Result<(), MergeError> {
        if self.dimension.batch_size == 0 || self.fact.batch_size == 0 {
            return Err(MergeError::invalid_config("batch sizes must be positive"));
        }
        if !(0.0..=1.0).contains(&self.error_handling.max_error_rate) {
            return Err(MergeError::invalid_config(format!(
                "max_error_rate {} outside [0,1]",
                self.error_handling.max_error_rate
            )));
        }
        if self.cache.max_cache_size == 0 {
            return Err(MergeError::invalid_config("cache capacity must be positive"));
        }
        match self.monitoring.log_level.as_str() {
            "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(MergeError::invalid_config(format!(
                "unknown log level '{}'",
                other
            ))),
        }
    }
}
