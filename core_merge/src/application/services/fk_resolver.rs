// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Foreign-Key Resolver
//!
//! Maps dimension business keys to their current surrogate keys for fact
//! loading. Lookups go through the bounded TTL cache first and fall back to
//! a point query keyed on `is_current`; found keys are cached for the rest
//! of the merge. The resolver exclusively owns the cache; fact loaders only
//! hold a resolver reference and never mutate entries.
//!
//! ## Preload
//!
//! Between the dimension and fact phases the orchestrator warms the cache
//! with every current dimension row. Preload stops early when the cache
//! reaches capacity; that is a warning, not an error, because `resolve`
//! still works through the database fallback.

use std::sync::Arc;

use tracing::{debug, warn};

use core_merge_domain::handlers::{DimensionHandlerRegistry, DimensionType};
use core_merge_domain::repositories::DimensionRepository;
use core_merge_domain::value_objects::{BusinessKey, SurrogateKey};
use core_merge_domain::MergeError;

use crate::infrastructure::cache::{CacheStats, DimensionKeyCache};
use crate::infrastructure::config::CacheConfig;

/// Cache-backed business-key to surrogate-key resolution.
pub struct FkResolver {
    registry: Arc<DimensionHandlerRegistry>,
    dimensions: Arc<dyn DimensionRepository>,
    /// Absent when the dimension cache is disabled by configuration.
    cache: Option<DimensionKeyCache>,
}

impl FkResolver {
    pub fn new(
        registry: Arc<DimensionHandlerRegistry>,
        dimensions: Arc<dyn DimensionRepository>,
        config: &CacheConfig,
    ) -> Self {
        let cache = config.enable_dimension_cache.then(|| {
            DimensionKeyCache::new(
                config.max_cache_size,
                std::time::Duration::from_millis(config.cache_ttl_ms),
            )
        });
        Self {
            registry,
            dimensions,
            cache,
        }
    }

    /// Resolves one business key to the current surrogate key, if the
    /// dimension row exists.
    pub async fn resolve(
        &self,
        dimension: DimensionType,
        key: &BusinessKey,
    ) -> Result<Option<SurrogateKey>, MergeError> {
        if let Some(cache) = &self.cache {
            if let Some(found) = cache.get(dimension, key.canonical()) {
                return Ok(Some(found));
            }
        }

        let handler = self.registry.handler(dimension)?;
        let current = self.dimensions.find_current(handler, key).await?;
        let surrogate = current.and_then(|v| v.surrogate_key());
        if let (Some(cache), Some(surrogate)) = (&self.cache, surrogate) {
            cache.insert(dimension, key.canonical(), surrogate);
        }
        Ok(surrogate)
    }

    /// Warms the cache with all current rows of one dimension, or of every
    /// registered dimension. Returns the number of entries loaded.
    pub async fn preload(&self, dimension: Option<DimensionType>) -> Result<u64, MergeError> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };

        let targets: Vec<DimensionType> = match dimension {
            Some(dim) => vec![dim],
            None => DimensionType::all().to_vec(),
        };

        let mut loaded = 0u64;
        for dim in targets {
            let remaining = cache.capacity().saturating_sub(cache.len());
            if remaining == 0 {
                warn!(dimension = %dim, "FK cache at capacity, preload stopped early");
                break;
            }
            let handler = self.registry.handler(dim)?;
            let keys = self
                .dimensions
                .current_keys(handler, Some(remaining as u64))
                .await?;
            let fetched = keys.len();
            for (key, surrogate) in keys {
                cache.insert(dim, key.canonical(), surrogate);
                loaded += 1;
            }
            if fetched == remaining && cache.is_full() {
                warn!(dimension = %dim, "FK cache filled during preload, remaining rows resolve via database");
            }
            debug!(dimension = %dim, loaded = fetched, "preloaded dimension keys");
        }
        Ok(loaded)
    }

    /// Clears and re-warms the cache.
    pub async fn refresh(&self, dimension: Option<DimensionType>) -> Result<u64, MergeError> {
        self.clear(dimension);
        self.preload(dimension).await
    }

    /// Drops cached entries for one dimension, or all of them.
    pub fn clear(&self, dimension: Option<DimensionType>) {
        if let Some(cache) = &self.cache {
            cache.clear(dimension);
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache
            .as_ref()
            .map(|c| c.stats())
            .unwrap_or_default()
    }

    pub fn cache_entries(&self) -> usize {
        self.cache.as_ref().map(|c| c.len()).unwrap_or(0)
    }
}
