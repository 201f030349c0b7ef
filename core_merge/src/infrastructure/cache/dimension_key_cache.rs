// /////////////////////////////////////////////////////////////////////////////
// Core Merge RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Dimension Key Cache
//!
//! Bounded, TTL-checked map from `(dimension, canonical business key)` to
//! the current surrogate key. The FK resolver owns the only mutable handle;
//! fact loaders read through the resolver. Readers may run concurrently
//! with one writer; writers serialise on the internal locks so the entry
//! invariant holds.
//!
//! ## Contract
//!
//! - an entry is valid iff `now - cached_at < ttl`; expired entries are
//!   removed and re-queried, never silently served
//! - capacity is a hard bound; inserting at capacity evicts the
//!   oldest-inserted entry first
//! - hit/miss/eviction/expiry counters feed the `stats()` surface

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;

use core_merge_domain::handlers::DimensionType;
use core_merge_domain::value_objects::SurrogateKey;

type EntryKey = (DimensionType, String);

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    surrogate_key: SurrogateKey,
    cached_at: Instant,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

/// Bounded insertion-order cache of current surrogate keys.
pub struct DimensionKeyCache {
    entries: RwLock<HashMap<EntryKey, CacheEntry>>,
    /// Insertion order for eviction; stale keys are skipped on pop.
    order: RwLock<VecDeque<EntryKey>>,
    capacity: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl DimensionKeyCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            order: RwLock::new(VecDeque::new()),
            capacity,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Looks an entry up, expiring it when the TTL has lapsed.
    pub fn get(&self, dimension: DimensionType, canonical_key: &str) -> Option<SurrogateKey> {
        let key = (dimension, canonical_key.to_string());
        {
            let entries = self.entries.read();
            match entries.get(&key) {
                Some(entry) if entry.cached_at.elapsed() < self.ttl => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.surrogate_key);
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }
        // Expired: drop the entry under the write lock, re-check freshness
        // in case a writer refreshed it in between.
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(&key) {
            if entry.cached_at.elapsed() < self.ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.surrogate_key);
            }
            entries.remove(&key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Inserts or refreshes an entry, evicting the oldest-inserted entry
    /// when at capacity.
    pub fn insert(&self, dimension: DimensionType, canonical_key: &str, surrogate_key: SurrogateKey) {
        let key = (dimension, canonical_key.to_string());
        let mut entries = self.entries.write();
        let mut order = self.order.write();

        if !entries.contains_key(&key) {
            while entries.len() >= self.capacity {
                // Skip order entries already removed by expiry
                match order.pop_front() {
                    Some(oldest) => {
                        if entries.remove(&oldest).is_some() {
                            self.evictions.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    None => break,
                }
            }
            order.push_back(key.clone());
        }
        entries.insert(
            key,
            CacheEntry {
                surrogate_key,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drops entries for one dimension, or everything.
    pub fn clear(&self, dimension: Option<DimensionType>) {
        let mut entries = self.entries.write();
        let mut order = self.order.write();
        match dimension {
            Some(dim) => {
                entries.retain(|(d, _), _| *d != dim);
                order.retain(|(d, _)| *d != dim);
            }
            None => {
                entries.clear();
                order.clear();
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sk(v: i64) -> SurrogateKey {
        SurrogateKey::new(v).unwrap()
    }

    #[test]
    fn get_after_insert_hits() {
        let cache = DimensionKeyCache::new(10, Duration::from_secs(60));
        cache.insert(DimensionType::Patient, "k1", sk(1));
        assert_eq!(cache.get(DimensionType::Patient, "k1"), Some(sk(1)));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn dimensions_do_not_collide() {
        let cache = DimensionKeyCache::new(10, Duration::from_secs(60));
        cache.insert(DimensionType::Patient, "k1", sk(1));
        assert_eq!(cache.get(DimensionType::Provider, "k1"), None);
    }

    #[test]
    fn capacity_evicts_oldest_inserted_first() {
        let cache = DimensionKeyCache::new(2, Duration::from_secs(60));
        cache.insert(DimensionType::Patient, "k1", sk(1));
        cache.insert(DimensionType::Patient, "k2", sk(2));
        cache.insert(DimensionType::Patient, "k3", sk(3));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(DimensionType::Patient, "k1"), None);
        assert_eq!(cache.get(DimensionType::Patient, "k2"), Some(sk(2)));
        assert_eq!(cache.get(DimensionType::Patient, "k3"), Some(sk(3)));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn refresh_does_not_grow_the_cache() {
        let cache = DimensionKeyCache::new(2, Duration::from_secs(60));
        cache.insert(DimensionType::Patient, "k1", sk(1));
        cache.insert(DimensionType::Patient, "k1", sk(9));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(DimensionType::Patient, "k1"), Some(sk(9)));
    }

    #[test]
    fn expired_entries_are_removed_not_served() {
        let cache = DimensionKeyCache::new(10, Duration::from_millis(0));
        cache.insert(DimensionType::Patient, "k1", sk(1));
        assert_eq!(cache.get(DimensionType::Patient, "k1"), None);
        assert_eq!(cache.stats().expirations, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_by_dimension_leaves_others() {
        let cache = DimensionKeyCache::new(10, Duration::from_secs(60));
        cache.insert(DimensionType::Patient, "k1", sk(1));
        cache.insert(DimensionType::Provider, "k2", sk(2));
        cache.clear(Some(DimensionType::Patient));
        assert_eq!(cache.get(DimensionType::Patient, "k1"), None);
        assert_eq!(cache.get(DimensionType::Provider, "k2"), Some(sk(2)));
    }
}
