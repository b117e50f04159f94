//! Typed in-memory caching.
//!
//! Entries expire after a fixed time-to-live and the cache holds at most
//! `max_entries` values; inserting into a full cache evicts the oldest entry.

pub mod key;

pub use key::{TimelineKey, KEY_PREFIX};

use dashmap::DashMap;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Cache limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Time-to-live of every entry
    pub ttl: Duration,

    /// Maximum number of entries
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            max_entries: 1024,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Statistics
// ═══════════════════════════════════════════════════════════════════════════════

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
    pub evictions: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Typed Cache
// ═══════════════════════════════════════════════════════════════════════════════

struct CachedValue<V> {
    value: V,
    inserted_at: Instant,
}

/// Concurrent TTL cache keyed by a typed key.
pub struct TypedCache<K, V> {
    entries: DashMap<K, CachedValue<V>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> TypedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Fetch a live entry. Expired entries are removed and count as misses.
    pub fn get(&self, key: &K) -> Option<V> {
        let live = match self.entries.get(key) {
            Some(cached) if cached.inserted_at.elapsed() < self.config.ttl => Some(cached.value.clone()),
            Some(_) => None,
            None => None,
        };

        match live {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                counter!("codetrail_cache_hits_total").increment(1);
                Some(value)
            }
            None => {
                self.entries
                    .remove_if(key, |_, cached| cached.inserted_at.elapsed() >= self.config.ttl);
                self.misses.fetch_add(1, Ordering::Relaxed);
                counter!("codetrail_cache_misses_total").increment(1);
                None
            }
        }
    }

    /// Insert or replace an entry.
    pub fn insert(&self, key: K, value: V) {
        if self.config.max_entries == 0 {
            return;
        }
        if !self.entries.contains_key(&key) {
            self.evict_to_fit();
        }
        self.entries.insert(
            key,
            CachedValue {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Remove an entry. Returns true if one was present.
    pub fn invalidate(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            entries: self.entries.len() as u64,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
        }
    }

    fn evict_to_fit(&self) {
        let ttl = self.config.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, cached| cached.inserted_at.elapsed() < ttl);

        while self.entries.len() >= self.config.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().inserted_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }

        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            debug!("Evicted {} entries from cache", evicted);
        }
    }
}
