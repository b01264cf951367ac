//! Precedent-search result cache.
//!
//! Keys are a BLAKE3 hash of the normalised query text (trimmed, lowercased,
//! whitespace collapsed) plus `k`. Entries expire after the configured TTL;
//! when the cache is full the oldest entry is evicted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use sanzero_core::SimilarityResult;
use sanzero_core::config::CacheConfig;
use tokio::time::Instant;
use tracing::debug;

type Key = [u8; 32];

struct Entry {
    results: Vec<SimilarityResult>,
    created_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct SearchCache {
    entries: DashMap<Key, Entry>,
    max_entries: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl SearchCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// `None` when caching is disabled.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.max_entries, Duration::from_secs(config.ttl_secs)))
    }

    pub fn get(&self, text: &str, k: usize) -> Option<Vec<SimilarityResult>> {
        let key = cache_key(text, k);
        if let Some(entry) = self.entries.get(&key) {
            if entry.created_at.elapsed() < self.ttl {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(k, "search cache hit");
                return Some(entry.results.clone());
            }
            drop(entry);
            self.entries.remove(&key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn insert(&self, text: &str, k: usize, results: Vec<SimilarityResult>) {
        let key = cache_key(text, k);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.evict();
        }
        self.entries.insert(
            key,
            Entry {
                results,
                created_at: Instant::now(),
            },
        );
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Drop expired entries, or the oldest one if none have expired.
    fn evict(&self) {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.created_at.elapsed() < self.ttl);
        let mut removed = before.saturating_sub(self.entries.len());
        if removed == 0 {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.created_at)
                .map(|e| *e.key());
            if let Some(key) = oldest {
                self.entries.remove(&key);
                removed = 1;
            }
        }
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn cache_key(text: &str, k: usize) -> Key {
    let mut hasher = blake3::Hasher::new();
    hasher.update(normalize(text).as_bytes());
    hasher.update(&(k as u64).to_le_bytes());
    *hasher.finalize().as_bytes()
}
