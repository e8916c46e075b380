use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use log::debug;
use serde::Serialize;
use sha2::{Digest, Sha256};

struct CacheEntry<V> {
    payload: V,
    inserted_at: Instant,
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// In-memory TTL cache shared across request handlers.
///
/// Every lookup and every store is a single critical section under one mutex.
/// Capacity is enforced on insert by evicting the oldest entries first.
pub struct ResponseCache<V> {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return a live entry, if any
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let fresh = entries
            .get(key)
            .map(|e| now.saturating_duration_since(e.inserted_at) < self.ttl);

        match fresh {
            Some(true) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit: {key}");
                entries.get(key).map(|e| e.payload.clone())
            }
            Some(false) => {
                entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Cache entry expired: {key}");
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value, evicting the oldest entries once over capacity
    pub fn insert(&self, key: String, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&self, key: String, value: V, now: Instant) {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(
            key,
            CacheEntry {
                payload: value,
                inserted_at: now,
            },
        );

        while entries.len() > self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    debug!("Cache evicting oldest entry: {k}");
                    entries.remove(&k);
                }
                None => break,
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len();
        CacheStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Deterministic key over the request-defining fields (SHA-256, hex)
pub fn cache_key(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.as_bytes());
        hasher.update([0x1f]);
    }
    hex::encode(hasher.finalize())
}
