//! Query result caching keyed by SQL signature
//!
//! Entries expire lazily: a stale entry is ignored on read and overwritten
//! by the next successful compute. Failed computations are never stored.
//!
//! Two concurrent misses on the same signature both run the query; the
//! later insert wins. Results are identical, so only the work is repeated.

use crate::db::Row;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Cache entry with capture time
#[derive(Clone)]
struct CacheEntry {
    rows: Vec<Row>,
    captured_at: Instant,
}

/// In-memory TTL cache for query results
pub struct QueryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    /// Create new cache with the default TTL of 30 seconds
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(30))
    }

    /// Create cache with custom TTL
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get cached rows if present and not expired
    pub fn get(&self, signature: &str) -> Option<Vec<Row>> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(signature)?;

        if entry.captured_at.elapsed() < self.ttl {
            Some(entry.rows.clone())
        } else {
            None
        }
    }

    pub fn insert(&self, signature: String, rows: Vec<Row>) {
        let entry = CacheEntry {
            rows,
            captured_at: Instant::now(),
        };
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(signature, entry);
        }
    }

    /// Return live cached rows, or run `compute` and cache its success
    pub fn get_or_compute<F>(&self, signature: &str, compute: F) -> Result<Vec<Row>>
    where
        F: FnOnce() -> Result<Vec<Row>>,
    {
        if let Some(rows) = self.get(signature) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Query cache hit");
            return Ok(rows);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let rows = compute()?;
        self.insert(signature.to_string(), rows.clone());
        Ok(rows)
    }

    /// Drop expired entries
    pub fn cleanup(&self) {
        if let Ok(mut entries) = self.entries.write() {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.captured_at.elapsed() < ttl);
        }
    }

    /// Clear all entries
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let (total, expired) = match self.entries.read() {
            Ok(entries) => {
                let expired = entries
                    .values()
                    .filter(|e| e.captured_at.elapsed() >= self.ttl)
                    .count();
                (entries.len(), expired)
            }
            Err(_) => (0, 0),
        };

        CacheStats {
            total_entries: total,
            expired_entries: expired,
            active_entries: total - expired,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            ttl_secs: self.ttl.as_secs_f64(),
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub ttl_secs: f64,
}
