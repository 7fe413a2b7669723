//! Caller-owned cache of report results.
//!
//! The compiler itself never caches. Dashboards that re-run the same report
//! keep one of these next to their executor and key it with [`cache_key`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::executor::Row;
use crate::reports::ReportConfig;

/// Time source, injectable so expiry can be tested without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic key for a `(table, config)` pair.
pub fn cache_key(table: &str, config: &ReportConfig) -> Result<String> {
    Ok(format!("{table}:{}", serde_json::to_string(config)?))
}

/// Cache entry with timestamp for TTL tracking.
#[derive(Debug, Clone)]
struct CacheEntry {
    rows: Vec<Row>,
    inserted_at: Instant,
}

/// Report result cache with TTL and size limits.
pub struct ReportCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
    max_size: usize,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for ReportCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .field("max_size", &self.max_size)
            .finish()
    }
}

impl Default for ReportCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportCache {
    pub fn new() -> Self {
        Self::with_config(&CacheConfig::default())
    }

    /// Create a cache with configuration.
    pub fn with_config(config: &CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            ttl: Duration::from_secs(config.ttl_secs),
            max_size: config.max_size,
            clock,
        }
    }

    pub fn insert(&mut self, key: String, rows: Vec<Row>) {
        if self.max_size == 0 {
            return;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            self.purge_expired();
            if self.entries.len() >= self.max_size {
                self.evict_oldest();
            }
        }

        self.entries.insert(
            key,
            CacheEntry {
                rows,
                inserted_at: self.clock.now(),
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<&[Row]> {
        let now = self.clock.now();
        self.entries.get(key).and_then(|entry| {
            if now.saturating_duration_since(entry.inserted_at) < self.ttl {
                Some(entry.rows.as_slice())
            } else {
                None
            }
        })
    }

    pub fn invalidate(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired(&mut self) {
        let now = self.clock.now();
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.inserted_at) < ttl);
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest_key) = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.inserted_at)
            .map(|(key, _)| key.clone())
        {
            self.entries.remove(&oldest_key);
        }
    }
}
