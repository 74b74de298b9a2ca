//! Cache Statistics Module
//!
//! Tracks cache metrics including hits, misses, evictions, and replicated writes.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time snapshot of cache metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of lookups for absent keys
    pub misses: u64,
    /// Number of entries evicted to make room
    pub evictions: u64,
    /// Number of writes applied from other nodes
    pub replicated_in: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
    /// Bytes currently accounted to entries
    pub used_bytes: u64,
    /// Byte budget, 0 = unlimited
    pub max_bytes: u64,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Cache Counters ==
/// Live counters, updated without taking the table lock.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    replicated_in: AtomicU64,
}

impl CacheCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_replicated(&self) {
        self.replicated_in.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies the counters into a snapshot; sizes are filled by the caller.
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            replicated_in: self.replicated_in.load(Ordering::Relaxed),
            ..CacheStats::default()
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_new() {
        let stats = CacheCounters::new().snapshot();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.replicated_in, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let counters = CacheCounters::new();
        counters.record_hit();
        counters.record_miss();
        assert_eq!(counters.snapshot().hit_rate(), 0.5);
    }

    #[test]
    fn test_record_evictions() {
        let counters = CacheCounters::new();
        counters.record_evictions(2);
        counters.record_evictions(1);
        assert_eq!(counters.snapshot().evictions, 3);
    }

    #[test]
    fn test_record_replicated() {
        let counters = CacheCounters::new();
        counters.record_replicated();
        assert_eq!(counters.snapshot().replicated_in, 1);
    }
}
