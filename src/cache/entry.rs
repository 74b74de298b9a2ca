//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with touch tracking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

// == Cache Entry ==
/// A stored serialized value plus its bookkeeping.
///
/// Touch state lives in atomics so a reader holding the shared table lock
/// can refresh it. Nothing else about an entry changes after creation;
/// replacing a key creates a new entry.
#[derive(Debug)]
pub struct CacheEntry {
    /// Namespace the entry lives in
    pub namespace: String,
    /// Key within the namespace
    pub key: String,
    /// Codec form of the value
    pub payload: Vec<u8>,
    /// Accounted size, the payload length
    pub size_bytes: u64,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Last touch timestamp (Unix milliseconds), informational only
    last_touched_at: AtomicU64,
    /// Cache-wide touch sequence, the eviction order
    touch_seq: AtomicU64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry, touched at creation.
    ///
    /// # Arguments
    /// * `namespace` - Namespace of the entry
    /// * `key` - Key within the namespace
    /// * `payload` - Serialized value
    /// * `seq` - Next value of the owning cache's touch sequence
    pub fn new(namespace: &str, key: &str, payload: Vec<u8>, seq: u64) -> Self {
        let now = current_timestamp_ms();
        Self {
            namespace: namespace.to_string(),
            key: key.to_string(),
            size_bytes: payload.len() as u64,
            payload,
            created_at: now,
            last_touched_at: AtomicU64::new(now),
            touch_seq: AtomicU64::new(seq),
        }
    }

    // == Touch ==
    /// Marks the entry as just used.
    pub fn touch(&self, seq: u64) {
        self.last_touched_at
            .store(current_timestamp_ms(), Ordering::Relaxed);
        self.touch_seq.store(seq, Ordering::Relaxed);
    }

    /// Last touch timestamp in Unix milliseconds.
    pub fn last_touched_at(&self) -> u64 {
        self.last_touched_at.load(Ordering::Relaxed)
    }

    // == Touch Order ==
    /// Sort key for eviction, oldest first.
    ///
    /// The owning cache hands out strictly increasing sequence numbers, so
    /// the order holds even when the wall clock steps backwards.
    pub fn touch_order(&self) -> u64 {
        self.touch_seq.load(Ordering::Relaxed)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_creation() {
        let entry = CacheEntry::new("space0", "key1", b"\"value0-1\"".to_vec(), 1);

        assert_eq!(entry.namespace, "space0");
        assert_eq!(entry.key, "key1");
        assert_eq!(entry.size_bytes, 10);
        assert_eq!(entry.last_touched_at(), entry.created_at);
    }

    #[test]
    fn test_touch_advances_order() {
        let entry = CacheEntry::new("ns", "k", vec![1], 1);
        let before = entry.touch_order();

        entry.touch(5);

        assert!(entry.touch_order() > before);
        assert_eq!(entry.touch_order(), 5);
    }

    #[test]
    fn test_same_millisecond_ordered_by_seq() {
        let a = CacheEntry::new("ns", "a", vec![1], 1);
        let b = CacheEntry::new("ns", "b", vec![1], 2);
        // Pin both to the same timestamp
        a.last_touched_at.store(1_000, Ordering::Relaxed);
        b.last_touched_at.store(1_000, Ordering::Relaxed);

        assert!(a.touch_order() < b.touch_order());
    }

    #[test]
    fn test_clock_step_back_keeps_touch_order() {
        let earlier = CacheEntry::new("ns", "a", vec![1], 1);
        let later = CacheEntry::new("ns", "b", vec![1], 2);
        // Wall clock went back 100ms between the two touches
        earlier.last_touched_at.store(1_000, Ordering::Relaxed);
        later.last_touched_at.store(900, Ordering::Relaxed);

        assert!(earlier.touch_order() < later.touch_order());
    }

    #[test]
    fn test_touch_does_not_change_created_at() {
        let entry = CacheEntry::new("ns", "k", vec![1], 1);
        let created = entry.created_at;

        entry.touch(2);

        assert_eq!(entry.created_at, created);
    }
}
