//! Cache Store Module
//!
//! Main cache engine: namespaced storage with byte-accounted capacity,
//! least-recently-touched eviction and optional replication.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::cache::eviction;
use crate::cache::stats::CacheCounters;
use crate::cache::{CacheEntry, CacheStats};
use crate::codec;
use crate::error::{CacheError, Result};
use crate::models::ReplicationMessage;
use crate::relay::{NoopRelay, ReplicationRelay};

// == Cache Table ==
/// Namespace -> key -> entry, plus the running byte total.
///
/// `total_used_size` always equals the sum of every entry's `size_bytes`.
#[derive(Debug, Default)]
struct CacheTable {
    namespaces: HashMap<String, HashMap<String, CacheEntry>>,
    total_used_size: u64,
}

impl CacheTable {
    fn get(&self, namespace: &str, key: &str) -> Option<&CacheEntry> {
        self.namespaces.get(namespace)?.get(key)
    }

    fn size_of(&self, namespace: &str, key: &str) -> u64 {
        self.get(namespace, key).map_or(0, |entry| entry.size_bytes)
    }

    fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.namespaces.values().flat_map(|keys| keys.values())
    }

    fn len(&self) -> usize {
        self.namespaces.values().map(HashMap::len).sum()
    }

    fn insert(&mut self, entry: CacheEntry) {
        let size = entry.size_bytes;
        let replaced = self
            .namespaces
            .entry(entry.namespace.clone())
            .or_default()
            .insert(entry.key.clone(), entry);
        if let Some(old) = replaced {
            self.total_used_size -= old.size_bytes;
        }
        self.total_used_size += size;
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Option<CacheEntry> {
        let keys = self.namespaces.get_mut(namespace)?;
        let removed = keys.remove(key)?;
        if keys.is_empty() {
            self.namespaces.remove(namespace);
        }
        self.total_used_size -= removed.size_bytes;
        Some(removed)
    }
}

// == In-Memory Cache ==
/// Size-bounded, namespaced cache whose writes fan out through a relay.
///
/// A `max_cache_size` of 0 disables every size check.
pub struct InMemCache {
    /// Byte budget across all namespaces
    max_cache_size: u64,
    /// Entries and their byte total, one lock for both
    table: RwLock<CacheTable>,
    /// Source of touch sequence numbers
    touch_clock: AtomicU64,
    /// Hit/miss/eviction counters
    counters: CacheCounters,
    /// Outbound replication, a no-op when running standalone
    relay: Arc<dyn ReplicationRelay>,
}

impl InMemCache {
    // == Constructor ==
    /// Creates a standalone cache with no replication.
    ///
    /// # Arguments
    /// * `max_cache_size` - Budget in bytes, 0 for unlimited
    pub fn new(max_cache_size: u64) -> Self {
        Self::build(max_cache_size, Arc::new(NoopRelay))
    }

    /// Creates a cache that replicates through `relay`.
    ///
    /// Registers itself as the relay's listener so writes from other nodes
    /// land here. The listener only holds a weak reference; dropping the
    /// returned `Arc` stops inbound application.
    pub fn with_relay(max_cache_size: u64, relay: Arc<dyn ReplicationRelay>) -> Arc<Self> {
        let cache = Arc::new(Self::build(max_cache_size, relay.clone()));
        let weak = Arc::downgrade(&cache);
        relay.register_listener(Arc::new(move |message: ReplicationMessage| {
            if let Some(cache) = weak.upgrade() {
                cache.apply_replicated(message);
            }
        }));
        cache
    }

    fn build(max_cache_size: u64, relay: Arc<dyn ReplicationRelay>) -> Self {
        Self {
            max_cache_size,
            table: RwLock::new(CacheTable::default()),
            touch_clock: AtomicU64::new(0),
            counters: CacheCounters::new(),
            relay,
        }
    }

    // == Put ==
    /// Stores a value under `namespace`/`key`, replacing any previous one.
    ///
    /// Evicts least-recently-touched entries from any namespace when the
    /// budget would be exceeded. After a successful store the write is handed
    /// to the relay; relay trouble is logged there and never fails the put.
    ///
    /// # Errors
    /// - `NotSerializable` if the value cannot be encoded
    /// - `ExceedsCapacity` if the encoded value alone is over budget
    /// - `EvictionInsufficient` if eviction cannot make room
    pub fn put<T: Serialize + ?Sized>(&self, namespace: &str, key: &str, value: &T) -> Result<()> {
        let bytes = codec::marshal(value)?;
        self.store_bytes(namespace, key, bytes.clone())?;
        self.relay
            .replicate(ReplicationMessage::new(namespace, key, bytes));
        Ok(())
    }

    // == Get ==
    /// Retrieves and decodes the value under `namespace`/`key`.
    ///
    /// Touches the entry. Decoding runs after the lock is released.
    ///
    /// # Errors
    /// - `NotFound` if nothing is stored there
    /// - `NotSerializable` if the stored bytes do not decode into `T`, which
    ///   happens when another node wrote a differently shaped value
    pub fn get<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Result<T> {
        let payload = {
            let table = self.table.read();
            match table.get(namespace, key) {
                Some(entry) => {
                    entry.touch(self.next_seq());
                    entry.payload.clone()
                }
                None => {
                    self.counters.record_miss();
                    return Err(CacheError::not_found(namespace, key));
                }
            }
        };
        self.counters.record_hit();
        codec::unmarshal(&payload)
    }

    // == Apply Raw ==
    /// Stores already-serialized bytes without replicating them.
    ///
    /// Inbound path for writes authored by other nodes.
    pub(crate) fn apply_raw(&self, namespace: &str, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.store_bytes(namespace, key, bytes)
    }

    fn apply_replicated(&self, message: ReplicationMessage) {
        let ReplicationMessage {
            namespace,
            key,
            value_bytes,
        } = message;
        match self.apply_raw(&namespace, &key, value_bytes) {
            Ok(()) => {
                self.counters.record_replicated();
                debug!("Applied replicated write {}/{}", namespace, key);
            }
            Err(err) => warn!(
                "Unable to apply replicated write {}/{}: {}",
                namespace, key, err
            ),
        }
    }

    /// Capacity check, eviction and insert under one write lock.
    fn store_bytes(&self, namespace: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        let size = payload.len() as u64;
        if self.max_cache_size > 0 && size > self.max_cache_size {
            return Err(CacheError::ExceedsCapacity {
                size,
                max: self.max_cache_size,
            });
        }

        let mut table = self.table.write();
        // The entry being replaced gives its bytes back first
        let new_total = table.total_used_size - table.size_of(namespace, key) + size;

        if self.max_cache_size > 0 && new_total > self.max_cache_size {
            let needed = new_total - self.max_cache_size;
            let plan = eviction::plan(
                table
                    .entries()
                    .filter(|entry| !(entry.namespace == namespace && entry.key == key)),
                needed,
            )?;
            for (victim_ns, victim_key) in &plan.victims {
                table.remove(victim_ns, victim_key);
            }
            self.counters.record_evictions(plan.victims.len());
            debug!(
                "Evicted {} entries ({} bytes) to store {}/{}",
                plan.victims.len(),
                plan.freed,
                namespace,
                key
            );
        }

        let seq = self.next_seq();
        table.insert(CacheEntry::new(namespace, key, payload, seq));
        Ok(())
    }

    fn next_seq(&self) -> u64 {
        self.touch_clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    // == Introspection ==
    /// Returns true if an entry exists, without touching it.
    pub fn contains(&self, namespace: &str, key: &str) -> bool {
        self.table.read().get(namespace, key).is_some()
    }

    /// Returns the number of entries across all namespaces.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently accounted to entries.
    pub fn used_size(&self) -> u64 {
        self.table.read().total_used_size
    }

    /// Configured byte budget, 0 = unlimited.
    pub fn max_size(&self) -> u64 {
        self.max_cache_size
    }

    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.counters.snapshot();
        let table = self.table.read();
        stats.total_entries = table.len();
        stats.used_bytes = table.total_used_size;
        stats.max_bytes = self.max_cache_size;
        stats
    }

    #[cfg(test)]
    pub(crate) fn accounted_sum(&self) -> u64 {
        self.table.read().entries().map(|entry| entry.size_bytes).sum()
    }
}

impl std::fmt::Debug for InMemCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemCache")
            .field("max_cache_size", &self.max_cache_size)
            .field("used_size", &self.used_size())
            .field("entries", &self.len())
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde::Deserialize;

    use crate::relay::ObjectListener;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct SimpleStruct {
        n: i32,
        s: String,
    }

    /// Records what the cache asks it to replicate.
    #[derive(Default)]
    struct RecordingRelay {
        sent: Mutex<Vec<ReplicationMessage>>,
        listener: Mutex<Option<ObjectListener>>,
    }

    impl ReplicationRelay for RecordingRelay {
        fn replicate(&self, message: ReplicationMessage) {
            self.sent.lock().push(message);
        }

        fn register_listener(&self, listener: ObjectListener) {
            *self.listener.lock() = Some(listener);
        }
    }

    /// JSON string of exactly `size` bytes
    fn sized_value(size: usize) -> String {
        "x".repeat(size - 2)
    }

    fn fill_two_spaces(cache: &InMemCache) {
        // Each JSON-encoded value below is 10 bytes
        cache.put("space0", "key1", "value0-1").unwrap();
        cache.put("space0", "key2", "value0-2").unwrap();
        cache.put("space0", "key3", "value0-3").unwrap();
        cache.put("space1", "key1", "value1-1").unwrap();
        cache.put("space1", "key2", "value1-2").unwrap();
        cache.put("space1", "key3", "value1-3").unwrap();
    }

    #[test]
    fn test_store_new() {
        let cache = InMemCache::new(100);
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
        assert_eq!(cache.used_size(), 0);
        assert_eq!(cache.max_size(), 100);
    }

    #[test]
    fn test_put_and_get() {
        let cache = InMemCache::new(200);

        cache.put("space1", "key2", "value1-2").unwrap();
        let value: String = cache.get("space1", "key2").unwrap();

        assert_eq!(value, "value1-2");
        assert_eq!(cache.used_size(), 10);
    }

    #[test]
    fn test_put_and_get_struct() {
        let cache = InMemCache::new(200);

        cache
            .put("space2", "key2", &SimpleStruct { n: 2, s: "two".to_string() })
            .unwrap();
        let value: SimpleStruct = cache.get("space2", "key2").unwrap();

        assert_eq!(value.s, "two");
    }

    #[test]
    fn test_get_nonexistent() {
        let cache = InMemCache::new(200);
        cache.put("space1", "key1", "value").unwrap();

        let result: Result<String> = cache.get("space1", "notthere");
        assert!(matches!(result, Err(CacheError::NotFound { .. })));

        let result: Result<String> = cache.get("nospace", "key1");
        assert!(matches!(result, Err(CacheError::NotFound { .. })));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_wrong_shape() {
        let cache = InMemCache::new(200);
        cache.put("space0", "key1", "not a struct").unwrap();

        let result: Result<SimpleStruct> = cache.get("space0", "key1");
        assert!(matches!(result, Err(CacheError::NotSerializable(_))));
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let cache = InMemCache::new(0);
        cache.put("space0", "key1", "zero").unwrap();
        cache.put("space1", "key1", "one").unwrap();

        assert_eq!(cache.get::<String>("space0", "key1").unwrap(), "zero");
        assert_eq!(cache.get::<String>("space1", "key1").unwrap(), "one");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_overwrite_reaccounts_size() {
        let cache = InMemCache::new(200);

        cache.put("space0", "key1", &sized_value(50)).unwrap();
        cache.put("space0", "key1", &sized_value(20)).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.used_size(), 20);
        assert_eq!(cache.accounted_sum(), cache.used_size());
    }

    #[test]
    fn test_overwrite_at_budget_does_not_evict_others() {
        let cache = InMemCache::new(100);
        cache.put("a", "k1", &sized_value(50)).unwrap();
        cache.put("a", "k2", &sized_value(50)).unwrap();

        // Replacing k2 with the same size fits without evicting k1
        cache.put("a", "k2", &sized_value(50)).unwrap();

        assert!(cache.contains("a", "k1"));
        assert_eq!(cache.used_size(), 100);
    }

    #[test]
    fn test_exceeds_capacity_leaves_table_unchanged() {
        let cache = InMemCache::new(200);
        fill_two_spaces(&cache);
        let used = cache.used_size();

        let result = cache.put("space1", "bigKey", &sized_value(300));

        assert!(matches!(
            result,
            Err(CacheError::ExceedsCapacity { size: 300, max: 200 })
        ));
        assert_eq!(cache.used_size(), used);
        assert_eq!(cache.len(), 6);
        assert!(!cache.contains("space1", "bigKey"));
    }

    #[test]
    fn test_unlimited_budget() {
        let cache = InMemCache::new(0);

        cache.put("space0", "big", &sized_value(10_000)).unwrap();
        cache.put("space0", "bigger", &sized_value(20_000)).unwrap();

        assert_eq!(cache.used_size(), 30_000);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_eviction_order() {
        let cache = InMemCache::new(30);
        cache.put("ns", "a", &sized_value(10)).unwrap();
        cache.put("ns", "b", &sized_value(10)).unwrap();
        cache.put("ns", "c", &sized_value(10)).unwrap();

        // Needs 20 bytes: exactly a and b
        cache.put("other", "d", &sized_value(20)).unwrap();

        assert!(matches!(cache.get::<String>("ns", "a"), Err(CacheError::NotFound { .. })));
        assert!(matches!(cache.get::<String>("ns", "b"), Err(CacheError::NotFound { .. })));
        assert!(cache.get::<String>("ns", "c").is_ok());
        assert!(cache.get::<String>("other", "d").is_ok());
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_touch_protects_from_eviction() {
        let cache = InMemCache::new(30);
        cache.put("ns", "a", &sized_value(10)).unwrap();
        cache.put("ns", "b", &sized_value(10)).unwrap();
        cache.put("ns", "c", &sized_value(10)).unwrap();

        // a becomes the newest by touch
        let _: String = cache.get("ns", "a").unwrap();
        cache.put("ns", "d", &sized_value(10)).unwrap();

        assert!(cache.contains("ns", "a"));
        assert!(!cache.contains("ns", "b"));
        assert!(cache.contains("ns", "c"));
    }

    #[test]
    fn test_two_hundred_byte_scenario() {
        let cache = InMemCache::new(200);
        fill_two_spaces(&cache);
        assert_eq!(cache.used_size(), 60);

        // Touch the first entry so it is no longer the oldest
        let _: String = cache.get("space0", "key1").unwrap();

        // Overrun the remaining budget by one byte more than a single entry
        let remaining = (cache.max_size() - cache.used_size()) as usize;
        cache
            .put("space1", "bigKey", &sized_value(remaining + 10 + 1))
            .unwrap();

        assert!(!cache.contains("space0", "key2"));
        assert!(!cache.contains("space0", "key3"));
        let kept: String = cache.get("space0", "key1").unwrap();
        assert_eq!(kept, "value0-1");
        assert!(cache.contains("space1", "key1"));
        assert!(cache.used_size() <= 200);

        let result = cache.put("space1", "bigKey", &sized_value(300));
        assert!(matches!(result, Err(CacheError::ExceedsCapacity { .. })));
        assert!(cache.contains("space1", "bigKey"));
    }

    #[test]
    fn test_one_byte_overrun_evicts_single_oldest() {
        let cache = InMemCache::new(200);
        fill_two_spaces(&cache);
        let _: String = cache.get("space0", "key1").unwrap();

        let remaining = (cache.max_size() - cache.used_size()) as usize;
        cache
            .put("space1", "bigKey", &sized_value(remaining + 1))
            .unwrap();

        assert!(!cache.contains("space0", "key2"));
        assert!(cache.contains("space0", "key3"));
        assert!(cache.contains("space0", "key1"));
        assert_eq!(cache.used_size(), 191);
    }

    #[test]
    fn test_size_invariant_after_evictions() {
        let cache = InMemCache::new(100);
        for i in 0..50 {
            cache
                .put(&format!("ns{}", i % 3), &format!("k{}", i % 7), &sized_value(5 + i))
                .unwrap();
            assert_eq!(cache.accounted_sum(), cache.used_size());
            assert!(cache.used_size() <= 100);
        }
    }

    #[test]
    fn test_put_replicates_on_success() {
        let relay = Arc::new(RecordingRelay::default());
        let cache = InMemCache::with_relay(200, relay.clone());

        cache.put("space0", "key1", "value0-1").unwrap();

        let sent = relay.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].namespace, "space0");
        assert_eq!(sent[0].key, "key1");
        assert_eq!(sent[0].value_bytes, b"\"value0-1\"".to_vec());
    }

    #[test]
    fn test_failed_put_does_not_replicate() {
        let relay = Arc::new(RecordingRelay::default());
        let cache = InMemCache::with_relay(20, relay.clone());

        assert!(cache.put("space0", "key1", &sized_value(30)).is_err());

        assert!(relay.sent.lock().is_empty());
    }

    #[test]
    fn test_replicated_write_is_applied_but_not_reflected() {
        let relay = Arc::new(RecordingRelay::default());
        let cache = InMemCache::with_relay(200, relay.clone());

        let listener = relay.listener.lock().clone().unwrap();
        listener(ReplicationMessage::new("cacheB", "key0", b"\"remote\"".to_vec()));

        let value: String = cache.get("cacheB", "key0").unwrap();
        assert_eq!(value, "remote");
        assert!(relay.sent.lock().is_empty());
        assert_eq!(cache.stats().replicated_in, 1);
    }

    #[test]
    fn test_oversized_replicated_write_is_dropped() {
        let relay = Arc::new(RecordingRelay::default());
        let cache = InMemCache::with_relay(10, relay.clone());

        let listener = relay.listener.lock().clone().unwrap();
        listener(ReplicationMessage::new("ns", "k", vec![b'1'; 11]));

        assert!(cache.is_empty());
        assert_eq!(cache.stats().replicated_in, 0);
    }

    #[test]
    fn test_listener_outliving_cache_is_harmless() {
        let relay = Arc::new(RecordingRelay::default());
        let cache = InMemCache::with_relay(200, relay.clone());
        let listener = relay.listener.lock().clone().unwrap();

        drop(cache);
        listener(ReplicationMessage::new("ns", "k", b"1".to_vec()));
    }

    #[test]
    fn test_stats() {
        let cache = InMemCache::new(100);

        cache.put("ns", "key1", "value1").unwrap();
        let _: String = cache.get("ns", "key1").unwrap(); // hit
        let _ = cache.get::<String>("ns", "nonexistent"); // miss

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.used_bytes, 8);
        assert_eq!(stats.max_bytes, 100);
    }

    #[test]
    fn test_concurrent_puts_and_inbound_applies_keep_accounting() {
        use crate::relay::{BusRelay, InMemoryBus};
        use std::thread;

        let bus = Arc::new(InMemoryBus::new());
        let node = || {
            let relay = BusRelay::new(bus.clone(), "chatty.replicate", "bob").unwrap();
            InMemCache::with_relay(300, Arc::new(relay))
        };
        let nodes = [node(), node()];

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = nodes[t % 2].clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("k{}", (t * 7 + i) % 23);
                        let _ = cache.put(&format!("space{}", t % 3), &key, &sized_value(3 + i % 40));
                        let _ = cache.get::<String>(&format!("space{}", (t + 1) % 3), &key);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for cache in &nodes {
            assert!(cache.used_size() <= 300);
            assert_eq!(cache.accounted_sum(), cache.used_size());
            assert_eq!(cache.stats().total_entries, cache.len());
        }
    }
}
