//! TinyLFU tier using moka.
//!
//! Admission is frequency-gated, so a one-off key may be refused when the
//! tier is full. Capacity is counted in vectors.

use std::sync::Arc;

use moka::notification::RemovalCause;
use moka::sync::Cache;

use hps_core::models::TierStats;
use hps_core::traits::CacheTier;
use hps_core::Key;

use super::TierCounters;

/// moka-backed cache tier.
pub struct TinyLfuTier {
    name: String,
    capacity: usize,
    cache: Cache<Key, Arc<[f32]>>,
    counters: Arc<TierCounters>,
}

impl TinyLfuTier {
    /// Create a tier holding at most `capacity` vectors.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let counters = Arc::new(TierCounters::default());
        let listener_counters = Arc::clone(&counters);
        let cache = Cache::builder()
            .max_capacity(capacity as u64)
            .eviction_listener(move |_key, _value, cause: RemovalCause| {
                if cause.was_evicted() {
                    listener_counters.evict();
                }
            })
            .build();

        Self {
            name: name.into(),
            capacity,
            cache,
            counters,
        }
    }

    /// Apply moka's deferred maintenance (admission, eviction, counts).
    pub fn sync(&self) {
        self.cache.run_pending_tasks();
    }
}

impl CacheTier for TinyLfuTier {
    fn name(&self) -> &str {
        &self.name
    }

    fn policy(&self) -> &str {
        "tiny_lfu"
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    /// Eventually consistent: moka applies evictions in batches.
    fn len(&self) -> usize {
        self.cache.entry_count() as usize
    }

    fn get_into(&self, key: Key, out: &mut [f32]) -> bool {
        match self.cache.get(&key) {
            Some(vector) if vector.len() == out.len() => {
                out.copy_from_slice(&vector);
                self.counters.hit();
                true
            }
            _ => {
                self.counters.miss();
                false
            }
        }
    }

    fn insert(&self, key: Key, vector: &[f32]) {
        if self.capacity == 0 {
            return;
        }
        self.cache.insert(key, Arc::from(vector));
        self.counters.insert();
    }

    fn stats(&self) -> TierStats {
        let mut stats = self.counters.snapshot(&self.name, "tiny_lfu", self.capacity);
        stats.resident = self.len();
        stats
    }

    fn clear(&self) {
        self.cache.invalidate_all();
    }
}
