use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use hps_core::models::TierStats;

/// Lock-free counters shared by every tier implementation.
#[derive(Debug, Default)]
pub(crate) struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
    resident: AtomicUsize,
}

impl TierCounters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn evict(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_resident(&self, n: usize) {
        self.resident.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn sub_resident(&self, n: usize) {
        self.resident.fetch_sub(n, Ordering::Relaxed);
    }

    pub(crate) fn resident(&self) -> usize {
        self.resident.load(Ordering::Relaxed)
    }

    pub(crate) fn snapshot(&self, name: &str, policy: &str, capacity: usize) -> TierStats {
        TierStats {
            name: name.to_string(),
            policy: policy.to_string(),
            capacity,
            resident: self.resident(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
