//! Lookup counters shared by every caller of an engine.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use hps_core::models::ResolveStats;

/// Running totals since initialization.
#[derive(Debug, Default)]
pub struct LookupMetrics {
    lookups: AtomicU64,
    rejected: AtomicU64,
    keys: AtomicU64,
    unique_keys: AtomicU64,
    fastest_tier_hits: AtomicU64,
    store_hits: AtomicU64,
    defaults: AtomicU64,
    promoted: AtomicU64,
    deferred: AtomicU64,
}

/// Plain copy of [`LookupMetrics`] for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LookupCounters {
    pub lookups: u64,
    /// Calls that failed validation.
    pub rejected: u64,
    pub keys: u64,
    pub unique_keys: u64,
    pub fastest_tier_hits: u64,
    pub store_hits: u64,
    /// Keys absent from their table.
    pub defaults: u64,
    pub promoted: u64,
    pub deferred: u64,
}

impl LookupMetrics {
    pub fn record(&self, keys: usize, unique: usize, stats: &ResolveStats) {
        let add = |counter: &AtomicU64, n: usize| {
            counter.fetch_add(n as u64, Ordering::Relaxed);
        };
        add(&self.lookups, 1);
        add(&self.keys, keys);
        add(&self.unique_keys, unique);
        add(
            &self.fastest_tier_hits,
            stats.tier_hits.first().copied().unwrap_or(0),
        );
        add(&self.store_hits, stats.store_hits);
        add(&self.defaults, stats.defaults);
        add(&self.promoted, stats.promoted);
        add(&self.deferred, stats.deferred);
    }

    pub fn reject(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LookupCounters {
        let get = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        LookupCounters {
            lookups: get(&self.lookups),
            rejected: get(&self.rejected),
            keys: get(&self.keys),
            unique_keys: get(&self.unique_keys),
            fastest_tier_hits: get(&self.fastest_tier_hits),
            store_hits: get(&self.store_hits),
            defaults: get(&self.defaults),
            promoted: get(&self.promoted),
            deferred: get(&self.deferred),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accumulates() {
        let metrics = LookupMetrics::default();
        let stats = ResolveStats {
            tier_hits: vec![3, 1],
            store_hits: 2,
            defaults: 1,
            promoted: 2,
            deferred: 0,
        };
        metrics.record(10, 7, &stats);
        metrics.record(10, 7, &stats);
        metrics.reject();

        let snap = metrics.snapshot();
        assert_eq!(snap.lookups, 2);
        assert_eq!(snap.keys, 20);
        assert_eq!(snap.unique_keys, 14);
        assert_eq!(snap.fastest_tier_hits, 6);
        assert_eq!(snap.defaults, 2);
        assert_eq!(snap.rejected, 1);
    }
}
