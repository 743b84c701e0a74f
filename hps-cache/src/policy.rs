//! Eviction policies for arena tiers.
//!
//! A policy sees one set-associative bucket at a time, so choosing a victim
//! costs `ways` comparisons and never touches other shards.

use hps_core::config::EvictionPolicyKind;

/// Per-slot metadata kept beside each resident vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotMeta {
    pub occupied: bool,
    /// Shard clock value at the last insert or hit.
    pub last_access: u64,
    /// Hits since insert, aged by the LFU policy.
    pub frequency: u32,
}

/// Chooses which resident slot of a full bucket to overwrite.
pub trait EvictionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Record a fresh insert at shard time `now`.
    fn on_insert(&self, meta: &mut SlotMeta, now: u64);

    /// Record a hit at shard time `now`.
    fn on_hit(&self, meta: &mut SlotMeta, now: u64);

    /// Index within `bucket` of the slot to evict. Every slot is occupied.
    fn victim(&self, bucket: &mut [SlotMeta]) -> usize;
}

/// Approximate LRU: exact within a bucket, oldest access loses.
#[derive(Debug, Default, Clone, Copy)]
pub struct BucketedLru;

impl EvictionPolicy for BucketedLru {
    fn name(&self) -> &'static str {
        "bucketed_lru"
    }

    fn on_insert(&self, meta: &mut SlotMeta, now: u64) {
        meta.last_access = now;
        meta.frequency = 0;
    }

    fn on_hit(&self, meta: &mut SlotMeta, now: u64) {
        meta.last_access = now;
    }

    fn victim(&self, bucket: &mut [SlotMeta]) -> usize {
        bucket
            .iter()
            .enumerate()
            .min_by_key(|(_, m)| m.last_access)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

/// Approximate LFU with aging: least hits loses, ties go to the oldest.
/// Every eviction halves the surviving counters of the bucket so entries
/// that were hot long ago eventually become evictable.
#[derive(Debug, Default, Clone, Copy)]
pub struct BucketedLfu;

impl EvictionPolicy for BucketedLfu {
    fn name(&self) -> &'static str {
        "bucketed_lfu"
    }

    fn on_insert(&self, meta: &mut SlotMeta, now: u64) {
        meta.last_access = now;
        meta.frequency = 1;
    }

    fn on_hit(&self, meta: &mut SlotMeta, now: u64) {
        meta.last_access = now;
        meta.frequency = meta.frequency.saturating_add(1);
    }

    fn victim(&self, bucket: &mut [SlotMeta]) -> usize {
        let victim = bucket
            .iter()
            .enumerate()
            .min_by_key(|(_, m)| (m.frequency, m.last_access))
            .map(|(i, _)| i)
            .unwrap_or(0);
        for meta in bucket.iter_mut() {
            meta.frequency /= 2;
        }
        victim
    }
}

/// Policy object for an arena tier. `None` for kinds not backed by an arena.
pub fn policy_for(kind: EvictionPolicyKind) -> Option<Box<dyn EvictionPolicy>> {
    match kind {
        EvictionPolicyKind::BucketedLru => Some(Box::new(BucketedLru)),
        EvictionPolicyKind::BucketedLfu => Some(Box::new(BucketedLfu)),
        EvictionPolicyKind::TinyLfu => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_bucket(accesses: &[(u64, u32)]) -> Vec<SlotMeta> {
        accesses
            .iter()
            .map(|&(last_access, frequency)| SlotMeta {
                occupied: true,
                last_access,
                frequency,
            })
            .collect()
    }

    #[test]
    fn lru_evicts_oldest() {
        let mut bucket = full_bucket(&[(5, 0), (2, 0), (9, 0)]);
        assert_eq!(BucketedLru.victim(&mut bucket), 1);
    }

    #[test]
    fn lru_hit_refreshes_recency() {
        let mut bucket = full_bucket(&[(5, 0), (2, 0), (9, 0)]);
        BucketedLru.on_hit(&mut bucket[1], 10);
        assert_eq!(BucketedLru.victim(&mut bucket), 0);
    }

    #[test]
    fn lfu_evicts_least_frequent_then_oldest() {
        let mut bucket = full_bucket(&[(1, 8), (7, 2), (3, 2)]);
        assert_eq!(BucketedLfu.victim(&mut bucket), 2);
    }

    #[test]
    fn lfu_ages_counters_on_eviction() {
        let mut bucket = full_bucket(&[(1, 8), (7, 2)]);
        BucketedLfu.victim(&mut bucket);
        assert_eq!(bucket[0].frequency, 4);
        assert_eq!(bucket[1].frequency, 1);
    }

    #[test]
    fn tiny_lfu_has_no_arena_policy() {
        assert!(policy_for(EvictionPolicyKind::TinyLfu).is_none());
        assert_eq!(
            policy_for(EvictionPolicyKind::BucketedLfu).unwrap().name(),
            "bucketed_lfu"
        );
    }
}
