//! Arena tier: fixed-capacity slots indexed by hashed key.
//!
//! The arena is split into shards, one mutex each. A shard is an array of
//! set-associative buckets of `ways` slots; a key can only live in the
//! bucket its hash selects, so lookups scan at most `ways` slots and
//! eviction is decided inside one bucket by the tier's policy object.
//! Vectors live contiguously in one `Vec<f32>` per shard.

use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use hps_core::constants::FLOAT_BYTES;
use hps_core::errors::{HpsError, HpsResult};
use hps_core::models::TierStats;
use hps_core::traits::CacheTier;
use hps_core::Key;

use super::TierCounters;
use crate::hash::mix64;
use crate::policy::{EvictionPolicy, SlotMeta};

struct Shard {
    keys: Vec<Key>,
    meta: Vec<SlotMeta>,
    values: Vec<f32>,
    clock: u64,
}

impl Shard {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// Sharded, set-associative cache tier.
pub struct ArenaTier {
    name: String,
    policy: Box<dyn EvictionPolicy>,
    dim: usize,
    ways: usize,
    buckets_per_shard: usize,
    shards: Vec<Mutex<Shard>>,
    counters: TierCounters,
}

/// Slot layout derived from a requested capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ArenaLayout {
    pub shards: usize,
    pub buckets_per_shard: usize,
    pub ways: usize,
}

impl ArenaLayout {
    /// Largest layout with at most `capacity` slots. Zero capacity yields
    /// an empty layout.
    pub(crate) fn fit(capacity: usize, shards: usize, ways: usize) -> Self {
        if capacity == 0 {
            return Self {
                shards: 0,
                buckets_per_shard: 0,
                ways: 0,
            };
        }
        let ways = ways.clamp(1, capacity);
        let buckets = capacity / ways;
        let shards = shards.clamp(1, buckets);
        Self {
            shards,
            buckets_per_shard: buckets / shards,
            ways,
        }
    }

    pub(crate) fn slots_per_shard(&self) -> usize {
        self.buckets_per_shard * self.ways
    }

    pub(crate) fn capacity(&self) -> usize {
        self.shards * self.slots_per_shard()
    }
}

impl ArenaTier {
    /// Allocate a tier holding at most `capacity` vectors of `dim` floats.
    ///
    /// `table` names the owning table in allocation errors.
    pub fn new(
        table: &str,
        name: impl Into<String>,
        capacity: usize,
        dim: usize,
        shards: usize,
        ways: usize,
        policy: Box<dyn EvictionPolicy>,
    ) -> HpsResult<Self> {
        let name = name.into();
        let layout = ArenaLayout::fit(capacity, shards, ways);
        let slots = layout.slots_per_shard();

        let exhausted = |requested_bytes: u64| HpsError::CapacityExhausted {
            table: table.to_string(),
            tier: name.clone(),
            requested_bytes,
        };
        let floats = slots
            .checked_mul(dim)
            .ok_or_else(|| exhausted(u64::MAX))?;

        let mut arena = Vec::with_capacity(layout.shards);
        for _ in 0..layout.shards {
            let mut values: Vec<f32> = Vec::new();
            values
                .try_reserve_exact(floats)
                .map_err(|_| exhausted((floats as u64).saturating_mul(FLOAT_BYTES as u64)))?;
            values.resize(floats, 0.0);
            let mut keys: Vec<Key> = Vec::new();
            keys.try_reserve_exact(slots)
                .map_err(|_| exhausted((slots as u64).saturating_mul(std::mem::size_of::<Key>() as u64)))?;
            keys.resize(slots, 0);
            let mut meta: Vec<SlotMeta> = Vec::new();
            meta.try_reserve_exact(slots).map_err(|_| {
                exhausted((slots as u64).saturating_mul(std::mem::size_of::<SlotMeta>() as u64))
            })?;
            meta.resize(slots, SlotMeta::default());
            arena.push(Mutex::new(Shard {
                keys,
                meta,
                values,
                clock: 0,
            }));
        }

        debug!(
            table,
            tier = %name,
            requested = capacity,
            capacity = layout.capacity(),
            shards = layout.shards,
            ways = layout.ways,
            policy = policy.name(),
            "arena tier allocated"
        );

        Ok(Self {
            name,
            policy,
            dim,
            ways: layout.ways,
            buckets_per_shard: layout.buckets_per_shard,
            shards: arena,
            counters: TierCounters::default(),
        })
    }

    /// Shard index and first slot of the bucket owning `key`.
    fn locate(&self, key: Key) -> (usize, usize) {
        let h = mix64(key);
        let shard = ((h >> 32) % self.shards.len() as u64) as usize;
        let bucket = ((h & 0xFFFF_FFFF) % self.buckets_per_shard as u64) as usize;
        (shard, bucket * self.ways)
    }

    fn lock(&self, shard: usize) -> MutexGuard<'_, Shard> {
        // Shard state is plain data updated after all bounds checks, so a
        // panicking holder cannot leave a half-written vector behind.
        self.shards[shard]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn find(&self, shard: &Shard, base: usize, key: Key) -> Option<usize> {
        (base..base + self.ways).find(|&s| shard.meta[s].occupied && shard.keys[s] == key)
    }
}

impl CacheTier for ArenaTier {
    fn name(&self) -> &str {
        &self.name
    }

    fn policy(&self) -> &str {
        self.policy.name()
    }

    fn capacity(&self) -> usize {
        self.shards.len() * self.buckets_per_shard * self.ways
    }

    fn len(&self) -> usize {
        self.counters.resident()
    }

    fn get_into(&self, key: Key, out: &mut [f32]) -> bool {
        if self.shards.is_empty() {
            self.counters.miss();
            return false;
        }
        let (shard_idx, base) = self.locate(key);
        let mut shard = self.lock(shard_idx);
        match self.find(&shard, base, key) {
            Some(slot) => {
                out.copy_from_slice(&shard.values[slot * self.dim..(slot + 1) * self.dim]);
                let now = shard.tick();
                self.policy.on_hit(&mut shard.meta[slot], now);
                self.counters.hit();
                true
            }
            None => {
                self.counters.miss();
                false
            }
        }
    }

    fn insert(&self, key: Key, vector: &[f32]) {
        debug_assert_eq!(vector.len(), self.dim);
        if self.shards.is_empty() || vector.len() != self.dim {
            return;
        }
        let (shard_idx, base) = self.locate(key);
        let mut shard = self.lock(shard_idx);
        let now = shard.tick();

        let slot = match self.find(&shard, base, key) {
            // Tables are immutable, so this rewrites identical values.
            Some(slot) => {
                self.policy.on_hit(&mut shard.meta[slot], now);
                slot
            }
            None => {
                let free = (base..base + self.ways).find(|&s| !shard.meta[s].occupied);
                let slot = match free {
                    Some(slot) => {
                        self.counters.add_resident(1);
                        slot
                    }
                    None => {
                        let victim = self.policy.victim(&mut shard.meta[base..base + self.ways]);
                        self.counters.evict();
                        base + victim
                    }
                };
                shard.keys[slot] = key;
                shard.meta[slot].occupied = true;
                self.policy.on_insert(&mut shard.meta[slot], now);
                slot
            }
        };
        shard.values[slot * self.dim..(slot + 1) * self.dim].copy_from_slice(vector);
        self.counters.insert();
    }

    fn stats(&self) -> TierStats {
        self.counters
            .snapshot(&self.name, self.policy.name(), self.capacity())
    }

    fn clear(&self) {
        for idx in 0..self.shards.len() {
            let mut shard = self.lock(idx);
            let mut removed = 0;
            for meta in shard.meta.iter_mut() {
                if meta.occupied {
                    removed += 1;
                }
                *meta = SlotMeta::default();
            }
            self.counters.sub_resident(removed);
        }
    }
}
