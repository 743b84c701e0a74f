//! TieredCache: resolves keys through the tier hierarchy and the store.

use std::sync::Arc;

use tracing::{debug, trace};

use hps_core::config::PromotionMode;
use hps_core::errors::{HpsError, HpsResult};
use hps_core::models::{ResolveStats, TierStats};
use hps_core::traits::CacheTier;
use hps_core::Key;
use hps_store::SparseTableStore;

use crate::refresh::{PromotionBatch, RefreshHandle, SubmitOutcome};

/// Tiers of one table, fastest first.
pub type TierStack = Vec<Box<dyn CacheTier>>;

/// Per-table promotion settings.
#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
    pub promotion: PromotionMode,
    /// Batches whose fastest-tier hit rate reaches this value hand their
    /// promotions to the refresher.
    pub hit_rate_threshold: f64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            promotion: PromotionMode::All,
            hit_rate_threshold: 1.0,
        }
    }
}

/// Cache hierarchy in front of one sparse table.
pub struct TieredCache {
    name: String,
    dim: usize,
    tiers: Arc<TierStack>,
    store: Arc<SparseTableStore>,
    default_vector: Vec<f32>,
    options: CacheOptions,
    refresh: Option<RefreshHandle>,
}

/// Insert resolved vectors into the tiers faster than the one that answered.
/// `entries[i] = (key, answered_at)`, where `answered_at == tiers.len()`
/// means the store. Returns the number of tier inserts.
pub(crate) fn promote(
    tiers: &TierStack,
    mode: PromotionMode,
    dim: usize,
    entries: &[(Key, usize)],
    values: &[f32],
) -> usize {
    let mut inserts = 0;
    for (&(key, answered_at), vector) in entries.iter().zip(values.chunks_exact(dim)) {
        let upto = match mode {
            PromotionMode::All => answered_at.min(tiers.len()),
            PromotionMode::Fastest => usize::from(answered_at > 0).min(tiers.len()),
        };
        for tier in &tiers[..upto] {
            tier.insert(key, vector);
            inserts += 1;
        }
    }
    inserts
}

impl TieredCache {
    /// Assemble a hierarchy. `default_vector` is returned for absent keys
    /// and must match the store's dimension.
    pub fn new(
        name: impl Into<String>,
        tiers: TierStack,
        store: Arc<SparseTableStore>,
        default_vector: Vec<f32>,
        options: CacheOptions,
    ) -> HpsResult<Self> {
        let name = name.into();
        let dim = store.dimension();
        if default_vector.len() != dim {
            return Err(HpsError::ShapeMismatch {
                expected: format!("default vector of {dim} floats for {name}"),
                actual: format!("{} floats", default_vector.len()),
            });
        }
        Ok(Self {
            name,
            dim,
            tiers: Arc::new(tiers),
            store,
            default_vector,
            options,
            refresh: None,
        })
    }

    /// Route qualifying promotions through a background refresher.
    pub fn with_refresh(mut self, handle: RefreshHandle) -> Self {
        self.refresh = Some(handle);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn store(&self) -> &Arc<SparseTableStore> {
        &self.store
    }

    pub fn tiers(&self) -> &[Box<dyn CacheTier>] {
        &self.tiers
    }

    pub fn default_vector(&self) -> &[f32] {
        &self.default_vector
    }

    /// Resolve `keys` into `out` (`keys.len() * dimension()` floats), in
    /// order. Each key is looked up tier by tier, then in the store; absent
    /// keys get the default vector and are never cached.
    pub fn resolve(&self, keys: &[Key], out: &mut [f32]) -> ResolveStats {
        debug_assert_eq!(out.len(), keys.len() * self.dim);
        let dim = self.dim;
        let store_level = self.tiers.len();
        let mut stats = ResolveStats::with_tiers(store_level);
        let mut answered_at = vec![usize::MAX; keys.len()];
        let mut pending: Vec<usize> = (0..keys.len()).collect();

        for (level, tier) in self.tiers.iter().enumerate() {
            if pending.is_empty() {
                break;
            }
            pending.retain(|&i| {
                let row = &mut out[i * dim..(i + 1) * dim];
                if tier.get_into(keys[i], row) {
                    answered_at[i] = level;
                    stats.tier_hits[level] += 1;
                    false
                } else {
                    true
                }
            });
        }

        for &i in &pending {
            let row = &mut out[i * dim..(i + 1) * dim];
            if self.store.read_into(keys[i], row) {
                answered_at[i] = store_level;
                stats.store_hits += 1;
            } else {
                row.copy_from_slice(&self.default_vector);
                stats.defaults += 1;
            }
        }
        if !pending.is_empty() {
            trace!(
                table = %self.name,
                misses = pending.len(),
                defaults = stats.defaults,
                "cache tiers missed, read store"
            );
        }

        let (entries, values): (Vec<(Key, usize)>, Vec<f32>) = {
            let mut entries = Vec::new();
            let mut values = Vec::new();
            for (i, &level) in answered_at.iter().enumerate() {
                if level != usize::MAX && level > 0 {
                    entries.push((keys[i], level));
                    values.extend_from_slice(&out[i * dim..(i + 1) * dim]);
                }
            }
            (entries, values)
        };
        if entries.is_empty() {
            return stats;
        }

        let defer = stats.fastest_tier_hit_rate() >= self.options.hit_rate_threshold;
        match (&self.refresh, defer) {
            (Some(refresh), true) => {
                let count = entries.len();
                let batch = PromotionBatch {
                    tiers: Arc::clone(&self.tiers),
                    mode: self.options.promotion,
                    dim,
                    entries,
                    values,
                };
                match refresh.submit(batch) {
                    SubmitOutcome::Queued => stats.deferred += count,
                    SubmitOutcome::Dropped => {
                        debug!(table = %self.name, count, "refresh queue full, promotions dropped")
                    }
                    SubmitOutcome::Closed(batch) => {
                        stats.promoted += promote(
                            &self.tiers,
                            batch.mode,
                            dim,
                            &batch.entries,
                            &batch.values,
                        );
                    }
                }
            }
            _ => {
                stats.promoted +=
                    promote(&self.tiers, self.options.promotion, dim, &entries, &values);
            }
        }
        stats
    }

    /// Insert the stored vectors of `keys` into every tier. Absent keys are
    /// skipped. Returns the number of keys found.
    pub fn warm_up(&self, keys: &[Key]) -> usize {
        let mut row = vec![0.0f32; self.dim];
        let mut found = 0;
        for &key in keys {
            if self.store.read_into(key, &mut row) {
                for tier in self.tiers.iter() {
                    tier.insert(key, &row);
                }
                found += 1;
            }
        }
        found
    }

    /// Fill tiers with the first rows of the table, up to the largest tier.
    pub fn preload(&self) -> usize {
        let largest = self.tiers.iter().map(|t| t.capacity()).max().unwrap_or(0);
        let keys = self.store.keys();
        let found = self.warm_up(&keys[..largest.min(keys.len())]);
        debug!(table = %self.name, rows = found, "tiers preloaded");
        found
    }

    pub fn tier_stats(&self) -> Vec<TierStats> {
        self.tiers.iter().map(|t| t.stats()).collect()
    }

    /// Drop every resident entry in every tier.
    pub fn clear(&self) {
        for tier in self.tiers.iter() {
            tier.clear();
        }
    }
}
