use crate::models::{Key, TierStats};

/// One level of the cache hierarchy.
///
/// Implementations are shared across lookup workers and must never expose a
/// partially written vector: `get_into` copies a complete vector or nothing.
pub trait CacheTier: Send + Sync {
    /// Tier name from configuration.
    fn name(&self) -> &str;

    /// Eviction policy name.
    fn policy(&self) -> &str;

    /// Maximum resident keys.
    fn capacity(&self) -> usize;

    /// Keys currently resident.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the vector for `key` into `out`. Returns false on a miss.
    fn get_into(&self, key: Key, out: &mut [f32]) -> bool;

    /// Insert or overwrite `key`, evicting if the tier is full.
    fn insert(&self, key: Key, vector: &[f32]);

    /// Snapshot of the tier's counters.
    fn stats(&self) -> TierStats;

    /// Drop every resident entry.
    fn clear(&self);
}
