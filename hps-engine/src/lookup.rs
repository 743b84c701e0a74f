//! Batched resolution: deduplicate, resolve unique keys in parallel, replay.

use std::collections::HashMap;

use rayon::prelude::*;
use rayon::ThreadPool;

use hps_cache::TieredCache;
use hps_core::constants::MIN_RESOLVE_CHUNK;
use hps_core::models::ResolveStats;
use hps_core::Key;

/// Unique keys in first-occurrence order, and for every input position the
/// index of its key in `unique`.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Deduped {
    pub unique: Vec<Key>,
    pub positions: Vec<usize>,
}

pub(crate) fn dedup(keys: &[Key]) -> Deduped {
    let mut seen: HashMap<Key, usize> = HashMap::with_capacity(keys.len());
    let mut unique = Vec::with_capacity(keys.len());
    let positions = keys
        .iter()
        .map(|&key| {
            *seen.entry(key).or_insert_with(|| {
                unique.push(key);
                unique.len() - 1
            })
        })
        .collect();
    Deduped { unique, positions }
}

/// Keys per resolve task: an even share per worker, never below
/// `MIN_RESOLVE_CHUNK`.
pub(crate) fn chunk_size(unique: usize, workers: usize) -> usize {
    unique.div_ceil(workers.max(1)).max(MIN_RESOLVE_CHUNK)
}

/// Result of one batch resolution.
pub(crate) struct Resolved {
    /// `keys.len() * dim` floats in input order.
    pub data: Vec<f32>,
    pub unique: usize,
    pub stats: ResolveStats,
}

/// Resolve `keys` against `cache` on `pool` and return vectors in input order.
pub(crate) fn resolve_batch(
    pool: &ThreadPool,
    cache: &TieredCache,
    keys: &[Key],
    workers: usize,
) -> Resolved {
    let dim = cache.dimension();
    let deduped = dedup(keys);
    let chunk = chunk_size(deduped.unique.len(), workers);
    let tiers = cache.tiers().len();

    let mut unique_out = vec![0.0f32; deduped.unique.len() * dim];
    let mut data = vec![0.0f32; keys.len() * dim];

    let stats = pool.install(|| {
        let stats = deduped
            .unique
            .par_chunks(chunk)
            .zip(unique_out.par_chunks_mut(chunk * dim))
            .map(|(chunk_keys, out)| cache.resolve(chunk_keys, out))
            .reduce(
                || ResolveStats::with_tiers(tiers),
                |mut acc, part| {
                    acc.merge(&part);
                    acc
                },
            );

        data.par_chunks_mut(dim)
            .zip(deduped.positions.par_iter())
            .for_each(|(row, &slot)| {
                row.copy_from_slice(&unique_out[slot * dim..(slot + 1) * dim]);
            });
        stats
    });

    Resolved {
        data,
        unique: deduped.unique.len(),
        stats,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use hps_cache::CacheOptions;
    use hps_store::SparseTableStore;

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let deduped = dedup(&[5, 3, 5, 9, 3, 5]);
        assert_eq!(deduped.unique, vec![5, 3, 9]);
        assert_eq!(deduped.positions, vec![0, 1, 0, 2, 1, 0]);
    }

    #[test]
    fn dedup_of_empty_batch() {
        assert_eq!(dedup(&[]), Deduped::default());
    }

    #[test]
    fn chunk_size_has_a_floor() {
        assert_eq!(chunk_size(10, 4), MIN_RESOLVE_CHUNK);
        assert_eq!(chunk_size(0, 4), MIN_RESOLVE_CHUNK);
        assert_eq!(chunk_size(MIN_RESOLVE_CHUNK * 8 + 1, 4), MIN_RESOLVE_CHUNK * 2 + 1);
        assert_eq!(chunk_size(4096, 0), 4096);
    }

    #[test]
    fn replays_vectors_into_every_position() {
        let store = SparseTableStore::from_parts(
            "t",
            vec![0, 1, 2],
            vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0],
            2,
        )
        .unwrap();
        let cache =
            TieredCache::new("t", vec![], Arc::new(store), vec![0.0; 2], CacheOptions::default())
                .unwrap();
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();

        let resolved = resolve_batch(&pool, &cache, &[2, 0, 2, 999], 2);
        assert_eq!(
            resolved.data,
            vec![3.0, 3.0, 1.0, 1.0, 3.0, 3.0, 0.0, 0.0]
        );
        assert_eq!(resolved.unique, 3);
        assert_eq!(resolved.stats.store_hits, 2);
        assert_eq!(resolved.stats.defaults, 1);
    }
}
