//! Engine: every served table, the lookup pool and the refresher, built
//! once at initialization and immutable afterwards.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use rayon::ThreadPool;
use tracing::{debug, info, warn};

use hps_cache::{build_tiers, estimate_tier_bytes, CacheOptions, Refresher, TieredCache};
use hps_core::config::{HpsConfig, ModelConfig, TableConfig};
use hps_core::constants::MIN_RESOLVE_CHUNK;
use hps_core::errors::{HpsError, HpsResult};
use hps_core::{Key, KeyBatch, VectorBatch, VectorDtype};
use hps_store::SparseTableStore;

use crate::lookup::resolve_batch;
use crate::metrics::{LookupCounters, LookupMetrics};
use crate::status::TableStatus;

/// One table ready to serve.
pub(crate) struct ServedTable {
    pub table_id: u32,
    pub name: String,
    pub slot_num: usize,
    pub max_batch_size: Option<usize>,
    pub cache: TieredCache,
}

impl ServedTable {
    fn status(&self, model: &str) -> TableStatus {
        let store = self.cache.store();
        TableStatus {
            model: model.to_string(),
            table_id: self.table_id,
            name: self.name.clone(),
            rows: store.row_count(),
            dim: store.dimension(),
            slot_num: self.slot_num,
            storage: store.storage_kind(),
            tiers: self.cache.tier_stats(),
        }
    }
}

pub(crate) struct Engine {
    models: BTreeMap<String, BTreeMap<u32, ServedTable>>,
    pool: ThreadPool,
    workers: usize,
    refresher: Mutex<Refresher>,
    metrics: LookupMetrics,
}

impl Engine {
    /// Load every table, size and allocate its tiers, and start the pools.
    pub fn build(config: &HpsConfig) -> HpsResult<Self> {
        config.validate()?;
        let ps = config.load_ps_config()?;

        // Open every store before allocating any tier, so the cache budget
        // is checked against real row counts.
        let mut opened: Vec<(&ModelConfig, &TableConfig, SparseTableStore)> = Vec::new();
        let mut cache_bytes = 0u64;
        for (model, table) in ps.tables() {
            let store = SparseTableStore::open(&model.model, table)?;
            cache_bytes = cache_bytes.saturating_add(estimate_tier_bytes(table, store.row_count()));
            if let Some(budget) = config.max_cache_bytes {
                if cache_bytes > budget {
                    let table_name = table.describe(&model.model);
                    warn!(
                        table = %table_name,
                        requested = cache_bytes,
                        budget,
                        "cache tiers exceed max_cache_bytes"
                    );
                    return Err(HpsError::CapacityExhausted {
                        table: table_name,
                        tier: table
                            .tiers
                            .iter()
                            .map(|t| t.name.as_str())
                            .collect::<Vec<_>>()
                            .join(","),
                        requested_bytes: cache_bytes,
                    });
                }
            }
            opened.push((model, table, store));
        }

        let workers = config.resolved_worker_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("hps-lookup-{i}"))
            .build()
            .map_err(|e| HpsError::RuntimeError {
                reason: format!("cannot build lookup pool: {e}"),
            })?;
        let refresher = Refresher::spawn(config.refresh_queue_depth)?;

        let mut models: BTreeMap<String, BTreeMap<u32, ServedTable>> = BTreeMap::new();
        for (model, table, store) in opened {
            let name = table.describe(&model.model);
            let tiers = build_tiers(&name, table, store.row_count(), store.dimension())?;
            let options = CacheOptions {
                promotion: table.promotion,
                hit_rate_threshold: table.hit_rate_threshold,
            };
            let cache = TieredCache::new(
                name.clone(),
                tiers,
                Arc::new(store),
                table.default_vector(),
                options,
            )?
            .with_refresh(refresher.handle());
            if table.preload {
                cache.preload();
            }
            models.entry(model.model.clone()).or_default().insert(
                table.table_id,
                ServedTable {
                    table_id: table.table_id,
                    name,
                    slot_num: table.slot_num,
                    max_batch_size: model.max_batch_size,
                    cache,
                },
            );
        }

        info!(
            models = models.len(),
            tables = models.values().map(BTreeMap::len).sum::<usize>(),
            workers,
            cache_bytes,
            "engine built"
        );
        Ok(Self {
            models,
            pool,
            workers,
            refresher: Mutex::new(refresher),
            metrics: LookupMetrics::default(),
        })
    }

    pub fn table(&self, model: &str, table_id: u32) -> HpsResult<&ServedTable> {
        self.models
            .get(model)
            .and_then(|tables| tables.get(&table_id))
            .ok_or_else(|| HpsError::UnknownTable {
                model: model.to_string(),
                table_id,
            })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn lookup(
        &self,
        model: &str,
        table_id: u32,
        embed_vec_size: usize,
        dtype: VectorDtype,
        keys: KeyBatch<'_>,
    ) -> HpsResult<VectorBatch> {
        let result = self.lookup_inner(model, table_id, embed_vec_size, dtype, keys);
        if result.is_err() {
            self.metrics.reject();
        }
        result
    }

    fn lookup_inner(
        &self,
        model: &str,
        table_id: u32,
        embed_vec_size: usize,
        dtype: VectorDtype,
        keys: KeyBatch<'_>,
    ) -> HpsResult<VectorBatch> {
        let table = self.table(model, table_id)?;
        if dtype != VectorDtype::F32 {
            return Err(HpsError::UnsupportedDtype {
                dtype: dtype.to_string(),
            });
        }
        let dim = table.cache.dimension();
        if embed_vec_size != dim {
            return Err(HpsError::ShapeMismatch {
                expected: format!("embedding_vec_size {dim} for {}", table.name),
                actual: format!("embedding_vec_size {embed_vec_size}"),
            });
        }
        let rows = keys.validate(table.slot_num, table.max_batch_size)?;

        let span = crate::lookup_span!(model, table_id, keys.len());
        let _guard = span.enter();
        let resolved = resolve_batch(&self.pool, &table.cache, keys.keys(), self.workers);
        span.record("unique", resolved.unique);

        let misses = resolved.stats.store_hits + resolved.stats.defaults;
        if resolved.unique >= MIN_RESOLVE_CHUNK && misses * 2 > resolved.unique {
            debug!(
                table = %table.name,
                unique = resolved.unique,
                store_hits = resolved.stats.store_hits,
                defaults = resolved.stats.defaults,
                "miss storm: most keys fell through the cache"
            );
        }
        self.metrics
            .record(keys.len(), resolved.unique, &resolved.stats);
        VectorBatch::new(resolved.data, rows, table.slot_num, dim)
    }

    /// Insert the stored vectors of `keys` into every tier of a table.
    pub fn warm_up(&self, model: &str, table_id: u32, keys: &[Key]) -> HpsResult<usize> {
        let table = self.table(model, table_id)?;
        let _span = crate::warm_up_span!(model, table_id, keys.len()).entered();
        let found = self.pool.install(|| table.cache.warm_up(keys));
        info!(table = %table.name, requested = keys.len(), found, "tiers warmed");
        Ok(found)
    }

    pub fn table_status(&self) -> Vec<TableStatus> {
        self.models
            .iter()
            .flat_map(|(model, tables)| tables.values().map(move |t| t.status(model)))
            .collect()
    }

    pub fn counters(&self) -> LookupCounters {
        self.metrics.snapshot()
    }

    /// `(queued, applied, dropped)` deferred promotion batches.
    pub fn refresh_counts(&self) -> (u64, u64, u64) {
        self.refresher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .counts()
    }

    /// Stop the refresher and drop every resident tier entry.
    pub fn release(&self) {
        self.refresher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .shutdown();
        for tables in self.models.values() {
            for table in tables.values() {
                table.cache.clear();
            }
        }
    }
}
