use serde::Serialize;

/// Point-in-time counters for one cache tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierStats {
    pub name: String,
    pub policy: String,
    /// Maximum resident keys.
    pub capacity: usize,
    /// Keys currently resident.
    pub resident: usize,
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
}

impl TierStats {
    /// Fraction of probes answered by this tier. Zero when never probed.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Outcome of resolving one set of keys through the hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolveStats {
    /// Hits per cache tier, index 0 is the fastest tier.
    pub tier_hits: Vec<usize>,
    /// Keys read from the backing table store.
    pub store_hits: usize,
    /// Keys absent from the table, answered with the default vector.
    pub defaults: usize,
    /// Promotions inserted synchronously.
    pub promoted: usize,
    /// Promotions handed to the background refresher.
    pub deferred: usize,
}

impl ResolveStats {
    pub fn with_tiers(tiers: usize) -> Self {
        Self {
            tier_hits: vec![0; tiers],
            ..Self::default()
        }
    }

    pub fn total(&self) -> usize {
        self.tier_hits.iter().sum::<usize>() + self.store_hits + self.defaults
    }

    /// Fraction of keys served by the fastest tier.
    pub fn fastest_tier_hit_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.tier_hits.first().copied().unwrap_or(0) as f64 / total as f64
    }

    /// Fold another chunk's outcome into this one.
    pub fn merge(&mut self, other: &ResolveStats) {
        if self.tier_hits.len() < other.tier_hits.len() {
            self.tier_hits.resize(other.tier_hits.len(), 0);
        }
        for (acc, hits) in self.tier_hits.iter_mut().zip(&other.tier_hits) {
            *acc += hits;
        }
        self.store_hits += other.store_hits;
        self.defaults += other.defaults;
        self.promoted += other.promoted;
        self.deferred += other.deferred;
    }
}
