//! Default values for every configurable setting.

pub const DEFAULT_GLOBAL_BATCH_SIZE: usize = 1024;
pub const DEFAULT_MAX_INFLIGHT_LOOKUPS: usize = 64;
pub const DEFAULT_REFRESH_QUEUE_DEPTH: usize = 4096;
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const DEFAULT_TIER_SHARDS: usize = 16;
pub const DEFAULT_TIER_WAYS: usize = 8;
/// Share of a table's rows cached when a table declares no tiers.
pub const DEFAULT_CACHE_RATIO: f64 = 0.5;
pub const DEFAULT_TIER_NAME: &str = "device";

pub const DEFAULT_VALUE: f32 = 0.0;
/// Batches whose fastest-tier hit rate reaches this value defer promotions.
/// At 1.0 every promotion is synchronous.
pub const DEFAULT_HIT_RATE_THRESHOLD: f64 = 1.0;
