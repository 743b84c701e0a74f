//! Build a table's tier stack from its configuration.

use hps_core::config::{EvictionPolicyKind, TableConfig, TierConfig};
use hps_core::constants::{FLOAT_BYTES, KEY_BYTES};
use hps_core::errors::HpsResult;
use hps_core::traits::CacheTier;

use crate::policy::{policy_for, SlotMeta};
use crate::tier::{ArenaTier, TinyLfuTier};
use crate::tiered::TierStack;

/// Allocate every tier of `table`, fastest first, for a store of `rows`
/// rows of `dim` floats.
pub fn build_tiers(
    table_name: &str,
    table: &TableConfig,
    rows: usize,
    dim: usize,
) -> HpsResult<TierStack> {
    table
        .tiers
        .iter()
        .map(|tier| build_tier(table_name, tier, rows, dim))
        .collect()
}

fn build_tier(
    table_name: &str,
    tier: &TierConfig,
    rows: usize,
    dim: usize,
) -> HpsResult<Box<dyn CacheTier>> {
    let capacity = tier.resolve_capacity(rows);
    match policy_for(tier.policy) {
        Some(policy) => Ok(Box::new(ArenaTier::new(
            table_name,
            tier.name.clone(),
            capacity,
            dim,
            tier.shards,
            tier.ways,
            policy,
        )?)),
        None => Ok(Box::new(TinyLfuTier::new(tier.name.clone(), capacity))),
    }
}

/// Upper bound on the bytes the tiers of `table` will hold for `rows` rows.
pub fn estimate_tier_bytes(table: &TableConfig, rows: usize) -> u64 {
    let vector = (table.embedding_vec_size * FLOAT_BYTES) as u64;
    table
        .tiers
        .iter()
        .map(|tier| {
            let overhead = match tier.policy {
                EvictionPolicyKind::TinyLfu => KEY_BYTES as u64,
                _ => (KEY_BYTES + std::mem::size_of::<SlotMeta>()) as u64,
            };
            (tier.resolve_capacity(rows) as u64).saturating_mul(vector + overhead)
        })
        .fold(0u64, u64::saturating_add)
}
