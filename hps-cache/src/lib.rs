//! # hps-cache
//!
//! The tier hierarchy in front of a sparse table store.
//!
//! Tiers are walked fastest to slowest; a miss in every tier falls through to
//! the store, and the resolved vector is promoted into the faster tiers.
//! Tables are immutable while served, so promotion is a plain insert and a
//! racing duplicate insert writes identical bytes.

mod builder;
mod hash;
pub mod policy;
mod refresh;
pub mod tier;
mod tiered;

pub use builder::{build_tiers, estimate_tier_bytes};
pub use policy::{policy_for, BucketedLfu, BucketedLru, EvictionPolicy, SlotMeta};
pub use refresh::{PromotionBatch, RefreshHandle, Refresher, SubmitOutcome};
pub use tier::{ArenaTier, TinyLfuTier};
pub use tiered::{CacheOptions, TierStack, TieredCache};
