//! Cache tier implementations.

mod arena;
mod counters;
mod tiny_lfu;

pub use arena::ArenaTier;
pub(crate) use counters::TierCounters;
pub use tiny_lfu::TinyLfuTier;
