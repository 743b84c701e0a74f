mod engine_state;
mod lookup_batch;
mod table_key;
mod tier_stats;

pub use engine_state::EngineState;
pub use lookup_batch::{KeyBatch, VectorBatch};
pub use table_key::{Key, TableKey, VectorDtype};
pub use tier_stats::{ResolveStats, TierStats};
