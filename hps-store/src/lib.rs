//! # hps-store
//!
//! Ground truth for every key: the producer's two aligned files (`key` and
//! `emb_vector`) loaded behind an immutable key index.
//! Read-only after load, so lookups take no locks.

mod index;
mod layout;
mod source;
mod store;
mod vectors;

pub use index::KeyIndex;
pub use layout::{decode_keys, validate_layout, TableFiles};
pub use source::LocalFileSource;
pub use store::SparseTableStore;
pub use vectors::VectorStorage;
