//! # hps-core
//!
//! Foundation crate for the hierarchical parameter server.
//! Defines the data model, traits, errors, config, and constants.
//! Every other crate in the workspace depends on this.

pub mod config;
pub mod constants;
pub mod errors;
pub mod models;
pub mod traits;

// Re-export the most commonly used types at the crate root.
pub use config::{HpsConfig, PsConfig};
pub use errors::{HpsError, HpsResult};
pub use models::{EngineState, Key, KeyBatch, TableKey, VectorBatch, VectorDtype};
