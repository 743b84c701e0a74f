//! Error taxonomy.
//!
//! Initialization failures (`ConfigError`, `LoadError`, `CapacityExhausted`)
//! abort startup. Per-call failures (`ShapeMismatch`, `UnsupportedDtype`,
//! `UnknownTable`) fail only that call. Missing keys are never errors.

mod config_error;
mod load_error;

pub use config_error::ConfigError;
pub use load_error::LoadError;

use crate::models::EngineState;

/// Result alias used across the workspace.
pub type HpsResult<T> = Result<T, HpsError>;

/// Top-level error for every parameter server operation.
#[derive(Debug, thiserror::Error)]
pub enum HpsError {
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("table load error: {0}")]
    LoadError(#[from] LoadError),

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("unsupported embedding dtype '{dtype}', only f32 tables are served")]
    UnsupportedDtype { dtype: String },

    #[error("unknown table {table_id} for model '{model}'")]
    UnknownTable { model: String, table_id: u32 },

    #[error("tier '{tier}' of table {table} cannot allocate {requested_bytes} bytes")]
    CapacityExhausted {
        table: String,
        tier: String,
        requested_bytes: u64,
    },

    #[error("engine is not ready (state: {state})")]
    NotReady { state: EngineState },

    #[error("cannot {operation} while engine is {state}")]
    InvalidState {
        operation: &'static str,
        state: EngineState,
    },

    #[error("runtime error: {reason}")]
    RuntimeError { reason: String },

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl HpsError {
    /// Whether this error is raised only during initialization.
    pub fn is_fatal_at_init(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_) | Self::LoadError(_) | Self::CapacityExhausted { .. }
        )
    }
}
