//! Span definitions for engine operations.

/// Create a lookup span.
#[macro_export]
macro_rules! lookup_span {
    ($model:expr, $table_id:expr, $keys:expr) => {
        tracing::debug_span!(
            "hps.lookup",
            model = %$model,
            table_id = $table_id,
            keys = $keys,
            unique = tracing::field::Empty
        )
    };
}

/// Create a warm-up span.
#[macro_export]
macro_rules! warm_up_span {
    ($model:expr, $table_id:expr, $keys:expr) => {
        tracing::info_span!("hps.warm_up", model = %$model, table_id = $table_id, keys = $keys)
    };
}

/// Create an initialization span.
#[macro_export]
macro_rules! init_span {
    ($instance:expr) => {
        tracing::info_span!("hps.initialize", instance = %$instance)
    };
}

/// Span names as constants for programmatic use.
pub mod names {
    pub const LOOKUP: &str = "hps.lookup";
    pub const WARM_UP: &str = "hps.warm_up";
    pub const INITIALIZE: &str = "hps.initialize";
}
