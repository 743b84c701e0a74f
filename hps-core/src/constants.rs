/// Parameter server version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Width in bytes of one serialized key.
pub const KEY_BYTES: usize = std::mem::size_of::<i64>();

/// Width in bytes of one serialized vector element.
pub const FLOAT_BYTES: usize = std::mem::size_of::<f32>();

/// Default name of the key file inside a sparse model directory.
pub const DEFAULT_KEY_FILE: &str = "key";

/// Default name of the vector file inside a sparse model directory.
pub const DEFAULT_VECTOR_FILE: &str = "emb_vector";

/// Keys each lookup worker is expected to resolve per request.
/// Used to derive the worker count from `global_batch_size`.
pub const KEYS_PER_WORKER: usize = 1024;

/// Smallest chunk of unique keys handed to a single worker.
pub const MIN_RESOLVE_CHUNK: usize = 256;

/// Upper bound on set-associativity of an arena tier bucket.
pub const MAX_TIER_WAYS: usize = 64;
