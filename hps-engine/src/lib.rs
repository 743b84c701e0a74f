//! # hps-engine
//!
//! Serving entry points: lifecycle, batched lookups and reporting.
//!
//! ```no_run
//! use hps_core::{KeyBatch, VectorDtype};
//!
//! let hps = hps_engine::init(1024, "/models/naive_dnn/ps.json")?;
//! let keys = [2, 0, 2];
//! let vectors = hps.lookup("naive_dnn", 0, 16, VectorDtype::F32, KeyBatch::new(&keys, 3))?;
//! assert_eq!(vectors.shape(), [1, 3, 16]);
//! # Ok::<(), hps_core::HpsError>(())
//! ```

mod engine;
mod handle;
mod lookup;
pub mod metrics;
pub mod status;
pub mod tracing_setup;

use std::path::Path;

use hps_core::config::HpsConfig;
use hps_core::errors::HpsResult;

pub use handle::ServingHandle;
pub use metrics::LookupCounters;
pub use status::{EngineStatus, TableStatus};
pub use tracing_setup::init_tracing;

/// Install tracing from `config`, then create and initialize a handle.
pub fn initialize(config: HpsConfig) -> HpsResult<ServingHandle> {
    init_tracing(&config.observability);
    let handle = ServingHandle::new(config);
    handle.initialize()?;
    Ok(handle)
}

/// Initialize from a global batch size and a parameter server config file.
pub fn init(global_batch_size: usize, ps_config_file: impl AsRef<Path>) -> HpsResult<ServingHandle> {
    initialize(HpsConfig::new(
        global_batch_size,
        ps_config_file.as_ref().to_path_buf(),
    ))
}
