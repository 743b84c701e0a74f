//! Engine configuration and the parameter server table description.

pub mod defaults;
mod ps_config;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, HpsResult};

pub use ps_config::{
    EvictionPolicyKind, ModelConfig, PromotionMode, PsConfig, StorageMode, TableConfig,
    TierConfig,
};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HpsConfig {
    /// Global batch size; sizes per-request resolution parallelism.
    pub global_batch_size: usize,
    /// Path to the parameter server description (JSON or TOML).
    pub ps_config_file: Option<PathBuf>,
    /// Inline table description, used instead of `ps_config_file` when set.
    pub ps: Option<PsConfig>,
    /// Lookup pool size. Derived from `global_batch_size` when unset.
    pub worker_threads: Option<usize>,
    /// Concurrent async lookups admitted at once.
    pub max_inflight_lookups: usize,
    /// Memory budget across all cache tiers of all tables.
    pub max_cache_bytes: Option<u64>,
    /// Depth of the deferred promotion queue.
    pub refresh_queue_depth: usize,
    pub observability: ObservabilityConfig,
}

impl Default for HpsConfig {
    fn default() -> Self {
        Self {
            global_batch_size: defaults::DEFAULT_GLOBAL_BATCH_SIZE,
            ps_config_file: None,
            ps: None,
            worker_threads: None,
            max_inflight_lookups: defaults::DEFAULT_MAX_INFLIGHT_LOOKUPS,
            max_cache_bytes: None,
            refresh_queue_depth: defaults::DEFAULT_REFRESH_QUEUE_DEPTH,
            observability: ObservabilityConfig::default(),
        }
    }
}

impl HpsConfig {
    /// Config pointing at a parameter server file, the `Init` entry point shape.
    pub fn new(global_batch_size: usize, ps_config_file: impl Into<PathBuf>) -> Self {
        Self {
            global_batch_size,
            ps_config_file: Some(ps_config_file.into()),
            ..Self::default()
        }
    }

    /// Config carrying its table description inline.
    pub fn with_ps_config(global_batch_size: usize, ps: PsConfig) -> Self {
        Self {
            global_batch_size,
            ps: Some(ps),
            ..Self::default()
        }
    }

    /// Parse from a TOML string. Missing fields use defaults.
    pub fn from_toml(toml_str: &str) -> HpsResult<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| ConfigError::ParseFailed {
            source_name: "engine config".to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML engine config file.
    pub fn from_toml_file(path: &Path) -> HpsResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut config = Self::from_toml(&text)?;
        // A relative table description path is relative to this file.
        if let (Some(ps_path), Some(base)) = (config.ps_config_file.as_mut(), path.parent()) {
            if ps_path.is_relative() {
                *ps_path = base.join(&*ps_path);
            }
        }
        Ok(config)
    }

    /// Check engine-level settings.
    pub fn validate(&self) -> HpsResult<()> {
        if self.global_batch_size == 0 {
            return Err(invalid("global_batch_size", "must be greater than zero"));
        }
        if self.worker_threads == Some(0) {
            return Err(invalid("worker_threads", "must be greater than zero"));
        }
        if self.max_inflight_lookups == 0 {
            return Err(invalid("max_inflight_lookups", "must be greater than zero"));
        }
        if self.refresh_queue_depth == 0 {
            return Err(invalid("refresh_queue_depth", "must be greater than zero"));
        }
        Ok(())
    }

    /// Resolve the table description: inline config wins over the file.
    pub fn load_ps_config(&self) -> HpsResult<PsConfig> {
        let ps = match (&self.ps, &self.ps_config_file) {
            (Some(inline), _) => inline.clone(),
            (None, Some(path)) => PsConfig::from_file(path)?,
            (None, None) => return Err(ConfigError::MissingPsConfig.into()),
        };
        ps.validate()?;
        Ok(ps)
    }

    /// Lookup pool size: explicit, or one worker per `KEYS_PER_WORKER`
    /// keys of the global batch, bounded by the machine's parallelism.
    pub fn resolved_worker_threads(&self) -> usize {
        if let Some(n) = self.worker_threads {
            return n;
        }
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        (self.global_batch_size / crate::constants::KEYS_PER_WORKER).clamp(1, available)
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: defaults::DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
        }
    }
}

fn invalid(context: &str, reason: &str) -> crate::errors::HpsError {
    ConfigError::Invalid {
        context: context.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
