//! Parameter server description: which tables to serve and how to cache them.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::defaults;
use crate::constants::{DEFAULT_KEY_FILE, DEFAULT_VECTOR_FILE, MAX_TIER_WAYS};
use crate::errors::{ConfigError, HpsResult};
use crate::models::TableKey;

/// All models and tables served by one engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PsConfig {
    pub models: Vec<ModelConfig>,
}

/// One model and its embedding tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: String,
    /// Largest accepted batch, in rows. Unbounded when unset.
    #[serde(default)]
    pub max_batch_size: Option<usize>,
    pub tables: Vec<TableConfig>,
}

/// One embedding table and its tier hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub table_id: u32,
    #[serde(default)]
    pub name: Option<String>,
    /// Directory holding the key and vector files.
    pub sparse_file: PathBuf,
    #[serde(default = "default_key_file")]
    pub key_file_name: String,
    #[serde(default = "default_vector_file")]
    pub vector_file_name: String,
    pub embedding_vec_size: usize,
    /// Keys per batch row.
    pub slot_num: usize,
    /// Fill value of the vector returned for absent keys.
    #[serde(default = "default_value")]
    pub default_value: f32,
    /// Explicit vector returned for absent keys; overrides `default_value`.
    #[serde(default)]
    pub default_vector: Option<Vec<f32>>,
    #[serde(default)]
    pub storage: StorageMode,
    #[serde(default)]
    pub promotion: PromotionMode,
    #[serde(default = "default_hit_rate_threshold")]
    pub hit_rate_threshold: f64,
    /// Fill tiers from the store at initialization.
    #[serde(default)]
    pub preload: bool,
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierConfig>,
}

/// One cache tier. Exactly one of `capacity` and `capacity_ratio` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    #[serde(default = "default_tier_name")]
    pub name: String,
    /// Maximum resident keys.
    #[serde(default)]
    pub capacity: Option<usize>,
    /// Maximum resident keys as a share of the table's rows.
    #[serde(default)]
    pub capacity_ratio: Option<f64>,
    #[serde(default)]
    pub policy: EvictionPolicyKind,
    #[serde(default = "default_shards")]
    pub shards: usize,
    #[serde(default = "default_ways")]
    pub ways: usize,
}

/// How a tier chooses what to evict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicyKind {
    /// Oldest access within a set-associative bucket.
    #[default]
    BucketedLru,
    /// Least frequent access within a bucket, with counter aging.
    BucketedLfu,
    /// moka's TinyLFU admission and eviction.
    TinyLfu,
}

impl fmt::Display for EvictionPolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BucketedLru => "bucketed_lru",
            Self::BucketedLfu => "bucketed_lfu",
            Self::TinyLfu => "tiny_lfu",
        })
    }
}

/// Which tiers receive a vector resolved below the fastest tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionMode {
    /// Every tier above the one that answered.
    #[default]
    All,
    /// Only the fastest tier.
    Fastest,
}

/// How the vector file is held after load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Memory-mapped; pages fault in on access.
    #[default]
    Mmap,
    /// Read fully into process memory.
    Memory,
}

fn default_key_file() -> String {
    DEFAULT_KEY_FILE.to_string()
}

fn default_vector_file() -> String {
    DEFAULT_VECTOR_FILE.to_string()
}

fn default_value() -> f32 {
    defaults::DEFAULT_VALUE
}

fn default_hit_rate_threshold() -> f64 {
    defaults::DEFAULT_HIT_RATE_THRESHOLD
}

fn default_tier_name() -> String {
    defaults::DEFAULT_TIER_NAME.to_string()
}

fn default_shards() -> usize {
    defaults::DEFAULT_TIER_SHARDS
}

fn default_ways() -> usize {
    defaults::DEFAULT_TIER_WAYS
}

fn default_tiers() -> Vec<TierConfig> {
    vec![TierConfig::with_ratio(
        defaults::DEFAULT_TIER_NAME,
        defaults::DEFAULT_CACHE_RATIO,
    )]
}

impl PsConfig {
    /// Parse a JSON document.
    pub fn from_json(json: &str) -> HpsResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            ConfigError::ParseFailed {
                source_name: "parameter server config (json)".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Parse a TOML document.
    pub fn from_toml(toml_str: &str) -> HpsResult<Self> {
        toml::from_str(toml_str).map_err(|e| {
            ConfigError::ParseFailed {
                source_name: "parameter server config (toml)".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Read a config file, TOML when the extension is `.toml` and JSON
    /// otherwise. Relative table paths resolve against the file's directory.
    pub fn from_file(path: &Path) -> HpsResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        let parsed = if is_toml {
            Self::from_toml(&text)
        } else {
            Self::from_json(&text)
        };
        let mut config = parsed.map_err(|e| match e {
            crate::errors::HpsError::ConfigError(ConfigError::ParseFailed { reason, .. }) => {
                ConfigError::ParseFailed {
                    source_name: path.display().to_string(),
                    reason,
                }
                .into()
            }
            other => other,
        })?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Make every relative `sparse_file` relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for table in self.models.iter_mut().flat_map(|m| m.tables.iter_mut()) {
            if table.sparse_file.is_relative() {
                table.sparse_file = base.join(&table.sparse_file);
            }
        }
    }

    /// Reject anything that would make a table unservable.
    pub fn validate(&self) -> HpsResult<()> {
        let mut seen = HashSet::new();
        for model in &self.models {
            if model.model.is_empty() {
                return Err(ConfigError::Invalid {
                    context: "model".to_string(),
                    reason: "model name must not be empty".to_string(),
                }
                .into());
            }
            if model.max_batch_size == Some(0) {
                return Err(ConfigError::Invalid {
                    context: format!("model '{}'", model.model),
                    reason: "max_batch_size must be greater than zero".to_string(),
                }
                .into());
            }
            for table in &model.tables {
                if !seen.insert(TableKey::new(model.model.clone(), table.table_id)) {
                    return Err(ConfigError::DuplicateTable {
                        model: model.model.clone(),
                        table_id: table.table_id,
                    }
                    .into());
                }
                table.validate(&model.model)?;
            }
        }
        Ok(())
    }

    /// Iterate `(model, table)` pairs in declaration order.
    pub fn tables(&self) -> impl Iterator<Item = (&ModelConfig, &TableConfig)> {
        self.models
            .iter()
            .flat_map(|m| m.tables.iter().map(move |t| (m, t)))
    }
}

impl TableConfig {
    /// Minimal table description with default caching.
    pub fn new(
        table_id: u32,
        sparse_file: impl Into<PathBuf>,
        embedding_vec_size: usize,
        slot_num: usize,
    ) -> Self {
        Self {
            table_id,
            name: None,
            sparse_file: sparse_file.into(),
            key_file_name: default_key_file(),
            vector_file_name: default_vector_file(),
            embedding_vec_size,
            slot_num,
            default_value: default_value(),
            default_vector: None,
            storage: StorageMode::default(),
            promotion: PromotionMode::default(),
            hit_rate_threshold: default_hit_rate_threshold(),
            preload: false,
            tiers: default_tiers(),
        }
    }

    pub fn key_path(&self) -> PathBuf {
        self.sparse_file.join(&self.key_file_name)
    }

    pub fn vector_path(&self) -> PathBuf {
        self.sparse_file.join(&self.vector_file_name)
    }

    /// Vector returned for keys absent from the table.
    pub fn default_vector(&self) -> Vec<f32> {
        match &self.default_vector {
            Some(v) => v.clone(),
            None => vec![self.default_value; self.embedding_vec_size],
        }
    }

    /// Human-readable name used in errors and logs.
    pub fn describe(&self, model: &str) -> String {
        let key = TableKey::new(model, self.table_id);
        match &self.name {
            Some(name) => format!("{key} ({name})"),
            None => key.to_string(),
        }
    }

    fn validate(&self, model: &str) -> HpsResult<()> {
        let context = self.describe(model);
        let fail = |reason: String| -> HpsResult<()> {
            Err(ConfigError::Invalid {
                context: context.clone(),
                reason,
            }
            .into())
        };
        if self.embedding_vec_size == 0 {
            return fail("embedding_vec_size must be greater than zero".to_string());
        }
        if self.slot_num == 0 {
            return fail("slot_num must be greater than zero".to_string());
        }
        if let Some(v) = &self.default_vector {
            if v.len() != self.embedding_vec_size {
                return fail(format!(
                    "default_vector has {} values but embedding_vec_size is {}",
                    v.len(),
                    self.embedding_vec_size
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.hit_rate_threshold) {
            return fail(format!(
                "hit_rate_threshold {} is outside [0, 1]",
                self.hit_rate_threshold
            ));
        }
        let mut names = HashSet::new();
        for tier in &self.tiers {
            if !names.insert(tier.name.as_str()) {
                return fail(format!("tier '{}' is declared more than once", tier.name));
            }
            if let Err(reason) = tier.check() {
                return fail(format!("tier '{}': {reason}", tier.name));
            }
        }
        Ok(())
    }
}

impl TierConfig {
    /// Tier holding at most `capacity` keys with the default policy.
    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: Some(capacity),
            capacity_ratio: None,
            policy: EvictionPolicyKind::default(),
            shards: default_shards(),
            ways: default_ways(),
        }
    }

    /// Tier sized as a share of the table's rows.
    pub fn with_ratio(name: impl Into<String>, ratio: f64) -> Self {
        Self {
            name: name.into(),
            capacity: None,
            capacity_ratio: Some(ratio),
            policy: EvictionPolicyKind::default(),
            shards: default_shards(),
            ways: default_ways(),
        }
    }

    pub fn policy(mut self, policy: EvictionPolicyKind) -> Self {
        self.policy = policy;
        self
    }

    pub fn layout(mut self, shards: usize, ways: usize) -> Self {
        self.shards = shards;
        self.ways = ways;
        self
    }

    fn check(&self) -> Result<(), String> {
        match (self.capacity, self.capacity_ratio) {
            (Some(_), Some(_)) => {
                return Err("set either capacity or capacity_ratio, not both".to_string())
            }
            (None, None) => return Err("capacity or capacity_ratio is required".to_string()),
            (Some(0), None) => return Err("capacity must be greater than zero".to_string()),
            (None, Some(r)) if !(r > 0.0 && r <= 1.0) => {
                return Err(format!("capacity_ratio {r} is outside (0, 1]"))
            }
            _ => {}
        }
        if self.shards == 0 {
            return Err("shards must be greater than zero".to_string());
        }
        if self.ways == 0 || self.ways > MAX_TIER_WAYS {
            return Err(format!("ways must be within 1..={MAX_TIER_WAYS}"));
        }
        Ok(())
    }

    /// Maximum resident keys for a table of `rows` rows.
    pub fn resolve_capacity(&self, rows: usize) -> usize {
        match (self.capacity, self.capacity_ratio) {
            (Some(capacity), _) => capacity,
            (None, Some(ratio)) => (rows as f64 * ratio).ceil() as usize,
            (None, None) => 0,
        }
    }
}
