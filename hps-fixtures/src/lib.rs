//! Test fixtures for the parameter server.
//!
//! Writes sparse tables in the producer's export format (a `key` file of
//! native-endian `i64` and an `emb_vector` file of native-endian `f32`)
//! into temporary directories, and builds matching configs.
//!
//! Helpers panic on I/O failure; they are meant for tests and benches.

use std::path::{Path, PathBuf};

use hps_core::config::{ModelConfig, PsConfig, TableConfig, TierConfig};
use hps_core::constants::{DEFAULT_KEY_FILE, DEFAULT_VECTOR_FILE};
use hps_core::Key;
use tempfile::TempDir;

/// Write `keys` and row-major `values` as a sparse model directory.
///
/// # Panics
/// Panics if `values.len()` is not a multiple of `keys.len()` or on I/O errors.
pub fn write_sparse_table(dir: &Path, keys: &[Key], values: &[f32]) -> PathBuf {
    assert!(
        keys.is_empty() || values.len() % keys.len() == 0,
        "values must hold whole rows"
    );
    let key_bytes: Vec<u8> = keys.iter().flat_map(|k| k.to_ne_bytes()).collect();
    let vector_bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
    write_raw_table(dir, &key_bytes, &vector_bytes)
}

/// Write arbitrary bytes as the key and vector files, for corruption tests.
pub fn write_raw_table(dir: &Path, key_bytes: &[u8], vector_bytes: &[u8]) -> PathBuf {
    std::fs::create_dir_all(dir)
        .unwrap_or_else(|e| panic!("Failed to create {}: {}", dir.display(), e));
    for (name, bytes) in [(DEFAULT_KEY_FILE, key_bytes), (DEFAULT_VECTOR_FILE, vector_bytes)] {
        let path = dir.join(name);
        std::fs::write(&path, bytes)
            .unwrap_or_else(|e| panic!("Failed to write {}: {}", path.display(), e));
    }
    dir.to_path_buf()
}

/// Deterministic vector for `key`: distinct per key and per element.
pub fn vector_for(key: Key, dim: usize) -> Vec<f32> {
    (0..dim)
        .map(|j| key as f32 * 0.5 + j as f32 * 0.001 - 1.0)
        .collect()
}

/// Keys `0..rows` with `vector_for` values, flattened row-major.
pub fn sequential_table(rows: usize, dim: usize) -> (Vec<Key>, Vec<f32>) {
    let keys: Vec<Key> = (0..rows as Key).collect();
    let values = keys.iter().flat_map(|&k| vector_for(k, dim)).collect();
    (keys, values)
}

/// The three-row, two-wide table `{0: [1,1], 1: [2,2], 2: [3,3]}`.
pub fn three_row_table() -> (Vec<Key>, Vec<f32>) {
    (vec![0, 1, 2], vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0])
}

/// A sparse table written into its own temporary directory.
pub struct TableFixture {
    dir: TempDir,
    pub keys: Vec<Key>,
    pub values: Vec<f32>,
    pub dim: usize,
}

impl TableFixture {
    pub fn new(keys: Vec<Key>, values: Vec<f32>, dim: usize) -> Self {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("Failed to create tempdir: {e}"));
        write_sparse_table(&dir.path().join("sparse.model"), &keys, &values);
        Self {
            dir,
            keys,
            values,
            dim,
        }
    }

    /// Keys `0..rows` with deterministic values.
    pub fn sequential(rows: usize, dim: usize) -> Self {
        let (keys, values) = sequential_table(rows, dim);
        Self::new(keys, values, dim)
    }

    pub fn three_rows() -> Self {
        let (keys, values) = three_row_table();
        Self::new(keys, values, 2)
    }

    /// Directory holding this fixture (and any config written next to it).
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// The sparse model directory.
    pub fn table_dir(&self) -> PathBuf {
        self.dir.path().join("sparse.model")
    }

    /// Stored vector for `key`, if present.
    pub fn expected(&self, key: Key) -> Option<&[f32]> {
        let row = self.keys.iter().position(|&k| k == key)?;
        Some(&self.values[row * self.dim..(row + 1) * self.dim])
    }

    /// Table config pointing at this fixture with a single tier.
    pub fn table_config(&self, table_id: u32, slot_num: usize, capacity: usize) -> TableConfig {
        let mut table = TableConfig::new(table_id, self.table_dir(), self.dim, slot_num);
        table.tiers = vec![TierConfig::with_capacity("device", capacity.max(1))];
        table
    }

    /// One-model config serving this fixture as table 0.
    pub fn ps_config(&self, model: &str, slot_num: usize, capacity: usize) -> PsConfig {
        single_table_ps(model, self.table_config(0, slot_num, capacity))
    }

    /// Write `ps` as JSON next to the table and return its path.
    pub fn write_ps_json(&self, ps: &PsConfig) -> PathBuf {
        write_ps_config_json(self.root(), "ps.json", ps)
    }
}

/// Config serving one table under `model`.
pub fn single_table_ps(model: &str, table: TableConfig) -> PsConfig {
    PsConfig {
        models: vec![ModelConfig {
            model: model.to_string(),
            max_batch_size: None,
            tables: vec![table],
        }],
    }
}

/// Serialize `ps` as JSON into `dir/name`.
pub fn write_ps_config_json(dir: &Path, name: &str, ps: &PsConfig) -> PathBuf {
    let path = dir.join(name);
    let json = serde_json::to_string_pretty(ps)
        .unwrap_or_else(|e| panic!("Failed to serialize config: {e}"));
    std::fs::write(&path, json)
        .unwrap_or_else(|e| panic!("Failed to write {}: {}", path.display(), e));
    path
}
