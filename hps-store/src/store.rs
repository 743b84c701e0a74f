//! SparseTableStore: the final, unbounded tier.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info};

use hps_core::config::{StorageMode, TableConfig};
use hps_core::errors::{HpsError, HpsResult, LoadError};
use hps_core::traits::DataSource;
use hps_core::Key;

use crate::index::KeyIndex;
use crate::layout::{decode_keys, validate_layout, TableFiles};
use crate::source::LocalFileSource;
use crate::vectors::VectorStorage;

/// Read-only key → vector table loaded from the producer's export.
///
/// Safe to share across threads without locking: nothing mutates after
/// `open` returns.
#[derive(Debug)]
pub struct SparseTableStore {
    name: String,
    dim: usize,
    keys: Vec<Key>,
    index: KeyIndex,
    vectors: VectorStorage,
    key_path: PathBuf,
    vector_path: PathBuf,
}

impl SparseTableStore {
    /// Load a table from the local filesystem.
    pub fn open(model: &str, table: &TableConfig) -> HpsResult<Self> {
        Self::open_with_source(model, table, &LocalFileSource)
    }

    /// Load a table, reading key (and, in memory mode, vector) files
    /// through `source`. Memory-mapped vectors are always mapped from the
    /// local path.
    pub fn open_with_source(
        model: &str,
        table: &TableConfig,
        source: &dyn DataSource,
    ) -> HpsResult<Self> {
        let started = Instant::now();
        let name = table.describe(model);
        let key_path = table.key_path();
        let vector_path = table.vector_path();
        let files = TableFiles {
            table: &name,
            key_path: &key_path,
            vector_path: &vector_path,
            dim: table.embedding_vec_size,
        };

        let key_len = source.file_size(&key_path)?;
        let vector_len = source.file_size(&vector_path)?;
        let rows = validate_layout(&files, key_len, vector_len)?;

        let keys = decode_keys(&source.read_all(&key_path)?);
        if keys.len() != rows {
            return Err(LoadError::Io {
                path: key_path,
                reason: format!("expected {rows} keys, read {}", keys.len()),
            }
            .into());
        }
        let index = KeyIndex::build(&keys, &key_path)?;

        let vectors = match table.storage {
            StorageMode::Mmap => VectorStorage::map_file(&vector_path)?,
            StorageMode::Memory => VectorStorage::from_bytes(&source.read_all(&vector_path)?),
        };
        // The mapped file can differ from what the source reported.
        let stored_len = vectors.byte_len() as u64;
        if stored_len != vector_len {
            validate_layout(&files, key_len, stored_len)?;
            return Err(LoadError::Io {
                path: vector_path,
                reason: format!("expected {vector_len} bytes, found {stored_len}"),
            }
            .into());
        }

        info!(
            table = %name,
            rows,
            dim = table.embedding_vec_size,
            storage = vectors.kind(),
            source = source.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sparse table loaded"
        );

        Ok(Self {
            name,
            dim: table.embedding_vec_size,
            keys,
            index,
            vectors,
            key_path,
            vector_path,
        })
    }

    /// Build a table from in-process buffers: `values` holds `keys.len()`
    /// rows of `dim` floats.
    pub fn from_parts(
        name: impl Into<String>,
        keys: Vec<Key>,
        values: Vec<f32>,
        dim: usize,
    ) -> HpsResult<Self> {
        let name = name.into();
        if dim == 0 || values.len() != keys.len() * dim {
            return Err(HpsError::ShapeMismatch {
                expected: format!("{} floats ({} rows of {dim})", keys.len() * dim, keys.len()),
                actual: format!("{} floats", values.len()),
            });
        }
        let origin = PathBuf::from(format!("<memory:{name}>"));
        let index = KeyIndex::build(&keys, &origin)?;
        debug!(table = %name, rows = keys.len(), dim, "in-memory table built");
        Ok(Self {
            name,
            dim,
            keys,
            index,
            vectors: VectorStorage::Owned(values),
            key_path: origin.clone(),
            vector_path: origin,
        })
    }

    /// Copy the vector for `key` into `out` (`dimension()` floats).
    /// Returns false when the key is absent; `out` is left untouched.
    pub fn read_into(&self, key: Key, out: &mut [f32]) -> bool {
        match self.index.row_of(key) {
            Some(row) => {
                self.vectors.read_row_into(row, out);
                true
            }
            None => false,
        }
    }

    /// Point lookup. `None` is the normal not-found result.
    pub fn get(&self, key: Key) -> Option<Vec<f32>> {
        let row = self.index.row_of(key)?;
        let mut out = vec![0.0; self.dim];
        self.vectors.read_row_into(row, &mut out);
        Some(out)
    }

    /// Point lookups in input order.
    pub fn bulk_get(&self, keys: &[Key]) -> Vec<Option<Vec<f32>>> {
        keys.iter().map(|&k| self.get(k)).collect()
    }

    /// Bulk lookup into a flat buffer of `keys.len() * dimension()` floats.
    /// `found[i]` records whether `keys[i]` exists; rows of absent keys are
    /// left untouched. Returns the number found.
    pub fn bulk_read_into(&self, keys: &[Key], out: &mut [f32], found: &mut [bool]) -> usize {
        let mut hits = 0;
        for ((&key, row_out), hit) in keys
            .iter()
            .zip(out.chunks_exact_mut(self.dim))
            .zip(found.iter_mut())
        {
            *hit = self.read_into(key, row_out);
            hits += usize::from(*hit);
        }
        hits
    }

    /// Copy the vector stored at `row` into `out`.
    pub fn read_row_into(&self, row: usize, out: &mut [f32]) {
        self.vectors.read_row_into(row, out);
    }

    pub fn contains(&self, key: Key) -> bool {
        self.index.contains(key)
    }

    /// Keys in file row order.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn row_count(&self) -> usize {
        self.keys.len()
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage_kind(&self) -> &'static str {
        self.vectors.kind()
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    pub fn vector_path(&self) -> &Path {
        &self.vector_path
    }

    /// Bytes of vector data held in process memory.
    pub fn resident_bytes(&self) -> usize {
        self.vectors.resident_bytes()
    }
}
