//! Key → row index, built once at load.

use std::collections::HashMap;
use std::path::Path;

use hps_core::errors::{HpsResult, LoadError};
use hps_core::Key;

/// Immutable mapping from key to row offset.
#[derive(Debug, Default)]
pub struct KeyIndex {
    rows: HashMap<Key, u32>,
}

impl KeyIndex {
    /// Index `keys` by position. Duplicate keys are a load error naming
    /// both rows; `path` is the key file they came from.
    pub fn build(keys: &[Key], path: &Path) -> HpsResult<Self> {
        if u32::try_from(keys.len()).is_err() {
            return Err(LoadError::TooManyRows {
                path: path.to_path_buf(),
                rows: keys.len() as u64,
            }
            .into());
        }
        let mut rows = HashMap::with_capacity(keys.len());
        for (row, &key) in keys.iter().enumerate() {
            if let Some(first) = rows.insert(key, row as u32) {
                return Err(LoadError::DuplicateKey {
                    path: path.to_path_buf(),
                    key,
                    first_row: first as usize,
                    second_row: row,
                }
                .into());
            }
        }
        Ok(Self { rows })
    }

    pub fn row_of(&self, key: Key) -> Option<usize> {
        self.rows.get(&key).map(|&row| row as usize)
    }

    pub fn contains(&self, key: Key) -> bool {
        self.rows.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
