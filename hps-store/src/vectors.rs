//! Vector file storage: memory-mapped or owned.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use hps_core::constants::FLOAT_BYTES;
use hps_core::errors::{HpsResult, LoadError};

/// Row-addressable vector data.
pub enum VectorStorage {
    /// Vector file mapped read-only; pages fault in on access.
    Mapped(Mmap),
    /// Vector file decoded into process memory.
    Owned(Vec<f32>),
}

impl VectorStorage {
    /// Map the vector file read-only.
    pub fn map_file(path: &Path) -> HpsResult<Self> {
        let io_err = |e: std::io::Error| LoadError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        let file = File::open(path).map_err(io_err)?;
        if file.metadata().map_err(io_err)?.len() == 0 {
            // Zero-length mappings are rejected on some platforms.
            return Ok(Self::Owned(Vec::new()));
        }
        // SAFETY: published table files are immutable; nothing in the
        // process writes to or truncates them while the map is alive.
        let map = unsafe { Mmap::map(&file) }.map_err(io_err)?;
        Ok(Self::Mapped(map))
    }

    /// Decode a vector file body into owned floats.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::Owned(
            bytes
                .chunks_exact(FLOAT_BYTES)
                .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }

    /// Copy row `row` of width `out.len()` into `out`.
    pub fn read_row_into(&self, row: usize, out: &mut [f32]) {
        let dim = out.len();
        match self {
            Self::Owned(values) => out.copy_from_slice(&values[row * dim..(row + 1) * dim]),
            Self::Mapped(map) => {
                let start = row * dim * FLOAT_BYTES;
                let bytes = &map[start..start + dim * FLOAT_BYTES];
                for (slot, c) in out.iter_mut().zip(bytes.chunks_exact(FLOAT_BYTES)) {
                    *slot = f32::from_ne_bytes([c[0], c[1], c[2], c[3]]);
                }
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Mapped(_) => "mmap",
            Self::Owned(_) => "memory",
        }
    }

    /// Length of the vector data in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            Self::Mapped(map) => map.len(),
            Self::Owned(values) => values.len() * FLOAT_BYTES,
        }
    }

    /// Bytes held in process memory (mapped pages are not counted).
    pub fn resident_bytes(&self) -> usize {
        match self {
            Self::Mapped(_) => 0,
            Self::Owned(values) => values.len() * FLOAT_BYTES,
        }
    }
}

impl std::fmt::Debug for VectorStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mapped(map) => f.debug_struct("Mapped").field("len", &map.len()).finish(),
            Self::Owned(values) => f.debug_struct("Owned").field("floats", &values.len()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    #[test]
    fn owned_and_mapped_read_the_same_rows() {
        let values = [1.0f32, 2.0, 3.0, 4.0, -0.5, f32::MIN_POSITIVE];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emb_vector");
        std::fs::write(&path, encode(&values)).unwrap();

        let owned = VectorStorage::from_bytes(&encode(&values));
        let mapped = VectorStorage::map_file(&path).unwrap();
        assert_eq!(mapped.kind(), "mmap");

        for row in 0..3 {
            let mut a = [0.0f32; 2];
            let mut b = [0.0f32; 2];
            owned.read_row_into(row, &mut a);
            mapped.read_row_into(row, &mut b);
            assert_eq!(a, b);
            assert_eq!(&a, &values[row * 2..row * 2 + 2]);
        }
    }

    #[test]
    fn empty_file_maps_to_empty_owned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emb_vector");
        std::fs::write(&path, []).unwrap();
        let storage = VectorStorage::map_file(&path).unwrap();
        assert_eq!(storage.kind(), "memory");
        assert_eq!(storage.resident_bytes(), 0);
        assert_eq!(storage.byte_len(), 0);
    }
}
