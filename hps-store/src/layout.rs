//! On-disk layout checks for the producer's two-file export.
//!
//! `key`: native-endian `i64` per row. `emb_vector`: `dim` native-endian
//! `f32` per row. Row `i` of both files describes the same embedding.

use std::path::Path;

use hps_core::constants::{FLOAT_BYTES, KEY_BYTES};
use hps_core::errors::{ConfigError, HpsResult, LoadError};
use hps_core::Key;

/// The files of one table and the width the configuration expects.
#[derive(Debug, Clone, Copy)]
pub struct TableFiles<'a> {
    /// Table description used in errors.
    pub table: &'a str,
    pub key_path: &'a Path,
    pub vector_path: &'a Path,
    pub dim: usize,
}

/// Validate file sizes against each other and the configured dimension.
/// Returns the row count.
///
/// When the vector file divides evenly over the key rows but at a different
/// width, the configured dimension is reported as wrong.
pub fn validate_layout(files: &TableFiles<'_>, key_len: u64, vector_len: u64) -> HpsResult<usize> {
    if key_len % KEY_BYTES as u64 != 0 {
        return Err(LoadError::TruncatedRecord {
            path: files.key_path.to_path_buf(),
            len: key_len,
            record_bytes: KEY_BYTES,
        }
        .into());
    }
    if vector_len % FLOAT_BYTES as u64 != 0 {
        return Err(LoadError::TruncatedRecord {
            path: files.vector_path.to_path_buf(),
            len: vector_len,
            record_bytes: FLOAT_BYTES,
        }
        .into());
    }

    let key_rows = key_len / KEY_BYTES as u64;
    let floats = vector_len / FLOAT_BYTES as u64;
    let dim = files.dim as u64;

    if key_rows.checked_mul(dim) == Some(floats) {
        return usize::try_from(key_rows).map_err(|_| {
            LoadError::TooManyRows {
                path: files.key_path.to_path_buf(),
                rows: key_rows,
            }
            .into()
        });
    }
    if key_rows > 0 && floats % key_rows == 0 {
        return Err(ConfigError::DimensionMismatch {
            table: files.table.to_string(),
            file: files.vector_path.to_path_buf(),
            expected: files.dim,
            actual: (floats / key_rows) as usize,
        }
        .into());
    }
    if dim > 0 && floats % dim == 0 {
        return Err(LoadError::RowCountMismatch {
            key_path: files.key_path.to_path_buf(),
            key_rows: key_rows as usize,
            vector_path: files.vector_path.to_path_buf(),
            vector_rows: (floats / dim) as usize,
        }
        .into());
    }
    Err(LoadError::TruncatedRecord {
        path: files.vector_path.to_path_buf(),
        len: vector_len,
        record_bytes: files.dim * FLOAT_BYTES,
    }
    .into())
}

/// Decode a key file body.
pub fn decode_keys(bytes: &[u8]) -> Vec<Key> {
    bytes
        .chunks_exact(KEY_BYTES)
        .map(|c| i64::from_ne_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(dim: usize) -> TableFiles<'static> {
        TableFiles {
            table: "naive_dnn[0]",
            key_path: Path::new("/m/key"),
            vector_path: Path::new("/m/emb_vector"),
            dim,
        }
    }

    #[test]
    fn aligned_files_yield_row_count() {
        assert_eq!(validate_layout(&files(2), 3 * 8, 3 * 2 * 4).unwrap(), 3);
    }

    #[test]
    fn empty_table_is_valid() {
        assert_eq!(validate_layout(&files(16), 0, 0).unwrap(), 0);
    }

    #[test]
    fn truncated_key_file() {
        let err = validate_layout(&files(2), 23, 24).unwrap_err().to_string();
        assert!(err.contains("/m/key"), "{err}");
        assert!(err.contains("truncated"), "{err}");
    }

    #[test]
    fn truncated_float_record() {
        let err = validate_layout(&files(2), 24, 25).unwrap_err().to_string();
        assert!(err.contains("/m/emb_vector"), "{err}");
    }

    #[test]
    fn wider_config_than_file_is_dimension_mismatch() {
        // 4 rows of 8 floats, configured as 16.
        let err = validate_layout(&files(16), 4 * 8, 4 * 8 * 4).unwrap_err();
        match err {
            hps_core::HpsError::ConfigError(ConfigError::DimensionMismatch {
                expected,
                actual,
                ..
            }) => {
                assert_eq!(expected, 16);
                assert_eq!(actual, 8);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_vector_rows_is_row_count_mismatch() {
        // 3 keys, 2 rows of dim 4: 8 floats do not divide over 3 keys.
        let err = validate_layout(&files(4), 3 * 8, 2 * 4 * 4).unwrap_err();
        assert!(matches!(
            err,
            hps_core::HpsError::LoadError(LoadError::RowCountMismatch {
                key_rows: 3,
                vector_rows: 2,
                ..
            })
        ));
    }

    #[test]
    fn vectors_without_keys_is_row_count_mismatch() {
        let err = validate_layout(&files(2), 0, 2 * 2 * 4).unwrap_err();
        assert!(matches!(
            err,
            hps_core::HpsError::LoadError(LoadError::RowCountMismatch { key_rows: 0, .. })
        ));
    }

    #[test]
    fn decode_keys_native_order() {
        let mut bytes = Vec::new();
        for k in [0i64, -1, i64::MAX] {
            bytes.extend_from_slice(&k.to_ne_bytes());
        }
        assert_eq!(decode_keys(&bytes), vec![0, -1, i64::MAX]);
    }
}
