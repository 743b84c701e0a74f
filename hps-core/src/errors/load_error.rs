use std::path::PathBuf;

/// Sparse table file errors. Always fatal at initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot access {}: {reason}", .path.display())]
    Io { path: PathBuf, reason: String },

    #[error(
        "{} is truncated: {len} bytes is not a whole number of {record_bytes}-byte records",
        .path.display()
    )]
    TruncatedRecord {
        path: PathBuf,
        len: u64,
        record_bytes: usize,
    },

    #[error(
        "row count mismatch: {} has {key_rows} keys but {} has {vector_rows} vectors",
        .key_path.display(),
        .vector_path.display()
    )]
    RowCountMismatch {
        key_path: PathBuf,
        key_rows: usize,
        vector_path: PathBuf,
        vector_rows: usize,
    },

    #[error("{} repeats key {key} at rows {first_row} and {second_row}", .path.display())]
    DuplicateKey {
        path: PathBuf,
        key: i64,
        first_row: usize,
        second_row: usize,
    },

    #[error("{} holds {rows} rows, more than the index can address", .path.display())]
    TooManyRows { path: PathBuf, rows: u64 },
}
