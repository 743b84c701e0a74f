use std::path::PathBuf;

/// Configuration errors. Always fatal at initialization.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {reason}", .path.display())]
    ReadFailed { path: PathBuf, reason: String },

    #[error("cannot parse config {source_name}: {reason}")]
    ParseFailed { source_name: String, reason: String },

    #[error("no parameter server config: set `ps_config_file` or provide an inline config")]
    MissingPsConfig,

    #[error("invalid setting for {context}: {reason}")]
    Invalid { context: String, reason: String },

    #[error("table {table_id} of model '{model}' is declared more than once")]
    DuplicateTable { model: String, table_id: u32 },

    #[error(
        "table {table} declares embedding_vec_size={expected} but {} holds rows of {actual} floats",
        .file.display()
    )]
    DimensionMismatch {
        table: String,
        file: PathBuf,
        expected: usize,
        actual: usize,
    },
}
