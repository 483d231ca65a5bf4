use std::path::PathBuf;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid stored embedding for topic {topic:?}: {len} bytes")]
    InvalidEmbedding { topic: String, len: usize },
}

/// Failures of the progress file. Any of these at load time is fatal.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("failed to read progress file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("progress file {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write progress file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize progress state: {0}")]
    Serialize(#[from] serde_json::Error),
}
