use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("vector dimension mismatch: table stores {found}, embedder produces {expected}")]
    SchemaMismatch { expected: usize, found: usize },

    #[error("failed to encode vector: {0}")]
    VectorEncoding(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
