use thiserror::Error;
use vector_index_store::{EmbedderError, VectorStoreError};

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid ignore pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("vector store error: {0}")]
    Store(#[from] VectorStoreError),

    #[error("embedding error: {0}")]
    Embed(#[from] EmbedderError),

    #[error("file watcher error: {0}")]
    Watcher(String),

    #[error("a scan is already in progress")]
    AlreadyScanning,

    #[error("index is not ready")]
    NotReady,

    #[error("system time error: {0}")]
    SystemTime(#[from] std::time::SystemTimeError),
}
