//! # Vector Index Indexer
//!
//! Keeps a local semantic index in sync with the files of one project.
//!
//! ## Pipeline
//!
//! ```text
//! Project root
//!     │
//!     ├──> FileScanner (ignore patterns, binary sniff)
//!     │        └─> eligible files
//!     ├──> Extractor (sha256 + overlapping chunks)
//!     │        └─> chunk texts
//!     └──> Indexer ──> Embedder (batch) ──> VectorStore (upsert / delete)
//!              ▲
//!              └── FileWatcher (debounced fs events)
//! ```
//!
//! Writes to the store serialize on the indexer's writer mutex; searches
//! and status reads run concurrently with them.

mod error;
mod extractor;
mod filter;
mod indexer;
mod scanner;
mod settings;
mod stats;
mod status;
mod watcher;

pub use error::{IndexerError, Result};
pub use extractor::{
    chunk_text, extract_chunks, hash_file, CHUNK_MAX_TOKENS, CHUNK_OVERLAP_TOKENS,
};
pub use filter::PathFilter;
pub use indexer::{FileOutcome, Indexer, SHUTDOWN_GRACE};
pub use scanner::FileScanner;
pub use settings::Settings;
pub use stats::ScanStats;
pub use status::{IndexState, ProjectStatus, StatusRegistry};
pub use watcher::{FileWatcher, FsEvent, DEBOUNCE_MS};
