//! # Vector Index Store
//!
//! Embedded vector table for the project index, plus the embedding model
//! that feeds it.
//!
//! ## Pipeline position
//!
//! ```text
//! Chunk texts ──> Embedder (batch) ──> f32 vectors
//!                                          │
//! Chunk records ──────────────────────────┴──> VectorStore (upsert / KNN search)
//! ```
//!
//! The store keeps one row per chunk in a SQLite table named after the
//! project index, with a `vec0` virtual table alongside it for k-NN search.

mod embedder;
mod error;
mod store;

pub use embedder::{EmbedderError, FastEmbedder, TextEmbedder};
pub use error::{Result, VectorStoreError};
pub use store::{ChunkRecord, EmbeddedChunk, SearchHit, VectorStore, DEFAULT_TABLE_NAME};
