//! Embedding model wrapper built on fastembed (ONNX Runtime).

use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("unknown embedding model '{0}'")]
    UnknownModel(String),

    #[error("failed to initialize embedding model: {0}")]
    Init(String),

    #[error("failed to generate embeddings: {0}")]
    Embed(String),
}

/// Batched text-to-vector transformation.
///
/// The trait seam lets tests substitute a deterministic embedder for the
/// model-backed one.
pub trait TextEmbedder: Send + Sync {
    /// Embed a batch of document chunks; output order equals input order.
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Embed a search query, applying the model's query-side convention
    /// when it has one.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Output dimension D, constant for the lifetime of the process.
    fn dimension(&self) -> usize;
}

/// BGE-family models expect this instruction in front of queries (but not
/// in front of the indexed passages).
const BGE_QUERY_PREFIX: &str = "Represent this sentence for searching relevant passages: ";

/// fastembed-backed embedder; the model is loaded once per process.
pub struct FastEmbedder {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimension: usize,
    query_prefix: Option<&'static str>,
}

impl FastEmbedder {
    /// Resolve `model_name` and load the model, downloading it on first use.
    pub fn load(model_name: &str) -> Result<Self, EmbedderError> {
        let (model, dimension, query_prefix) = resolve_model(model_name)?;
        log::info!("Loading embedding model '{model_name}' (dimension {dimension})");

        let embedding =
            TextEmbedding::try_new(TextInitOptions::new(model).with_show_download_progress(false))
                .map_err(|e| EmbedderError::Init(e.to_string()))?;

        Ok(Self {
            model: Mutex::new(embedding),
            model_name: model_name.to_string(),
            dimension,
            query_prefix,
        })
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl TextEmbedder for FastEmbedder {
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut model = self.model.lock().unwrap();
        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        model
            .embed(text_refs, None)
            .map_err(|e| EmbedderError::Embed(e.to_string()))
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let query = match self.query_prefix {
            Some(prefix) => format!("{prefix}{text}"),
            None => text.to_string(),
        };

        let mut vectors = self.embed_documents(&[query])?;
        vectors
            .pop()
            .ok_or_else(|| EmbedderError::Embed("no embedding returned".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Map a configured model id onto fastembed's model enum plus its output
/// dimension and query convention. Hub-style prefixes
/// (`sentence-transformers/`, `BAAI/`) are accepted and stripped.
fn resolve_model(
    name: &str,
) -> Result<(EmbeddingModel, usize, Option<&'static str>), EmbedderError> {
    let trimmed = name.trim();
    let bare = trimmed
        .rsplit_once('/')
        .map_or(trimmed, |(_, tail)| tail)
        .to_ascii_lowercase();

    match bare.as_str() {
        "all-minilm-l6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384, None)),
        "all-minilm-l12-v2" => Ok((EmbeddingModel::AllMiniLML12V2, 384, None)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384, Some(BGE_QUERY_PREFIX))),
        "bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768, Some(BGE_QUERY_PREFIX))),
        "bge-large-en-v1.5" => Ok((EmbeddingModel::BGELargeENV15, 1024, Some(BGE_QUERY_PREFIX))),
        _ => Err(EmbedderError::UnknownModel(trimmed.to_string())),
    }
}
