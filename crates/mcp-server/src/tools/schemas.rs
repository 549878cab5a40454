//! Request and response shapes for the three MCP tools.

use rmcp::schemars;
use serde::{Deserialize, Serialize};
use vector_index_store::SearchHit;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct TriggerIndexRequest {
    /// Clear the existing index before scanning (default: false)
    #[schemars(description = "If true, clear the existing index before scanning")]
    pub force_reindex: Option<bool>,
}

#[derive(Debug, Serialize, schemars::JsonSchema)]
pub struct TriggerIndexResult {
    /// Whether a background scan was started
    pub accepted: bool,
    /// Why the request was refused, when it was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchRequest {
    /// Natural language query
    #[schemars(description = "The search query text")]
    pub query: String,

    /// Maximum results (default: 5)
    #[schemars(description = "Number of top results to return (1-100)")]
    pub top_k: Option<usize>,
}

/// One search result: the chunk record minus its vector.
#[derive(Debug, Serialize, schemars::JsonSchema)]
pub struct SearchResultItem {
    pub document_id: String,
    pub file_path: String,
    pub content_hash: String,
    pub last_modified_timestamp: f64,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub extracted_text_chunk: String,
    pub metadata: FileMetadata,
}

#[derive(Debug, Serialize, schemars::JsonSchema)]
pub struct FileMetadata {
    /// Absolute path of the source file at index time
    pub original_path: String,
}

impl From<SearchHit> for SearchResultItem {
    fn from(hit: SearchHit) -> Self {
        let record = hit.record;
        Self {
            document_id: record.document_id,
            file_path: record.file_path,
            content_hash: record.content_hash,
            last_modified_timestamp: record.last_modified_timestamp,
            chunk_index: record.chunk_index,
            total_chunks: record.total_chunks,
            extracted_text_chunk: record.extracted_text_chunk,
            metadata: FileMetadata {
                original_path: record.original_path,
            },
        }
    }
}

#[derive(Debug, Serialize, schemars::JsonSchema)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetStatusRequest {
    /// Project path to report on; must match the served project root
    #[schemars(description = "Project path; must match the root this server was started with")]
    pub project_path: Option<String>,
}
