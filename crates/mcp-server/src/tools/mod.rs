//! MCP tool surface: exactly three operations over the indexing core.

mod schemas;

use rmcp::handler::server::tool::{Parameters, ToolRouter};
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use schemas::{
    GetStatusRequest, SearchRequest, SearchResponse, SearchResultItem, TriggerIndexRequest,
    TriggerIndexResult,
};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use vector_index_indexer::{Indexer, IndexerError};

const MAX_TOP_K: usize = 100;
const DEFAULT_TOP_K: usize = 5;
/// Cap on searches running at once; writers are unaffected.
const MAX_CONCURRENT_SEARCHES: usize = 8;

/// Vector Index MCP service. Holds the constructed indexer; transports
/// dispatch onto the tool router without further state.
#[derive(Clone)]
pub struct VectorIndexService {
    indexer: Arc<Indexer>,
    search_permits: Arc<Semaphore>,
    tool_router: ToolRouter<Self>,
}

impl VectorIndexService {
    pub fn new(indexer: Arc<Indexer>) -> Self {
        Self {
            indexer,
            search_permits: Arc::new(Semaphore::new(MAX_CONCURRENT_SEARCHES)),
            tool_router: Self::tool_router(),
        }
    }

    fn is_served_root(&self, requested: &str) -> bool {
        let served = self.indexer.project_root();
        let candidate = Path::new(requested);
        candidate == served
            || candidate
                .canonicalize()
                .map(|resolved| resolved == served)
                .unwrap_or(false)
    }
}

#[tool_handler]
impl ServerHandler for VectorIndexService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Maintains an always-current semantic index over one project. Use 'trigger_index' to run a reconciliation scan, 'search' for natural-language queries over indexed chunks, and 'get_status' for indexing progress.".into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            ..Default::default()
        }
    }
}

#[tool_router]
impl VectorIndexService {
    /// Trigger the indexing process
    #[tool(
        description = "Trigger a full index scan of the project. Set force_reindex to clear and rebuild the index. Refused while a scan is already running."
    )]
    pub async fn trigger_index(
        &self,
        Parameters(request): Parameters<TriggerIndexRequest>,
    ) -> Result<CallToolResult, McpError> {
        let force = request.force_reindex.unwrap_or(false);

        let result = match self.indexer.clone().spawn_full_scan(force) {
            Ok(()) => TriggerIndexResult {
                accepted: true,
                reason: None,
            },
            Err(IndexerError::AlreadyScanning) => {
                // A conflict, not an error; the running scan is unaffected.
                log::debug!("trigger_index refused: scan in progress");
                TriggerIndexResult {
                    accepted: false,
                    reason: Some("scan in progress".to_string()),
                }
            }
            Err(err) => {
                log::error!("trigger_index failed: {err}");
                return Ok(error_result(format!("Error triggering indexing: {err}")));
            }
        };

        Ok(json_result(&result))
    }

    /// Search the vector index
    #[tool(
        description = "Search the project index with a natural-language query and return the most similar chunks."
    )]
    pub async fn search(
        &self,
        Parameters(request): Parameters<SearchRequest>,
    ) -> Result<CallToolResult, McpError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Ok(error_result("Query must not be empty"));
        }
        let top_k = request.top_k.unwrap_or(DEFAULT_TOP_K);
        if top_k == 0 || top_k > MAX_TOP_K {
            return Ok(error_result(format!(
                "top_k must be between 1 and {MAX_TOP_K}"
            )));
        }

        let _permit = self
            .search_permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| McpError::internal_error("search limiter closed", None))?;

        match self.indexer.search(query, top_k).await {
            Ok(hits) => {
                let response = SearchResponse {
                    results: hits.into_iter().map(SearchResultItem::from).collect(),
                };
                Ok(json_result(&response))
            }
            Err(IndexerError::NotReady) => {
                Ok(error_result("Index is not ready yet; retry after initialization"))
            }
            Err(err) => {
                log::error!("search failed: {err}");
                Ok(error_result(format!("Error performing search: {err}")))
            }
        }
    }

    /// Current indexing status
    #[tool(
        description = "Get the current indexing status: state, scan timestamps, indexed chunk count, and last error."
    )]
    pub async fn get_status(
        &self,
        Parameters(request): Parameters<GetStatusRequest>,
    ) -> Result<CallToolResult, McpError> {
        if let Some(requested) = request
            .project_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
        {
            if !self.is_served_root(requested) {
                return Ok(error_result(format!(
                    "No project indexed at '{requested}'"
                )));
            }
        }

        Ok(json_result(&self.indexer.status().snapshot()))
    }
}

fn json_result(payload: &impl serde::Serialize) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string(payload).unwrap_or_default(),
    )])
}

fn error_result(message: impl Into<String>) -> CallToolResult {
    CallToolResult::error(vec![Content::text(message.into())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;
    use vector_index_indexer::{IndexState, Settings, StatusRegistry};
    use vector_index_store::{
        EmbedderError, TextEmbedder, VectorStore, DEFAULT_TABLE_NAME,
    };

    const DIM: usize = 4;

    struct StubEmbedder;

    impl TextEmbedder for StubEmbedder {
        fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedderError> {
            Ok(texts.iter().map(|text| vector_for(text)).collect())
        }

        fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
            Ok(vector_for(text))
        }

        fn dimension(&self) -> usize {
            DIM
        }
    }

    fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = [0f32; DIM];
        for byte in text.bytes() {
            vector[(byte as usize) % DIM] += 1.0;
        }
        vector.to_vec()
    }

    fn service(dir: &TempDir) -> VectorIndexService {
        let root = dir.path().canonicalize().unwrap();
        let settings = Arc::new(Settings {
            project_root: root.clone(),
            database_uri: root.join(".lancedb"),
            embedding_model_name: "stub".to_string(),
            ignore_patterns: vec![".*".to_string()],
            log_level: "INFO".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
        });
        let store = Arc::new(
            VectorStore::open_or_create(&settings.database_uri, DEFAULT_TABLE_NAME, DIM).unwrap(),
        );
        let status = Arc::new(StatusRegistry::new(&root));
        let indexer = Arc::new(
            Indexer::new(settings, store, Arc::new(StubEmbedder), status.clone()).unwrap(),
        );
        status.mark_ready();
        VectorIndexService::new(indexer)
    }

    fn payload(result: &CallToolResult) -> serde_json::Value {
        let raw = serde_json::to_value(result).unwrap();
        let text = raw["content"][0]["text"].as_str().unwrap().to_string();
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn search_rejects_empty_queries_and_bad_top_k() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let result = service
            .search(Parameters(SearchRequest {
                query: "   ".to_string(),
                top_k: None,
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));

        for top_k in [0usize, 101] {
            let result = service
                .search(Parameters(SearchRequest {
                    query: "anything".to_string(),
                    top_k: Some(top_k),
                }))
                .await
                .unwrap();
            assert_eq!(result.is_error, Some(true));
        }
    }

    #[tokio::test]
    async fn search_on_empty_index_returns_empty_results() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let result = service
            .search(Parameters(SearchRequest {
                query: "anything".to_string(),
                top_k: Some(5),
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(false));
        assert_eq!(payload(&result)["results"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn trigger_index_conflicts_while_scanning() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha beta gamma").unwrap();
        let service = service(&dir);

        // Claim the scanning state the way a running scan would.
        service.indexer.status().begin_scan().unwrap();

        let result = service
            .trigger_index(Parameters(TriggerIndexRequest {
                force_reindex: Some(false),
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(false));
        let body = payload(&result);
        assert_eq!(body["accepted"], serde_json::json!(false));
        assert_eq!(body["reason"], serde_json::json!("scan in progress"));
    }

    #[tokio::test]
    async fn trigger_index_starts_a_background_scan() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha beta gamma").unwrap();
        let service = service(&dir);

        let result = service
            .trigger_index(Parameters(TriggerIndexRequest {
                force_reindex: None,
            }))
            .await
            .unwrap();
        assert_eq!(payload(&result)["accepted"], serde_json::json!(true));

        // The scan runs in the background; wait for it to land.
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            if service.indexer.status().state() == IndexState::Watching {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "scan never finished");
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(
            service.indexer.status().snapshot().indexed_chunk_count,
            Some(1)
        );
    }

    #[tokio::test]
    async fn get_status_rejects_other_roots() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let result = service
            .get_status(Parameters(GetStatusRequest {
                project_path: Some("/somewhere/else".to_string()),
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));

        let result = service
            .get_status(Parameters(GetStatusRequest {
                project_path: Some(
                    dir.path().canonicalize().unwrap().display().to_string(),
                ),
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(false));
        let body = payload(&result);
        assert_eq!(body["state"], serde_json::json!("IdleInitialScanRequired"));
    }
}
