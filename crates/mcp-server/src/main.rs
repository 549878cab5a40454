//! vector-index-mcp
//!
//! Long-running MCP server that maintains an always-current semantic index
//! over the files of a single project.
//!
//! ## Tools
//!
//! - `trigger_index` - run a full reconciliation scan (optionally forced)
//! - `search` - natural-language query over indexed chunks
//! - `get_status` - indexing state, scan timestamps, chunk count
//!
//! ## Usage
//!
//! ```bash
//! vector-index-mcp /path/to/project
//! ```
//!
//! Configuration is read from the environment (`LANCEDB_URI`,
//! `EMBEDDING_MODEL_NAME`, `IGNORE_PATTERNS`, `LOG_LEVEL`).

mod tools;

use anyhow::{Context, Result};
use rmcp::{transport::stdio, ServiceExt};
use std::path::PathBuf;
use std::sync::Arc;
use tools::VectorIndexService;
use vector_index_indexer::{FileWatcher, Indexer, Settings, StatusRegistry};
use vector_index_store::{FastEmbedder, TextEmbedder, VectorStore, DEFAULT_TABLE_NAME};

fn print_usage() {
    eprintln!("Usage: vector-index-mcp <project_path>");
    eprintln!();
    eprintln!("Serves MCP tools (trigger_index, search, get_status) over stdio for");
    eprintln!("a single project root.");
}

/// Returns the project path, or the process exit code for argument errors.
fn parse_args() -> Result<PathBuf, i32> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [flag] if flag == "--help" || flag == "-h" => {
            print_usage();
            Err(0)
        }
        [path] => Ok(PathBuf::from(path)),
        [] => {
            eprintln!("Error: project path not specified.");
            print_usage();
            Err(2)
        }
        _ => {
            eprintln!("Unknown arguments: {}", args.join(" "));
            print_usage();
            Err(2)
        }
    }
}

#[tokio::main]
async fn main() {
    // Logging goes to stderr only; stdout carries the MCP protocol.
    let default_level = std::env::var("LOG_LEVEL")
        .map(|level| level.to_lowercase())
        .unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    let project_path = match parse_args() {
        Ok(path) => path,
        Err(code) => std::process::exit(code),
    };

    if let Err(err) = run(project_path).await {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}

async fn run(project_path: PathBuf) -> Result<()> {
    let settings =
        Arc::new(Settings::from_env(&project_path).context("invalid configuration")?);
    log::info!("Serving project {}", settings.project_root.display());

    let embedder: Arc<dyn TextEmbedder> = Arc::new(
        FastEmbedder::load(&settings.embedding_model_name)
            .context("failed to load embedding model")?,
    );
    let store = Arc::new(
        VectorStore::open_or_create(
            &settings.database_uri,
            DEFAULT_TABLE_NAME,
            embedder.dimension(),
        )
        .context("failed to open vector store")?,
    );
    let status = Arc::new(StatusRegistry::new(&settings.project_root));
    let indexer = Arc::new(Indexer::new(settings, store, embedder, status.clone())?);

    let watcher = FileWatcher::start(indexer.clone())?;
    status.mark_ready();
    log::info!("Startup complete; request an initial scan via trigger_index");

    let service = VectorIndexService::new(indexer.clone());
    let server = service
        .serve(stdio())
        .await
        .context("failed to start MCP server")?;
    server.waiting().await?;

    log::info!("Shutting down");
    watcher.shutdown().await;
    indexer.shutdown().await;
    Ok(())
}
