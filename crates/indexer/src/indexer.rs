//! Scan-and-reconcile orchestration over the store and embedder.

use crate::error::{IndexerError, Result};
use crate::extractor;
use crate::filter::PathFilter;
use crate::scanner::FileScanner;
use crate::settings::Settings;
use crate::stats::ScanStats;
use crate::status::{IndexState, StatusRegistry};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as TokioMutex;
use vector_index_store::{
    ChunkRecord, EmbeddedChunk, EmbedderError, SearchHit, TextEmbedder, VectorStore,
};

/// Delay before the single retry of a failed embedding batch.
const EMBED_RETRY_BACKOFF: Duration = Duration::from_millis(250);
/// How long shutdown waits for an in-flight write.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Outcome of indexing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Chunks were embedded and written.
    Indexed(usize),
    /// Stored hash matches the on-disk hash; nothing was written.
    Unchanged,
    /// Rows were removed (file deleted, ignored, or empty).
    Removed,
    /// Not eligible and nothing was stored for it.
    Skipped,
}

/// Orchestrates scans and single-file updates. Owns the writer mutex: any
/// operation that mutates the vector store holds it; searches do not.
pub struct Indexer {
    settings: Arc<Settings>,
    store: Arc<VectorStore>,
    embedder: Arc<dyn TextEmbedder>,
    status: Arc<StatusRegistry>,
    filter: PathFilter,
    write_lock: TokioMutex<()>,
    shutdown_requested: AtomicBool,
}

impl Indexer {
    pub fn new(
        settings: Arc<Settings>,
        store: Arc<VectorStore>,
        embedder: Arc<dyn TextEmbedder>,
        status: Arc<StatusRegistry>,
    ) -> Result<Self> {
        let filter = PathFilter::new(
            &settings.project_root,
            &settings.ignore_patterns,
            Some(&settings.database_uri),
        )?;

        Ok(Self {
            settings,
            store,
            embedder,
            status,
            filter,
            write_lock: TokioMutex::new(()),
            shutdown_requested: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.settings.project_root
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn status(&self) -> &StatusRegistry {
        &self.status
    }

    #[must_use]
    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    /// Re-index one file, holding the writer mutex around the store
    /// mutation.
    pub async fn index_file(&self, abs_path: &Path) -> Result<FileOutcome> {
        let _writer = self.write_lock.lock().await;
        self.index_file_locked(abs_path).await
    }

    async fn index_file_locked(&self, abs_path: &Path) -> Result<FileOutcome> {
        let Some(relative) = self.filter.relative(abs_path) else {
            return Ok(FileOutcome::Skipped);
        };

        if !self.filter.is_eligible(abs_path)? {
            // Stale rows for a now-ineligible path must still be removed.
            if self.store.file_state(&relative)?.is_some() {
                self.store.delete_for_file(&relative)?;
                log::info!("Removed index entries for ineligible file {relative}");
                return Ok(FileOutcome::Removed);
            }
            return Ok(FileOutcome::Skipped);
        }

        let (content_hash, mtime) = extractor::hash_file(abs_path)?;

        if let Some((stored_hash, _)) = self.store.file_state(&relative)? {
            if stored_hash == content_hash {
                log::debug!("No content change for {relative}; skipping re-embed");
                return Ok(FileOutcome::Unchanged);
            }
        }

        let chunks = extractor::extract_chunks(abs_path)?;
        if chunks.is_empty() {
            self.store.delete_for_file(&relative)?;
            log::debug!("{relative} produced no chunks; prior rows removed");
            return Ok(FileOutcome::Removed);
        }

        let vectors = self.embed_documents_with_retry(&chunks).await?;

        let total_chunks = chunks.len() as u32;
        let original_path = abs_path.display().to_string();
        let rows: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, (text, vector))| EmbeddedChunk {
                record: ChunkRecord {
                    document_id: format!("{relative}::{index}"),
                    file_path: relative.clone(),
                    content_hash: content_hash.clone(),
                    last_modified_timestamp: mtime,
                    chunk_index: index as u32,
                    total_chunks,
                    extracted_text_chunk: text,
                    original_path: original_path.clone(),
                },
                vector,
            })
            .collect();

        let written = rows.len();
        self.store.replace_file(&relative, &rows)?;
        log::info!("Indexed {written} chunks for {relative}");
        Ok(FileOutcome::Indexed(written))
    }

    /// Delete all rows for a project-relative path. Idempotent.
    pub async fn remove_file(&self, relative_path: &str) -> Result<usize> {
        let _writer = self.write_lock.lock().await;
        let removed = self.store.delete_for_file(relative_path)?;
        if removed > 0 {
            log::info!("Removed {removed} index entries for deleted file {relative_path}");
        }
        Ok(removed)
    }

    /// Full reconciliation between filesystem contents and index contents.
    /// Synchronous variant: the caller observes the result directly.
    pub async fn full_scan(&self, force: bool) -> Result<ScanStats> {
        self.status.begin_scan()?;
        self.scan_after_begin(force).await
    }

    /// Kick off a background full scan, refusing when one is in flight.
    /// Returns as soon as the `Scanning` state is claimed.
    pub fn spawn_full_scan(self: Arc<Self>, force: bool) -> Result<()> {
        self.status.begin_scan()?;
        tokio::spawn(async move {
            if let Err(err) = self.scan_after_begin(force).await {
                log::error!("Background scan failed: {err}");
            }
        });
        Ok(())
    }

    async fn scan_after_begin(&self, force: bool) -> Result<ScanStats> {
        log::info!(
            "Starting full scan of {} (force={force})",
            self.settings.project_root.display()
        );

        match self.run_scan(force).await {
            Ok(stats) => match self.store.count() {
                Ok(count) => {
                    self.status.finish_scan(count);
                    log::info!(
                        "Scan completed in {}ms: {} indexed, {} unchanged, {} removed, {} chunks total",
                        stats.time_ms,
                        stats.files_indexed,
                        stats.files_unchanged,
                        stats.files_removed,
                        count
                    );
                    Ok(stats)
                }
                Err(err) => {
                    self.status.set_error(err.to_string());
                    Err(err.into())
                }
            },
            Err(err) => {
                self.status.set_error(err.to_string());
                log::error!("Scan failed: {err}");
                Err(err)
            }
        }
    }

    async fn run_scan(&self, force: bool) -> Result<ScanStats> {
        let started = Instant::now();
        let mut stats = ScanStats::new();

        if force {
            let _writer = self.write_lock.lock().await;
            self.store.delete_all()?;
            log::info!("Force re-index: cleared existing index");
        }

        let index_state = self.store.scan_index_state()?;
        let files = FileScanner::new(&self.settings.project_root, &self.filter).scan();
        stats.files_seen = files.len();

        let mut store_retry_used = false;

        for abs_path in &files {
            if self.shutdown_requested.load(Ordering::Relaxed) {
                log::info!("Shutdown requested; stopping scan early");
                break;
            }

            match self.index_file(abs_path).await {
                Ok(outcome) => apply_outcome(&mut stats, outcome),
                Err(IndexerError::Store(err)) => {
                    if store_retry_used {
                        return Err(IndexerError::Store(err));
                    }
                    store_retry_used = true;
                    log::warn!(
                        "Store write failed for {}: {err}; retrying once",
                        abs_path.display()
                    );
                    let outcome = self.index_file(abs_path).await?;
                    apply_outcome(&mut stats, outcome);
                }
                Err(err) => {
                    // Per-file IO and embedding failures skip the file.
                    log::warn!("Skipping {}: {err}", abs_path.display());
                    stats.add_error(format!("{}: {err}", abs_path.display()));
                }
            }
        }

        // Removal closure: indexed paths that no longer exist on disk.
        let live: HashSet<String> = files
            .iter()
            .filter_map(|path| self.filter.relative(path))
            .collect();
        let mut stale: Vec<String> = index_state
            .keys()
            .filter(|path| !live.contains(*path))
            .cloned()
            .collect();
        stale.sort();

        for relative in &stale {
            if self.shutdown_requested.load(Ordering::Relaxed) {
                break;
            }
            match self.remove_file(relative).await {
                Ok(_) => stats.files_removed += 1,
                Err(IndexerError::Store(err)) if !store_retry_used => {
                    store_retry_used = true;
                    log::warn!("Delete failed for {relative}: {err}; retrying once");
                    self.remove_file(relative).await?;
                    stats.files_removed += 1;
                }
                Err(err) => return Err(err),
            }
        }

        stats.time_ms = started.elapsed().as_millis() as u64;
        Ok(stats)
    }

    /// Semantic query. Does not take the writer mutex; an empty table is an
    /// empty result, not an error.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        if self.status.state() == IndexState::Initializing {
            return Err(IndexerError::NotReady);
        }
        if self.store.count()? == 0 {
            return Ok(Vec::new());
        }

        let embedder = Arc::clone(&self.embedder);
        let query = query.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.embed_query(&query))
            .await
            .map_err(join_to_embed_error)??;

        Ok(self.store.search(&vector, top_k)?)
    }

    /// Current total chunk count.
    pub fn chunk_count(&self) -> Result<u64> {
        Ok(self.store.count()?)
    }

    /// Signal shutdown and wait for any in-flight write to finish.
    pub async fn shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Relaxed);
        match tokio::time::timeout(SHUTDOWN_GRACE, self.write_lock.lock()).await {
            Ok(_guard) => log::debug!("Writer drained; store can close"),
            Err(_) => log::warn!(
                "In-flight write did not finish within {}s",
                SHUTDOWN_GRACE.as_secs()
            ),
        }
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_requested.load(Ordering::Relaxed)
    }

    async fn embed_documents_with_retry(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>> {
        match self.embed_documents(chunks).await {
            Ok(vectors) => Ok(vectors),
            Err(err) => {
                log::warn!(
                    "Embedding batch failed: {err}; retrying in {}ms",
                    EMBED_RETRY_BACKOFF.as_millis()
                );
                tokio::time::sleep(EMBED_RETRY_BACKOFF).await;
                self.embed_documents(chunks).await
            }
        }
    }

    async fn embed_documents(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>> {
        let embedder = Arc::clone(&self.embedder);
        let texts = chunks.to_vec();
        let vectors = tokio::task::spawn_blocking(move || embedder.embed_documents(&texts))
            .await
            .map_err(join_to_embed_error)??;

        if vectors.len() != chunks.len() {
            return Err(IndexerError::Embed(EmbedderError::Embed(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            ))));
        }
        Ok(vectors)
    }
}

fn apply_outcome(stats: &mut ScanStats, outcome: FileOutcome) {
    match outcome {
        FileOutcome::Indexed(chunks) => {
            stats.files_indexed += 1;
            stats.chunks_indexed += chunks;
        }
        FileOutcome::Unchanged => stats.files_unchanged += 1,
        FileOutcome::Removed => stats.files_removed += 1,
        FileOutcome::Skipped => {}
    }
}

fn join_to_embed_error(err: tokio::task::JoinError) -> IndexerError {
    IndexerError::Embed(EmbedderError::Embed(format!(
        "embedding task failed: {err}"
    )))
}
