//! Indexing pipeline: scan, parse, chunk, embed and store documents.
//!
//! Each document is processed independently. A failure marks that document
//! failed and is counted, but never stops the rest of the batch.

use crate::config::{self, Config};
use crate::embedder::{embed_in_batches, Embedder};
use crate::parser::ParserRegistry;
use crate::scanner::{relative_folder, scan_directory, DocumentType, ScannedDocument};
use crate::storage::{DocumentFilter, DocumentRecord, DocumentStatus, JobStatus, DB};
use crate::vector_store::VectorStore;
use anyhow::{Context, Result};
use passage_chunker::{Chunker, Metadata};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Which documents an indexing run picks up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexMode {
    /// Pending and failed documents, plus any left processing by an
    /// interrupted run
    Resume,
    /// Every document, after moving indexed ones back to pending
    FullReindex,
    /// One file, whatever its status
    SingleFile(PathBuf),
}

/// Result of reconciling a scan with the documents table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub new: usize,
    pub updated: usize,
    pub total: usize,
}

/// Outcome of one document, reported to the progress callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentOutcome {
    pub document_id: String,
    pub filename: String,
    /// Passage count on success, error message on failure
    pub result: std::result::Result<usize, String>,
    /// Documents in the whole run
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexFailure {
    pub document_id: String,
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub job_id: Option<i64>,
    pub sync: SyncStats,
    /// Documents selected for processing
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub chunks: usize,
    pub failures: Vec<IndexFailure>,
    pub elapsed_secs: f64,
    pub dry_run: bool,
}

/// Drives documents from disk into the vector store.
pub struct Indexer {
    db: Arc<DB>,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    parsers: ParserRegistry,
    chunker: Chunker,
    scan_root: PathBuf,
    recursive: bool,
    batch_size: usize,
    max_file_bytes: u64,
    threads: Option<usize>,
}

impl Indexer {
    pub fn new(
        db: Arc<DB>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        chunker: Chunker,
    ) -> Self {
        Self {
            db,
            store,
            embedder,
            parsers: ParserRegistry::with_defaults(),
            chunker,
            scan_root: PathBuf::from(config::DEFAULT_SCAN_DIR),
            recursive: true,
            batch_size: config::DEFAULT_EMBEDDING_BATCH_SIZE,
            max_file_bytes: config::DEFAULT_MAX_FILE_MB * 1024 * 1024,
            threads: None,
        }
    }

    /// Build an indexer with every setting taken from `config`.
    pub fn from_config(
        config: &Config,
        db: Arc<DB>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        Ok(Self::new(db, store, embedder, config.chunker()?)
            .with_scan_root(config.scan_dir(), config.recursive())
            .with_batch_size(config.embedding_batch_size())
            .with_max_file_bytes(config.max_file_bytes())
            .with_threads(config.index_threads()))
    }

    pub fn with_parsers(mut self, parsers: ParserRegistry) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn with_scan_root(mut self, root: impl Into<PathBuf>, recursive: bool) -> Self {
        self.scan_root = root.into();
        self.recursive = recursive;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_file_bytes(mut self, bytes: u64) -> Self {
        self.max_file_bytes = bytes;
        self
    }

    /// Worker threads for `run`; `None` uses rayon's global pool.
    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads.filter(|&n| n > 0);
        self
    }

    pub fn db(&self) -> &DB {
        &self.db
    }

    /// Scan `root` and record every document found.
    ///
    /// Files that vanished from disk keep their rows.
    pub fn sync(&self, root: &Path, recursive: bool) -> Result<SyncStats> {
        let documents = scan_directory(root, recursive)?;
        self.record_scanned(&documents)
    }

    fn record_scanned(&self, documents: &[ScannedDocument]) -> Result<SyncStats> {
        let mut stats = SyncStats {
            total: documents.len(),
            ..Default::default()
        };
        for doc in documents {
            if self.db.upsert_document(doc)? {
                stats.new += 1;
            } else {
                stats.updated += 1;
            }
        }
        tracing::debug!(
            "Synced {} documents ({} new, {} updated)",
            stats.total,
            stats.new,
            stats.updated
        );
        Ok(stats)
    }

    /// Index one document and record the outcome in the documents table.
    ///
    /// Returns the number of passages stored.
    pub fn process_document(&self, doc: &ScannedDocument) -> Result<usize> {
        match self.index_document(doc) {
            Ok(chunks) => {
                self.db.mark_indexed(&doc.id, chunks)?;
                tracing::debug!("Indexed {} ({} passages)", doc.filename, chunks);
                Ok(chunks)
            }
            Err(e) => {
                let message = format!("{e:#}");
                tracing::warn!("Failed to index {}: {}", doc.filepath.display(), message);
                self.db.mark_failed(&doc.id, &message)?;
                if let Err(cleanup) = self.store.delete_document(&doc.id) {
                    tracing::warn!("Could not drop stale passages of {}: {cleanup:#}", doc.id);
                }
                Err(e)
            }
        }
    }

    fn index_document(&self, doc: &ScannedDocument) -> Result<usize> {
        let size = std::fs::metadata(&doc.filepath)
            .with_context(|| format!("Failed to stat {}", doc.filepath.display()))?
            .len();
        anyhow::ensure!(
            size <= self.max_file_bytes,
            "File is {} KB, over the {} KB limit",
            size.div_ceil(1024),
            self.max_file_bytes / 1024
        );

        self.db.update_status(&doc.id, DocumentStatus::Processing)?;

        let parsed = self.parsers.parse_as(&doc.filepath, doc.doc_type)?;
        tracing::debug!(
            "Parsed {}: {} pages, {} chars",
            doc.filename,
            parsed.pages.len(),
            parsed.text.chars().count()
        );

        let passages = self.chunker.chunk_pages(&parsed.pages, &document_metadata(doc))?;
        anyhow::ensure!(!passages.is_empty(), "no passages: document has no text");

        let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
        let embeddings = embed_in_batches(self.embedder.as_ref(), &texts, self.batch_size)?;
        self.store.upsert(&doc.id, &passages, &embeddings)?;

        Ok(passages.len())
    }

    /// Run an indexing pass without progress reporting.
    pub fn run(&self, mode: &IndexMode, dry_run: bool) -> Result<IndexStats> {
        self.run_with_progress(mode, dry_run, |_| {})
    }

    /// Run an indexing pass, calling `progress` after each document.
    ///
    /// With `dry_run` the documents are selected and counted but nothing is
    /// processed and no job row is written.
    pub fn run_with_progress<F>(
        &self,
        mode: &IndexMode,
        dry_run: bool,
        progress: F,
    ) -> Result<IndexStats>
    where
        F: Fn(&DocumentOutcome) + Sync,
    {
        let started = Instant::now();
        let (sync, documents) = self.select(mode, dry_run)?;

        let mut stats = IndexStats {
            sync,
            total: documents.len(),
            dry_run,
            ..Default::default()
        };
        if dry_run || documents.is_empty() {
            tracing::info!("{} documents to index", documents.len());
            stats.elapsed_secs = started.elapsed().as_secs_f64();
            return Ok(stats);
        }

        let job_id = self.db.create_job(documents.len())?;
        stats.job_id = Some(job_id);
        tracing::info!("Job {}: indexing {} documents", job_id, documents.len());

        let succeeded = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        let work = || -> Vec<DocumentOutcome> {
            documents
                .par_iter()
                .map(|doc| {
                    let result = self
                        .process_document(doc)
                        .map_err(|e| format!("{e:#}"));
                    let (ok, bad) = if result.is_ok() {
                        (
                            succeeded.fetch_add(1, Ordering::SeqCst) + 1,
                            failed.load(Ordering::SeqCst),
                        )
                    } else {
                        (
                            succeeded.load(Ordering::SeqCst),
                            failed.fetch_add(1, Ordering::SeqCst) + 1,
                        )
                    };
                    if let Err(e) = self.db.update_job_progress(job_id, ok, bad) {
                        tracing::warn!("Failed to update job {}: {e:#}", job_id);
                    }

                    let outcome = DocumentOutcome {
                        document_id: doc.id.clone(),
                        filename: doc.filename.clone(),
                        result,
                        total: documents.len(),
                    };
                    progress(&outcome);
                    outcome
                })
                .collect()
        };

        let outcomes = match self.threads {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .context("Failed to build indexing thread pool")?
                .install(work),
            None => work(),
        };

        for outcome in outcomes {
            match outcome.result {
                Ok(chunks) => {
                    stats.succeeded += 1;
                    stats.chunks += chunks;
                }
                Err(error) => {
                    stats.failed += 1;
                    stats.failures.push(IndexFailure {
                        document_id: outcome.document_id,
                        filename: outcome.filename,
                        error,
                    });
                }
            }
        }

        self.db
            .update_job_progress(job_id, stats.succeeded, stats.failed)?;
        let (status, error_log) = if stats.failures.is_empty() {
            (JobStatus::Completed, None)
        } else {
            (
                JobStatus::CompletedWithErrors,
                Some(serde_json::to_string(&stats.failures)?),
            )
        };
        self.db.finish_job(job_id, status, error_log.as_deref())?;

        stats.elapsed_secs = started.elapsed().as_secs_f64();
        tracing::info!(
            "Job {} finished: {} indexed, {} failed, {} passages in {:.1}s",
            job_id,
            stats.succeeded,
            stats.failed,
            stats.chunks,
            stats.elapsed_secs
        );
        Ok(stats)
    }

    /// Documents a run would process. A dry run neither syncs nor resets.
    fn select(&self, mode: &IndexMode, dry_run: bool) -> Result<(SyncStats, Vec<ScannedDocument>)> {
        let mut filter = DocumentFilter {
            statuses: vec![
                DocumentStatus::Pending,
                DocumentStatus::Failed,
                DocumentStatus::Processing,
            ],
            ..Default::default()
        };

        let sync = match mode {
            IndexMode::SingleFile(path) => return self.select_single(path, dry_run),
            _ if dry_run => SyncStats::default(),
            _ => self.sync(&self.scan_root, self.recursive)?,
        };

        if *mode == IndexMode::FullReindex {
            if dry_run {
                filter.statuses.clear();
            } else {
                let reset = self.db.reset_indexed_to_pending()?;
                tracing::debug!("Reset {} indexed documents to pending", reset);
            }
        }

        let documents = self
            .db
            .list_documents(&filter)?
            .iter()
            .map(DocumentRecord::to_scanned)
            .collect();
        Ok((sync, documents))
    }

    fn select_single(
        &self,
        path: &Path,
        dry_run: bool,
    ) -> Result<(SyncStats, Vec<ScannedDocument>)> {
        anyhow::ensure!(path.is_file(), "Not a file: {}", path.display());
        DocumentType::from_path(path)
            .with_context(|| format!("Unsupported file type: {}", path.display()))?;
        let filename = path
            .file_name()
            .with_context(|| format!("Not a file: {}", path.display()))?;

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        // Keep folders relative to the scan root when the file lives under it
        let mut documents = scan_directory(parent, false)?;
        for doc in &mut documents {
            if doc.filepath.starts_with(&self.scan_root) {
                doc.folder = relative_folder(&self.scan_root, &doc.filepath);
            }
        }
        let sync = if dry_run {
            SyncStats::default()
        } else {
            self.record_scanned(&documents)?
        };

        let target = parent.join(filename);
        let doc = documents
            .into_iter()
            .find(|d| d.filepath == target)
            .with_context(|| format!("Document not found: {}", target.display()))?;
        Ok((sync, vec![doc]))
    }
}

/// Metadata attached to every passage of `doc`.
fn document_metadata(doc: &ScannedDocument) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("document_id".to_string(), doc.id.as_str().into());
    metadata.insert("filename".to_string(), doc.filename.as_str().into());
    metadata.insert("folder".to_string(), doc.folder.clone().into());
    metadata.insert("type".to_string(), doc.doc_type.as_str().into());
    metadata
}
