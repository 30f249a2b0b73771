//! kb-core: Core library for a personal knowledge base
//!
//! This crate provides:
//! - Document discovery and text extraction (Markdown, text, and PDF/DOCX/PPTX
//!   with the `document-processing` feature)
//! - An indexing pipeline that chunks documents with `passage_chunker`,
//!   embeds the passages and stores them in a SQLite vector store
//! - Bookkeeping of document status and indexing jobs
//! - Semantic search and LLM-backed question answering

pub mod answer;
pub mod config;
pub mod embedder;
pub mod parser;
pub mod pipeline;
pub mod scanner;
pub mod search;
pub mod storage;
pub mod vector_store;

// Re-exports
pub use answer::{
    answer, build_prompt, generator_from_config, Answer, AnswerGenerator, AnswerSource,
    AnthropicGenerator, OllamaGenerator,
};
pub use config::{default_config_path, load_config, Config, LlmProvider};
pub use embedder::{embed_in_batches, Embedder, HashingEmbedder};
pub use parser::{DocumentInfo, DocumentParser, ParseError, ParsedDocument, ParserRegistry};
pub use pipeline::{DocumentOutcome, IndexFailure, IndexMode, IndexStats, Indexer, SyncStats};
pub use scanner::{document_id, scan_directory, DocumentType, ScannedDocument};
pub use search::{search, SearchOptions, SearchResult};
pub use storage::{
    DocumentFilter, DocumentRecord, DocumentStatus, FolderStats, Job, JobStatus, StatusCounts,
    DB,
};
pub use vector_store::{
    cosine_similarity, SearchFilter, SqliteVectorStore, StoredChunk, VectorHit, VectorStore,
};

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

/// A document row with its tags and stored passages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentContent {
    pub document: DocumentRecord,
    pub tags: Vec<String>,
    pub chunks: Vec<StoredChunk>,
}

/// Open handles shared by the CLI commands.
pub struct KnowledgeBase {
    pub config: Config,
    pub db: Arc<DB>,
    pub store: Arc<SqliteVectorStore>,
    pub embedder: Arc<HashingEmbedder>,
}

impl KnowledgeBase {
    /// Open (creating if needed) the databases named by `config`.
    pub fn open(config: Config) -> Result<Self> {
        let model = config.embedding_model();
        anyhow::ensure!(
            model == config::DEFAULT_EMBEDDING_MODEL,
            "Unsupported embedding model '{model}' (available: {})",
            config::DEFAULT_EMBEDDING_MODEL
        );

        let db = Arc::new(DB::new(&config.db_path())?);
        let store = Arc::new(SqliteVectorStore::open(&config.vector_path())?);
        let embedder = Arc::new(HashingEmbedder::new(config.embedding_dimension()));
        tracing::debug!(
            "Opened knowledge base at {} (embedder {})",
            config.data_dir().display(),
            embedder.name()
        );
        Ok(Self {
            config,
            db,
            store,
            embedder,
        })
    }

    pub fn indexer(&self) -> Result<Indexer> {
        Indexer::from_config(
            &self.config,
            Arc::clone(&self.db),
            self.store.clone(),
            self.embedder.clone(),
        )
    }

    pub fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        search::search(self.embedder.as_ref(), self.store.as_ref(), query, options)
    }

    /// Look up a document with its tags and passages in index order.
    pub fn document_content(&self, id: &str) -> Result<Option<DocumentContent>> {
        let Some(document) = self.db.get_document(id)? else {
            return Ok(None);
        };
        Ok(Some(DocumentContent {
            tags: self.db.get_tags(id)?,
            chunks: self.store.document_chunks(id)?,
            document,
        }))
    }

    /// Remove a document's passages and bookkeeping row.
    ///
    /// Returns the number of passages removed, or `None` for an unknown ID.
    /// The file itself is untouched, so the next scan picks it up again.
    pub fn delete_document(&self, id: &str) -> Result<Option<usize>> {
        if self.db.get_document(id)?.is_none() {
            return Ok(None);
        }
        let removed = self
            .store
            .delete_document(id)
            .with_context(|| format!("Failed to delete passages of {id}"))?;
        self.db.delete_document(id)?;
        tracing::info!("Deleted document {id} ({removed} passages)");
        Ok(Some(removed))
    }

    /// Replace the tags of a document, returning the stored tags.
    pub fn set_document_tags(&self, id: &str, tags: &[String]) -> Result<Vec<String>> {
        anyhow::ensure!(self.db.get_document(id)?.is_some(), "Document not found: {id}");
        self.db.set_tags(id, tags)?;
        self.db.get_tags(id)
    }

    /// Remove one tag from a document, returning the remaining tags.
    pub fn remove_document_tag(&self, id: &str, tag: &str) -> Result<Vec<String>> {
        anyhow::ensure!(self.db.get_document(id)?.is_some(), "Document not found: {id}");
        let remaining: Vec<String> = self
            .db
            .get_tags(id)?
            .into_iter()
            .filter(|t| t != tag.trim())
            .collect();
        self.db.set_tags(id, &remaining)?;
        Ok(remaining)
    }

    /// Search, then answer from the hits with the configured generator.
    pub fn ask(&self, question: &str, top_k: usize) -> Result<Answer> {
        let options = SearchOptions {
            top_k,
            ..Default::default()
        };
        let results = self.search(question, &options)?;
        let generator = generator_from_config(&self.config);
        Ok(answer::answer(question, &results, generator.as_deref()))
    }
}
