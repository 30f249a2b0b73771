//! Semantic search over the vector store.

use crate::embedder::Embedder;
use crate::vector_store::{SearchFilter, VectorHit, VectorStore};
use anyhow::Result;
use passage_chunker::MetaValue;
use serde::Serialize;

pub const DEFAULT_TOP_K: usize = 5;

/// Search parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Maximum number of results
    pub top_k: usize,
    /// Minimum cosine similarity; zero or less keeps everything
    pub threshold: f32,
    pub filter: SearchFilter,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            threshold: 0.0,
            filter: SearchFilter::default(),
        }
    }
}

/// A search hit with the passage's document context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub score: f32,
    pub page: Option<u32>,
    pub folder: Option<String>,
    pub filename: Option<String>,
    pub section_title: Option<String>,
    /// Set when no hit met the threshold and the best hits are returned anyway
    pub low_confidence: bool,
}

impl SearchResult {
    fn from_hit(hit: VectorHit, low_confidence: bool) -> Self {
        let text_field = |key: &str| {
            hit.metadata
                .get(key)
                .and_then(MetaValue::as_str)
                .map(str::to_string)
        };
        let page = hit
            .metadata
            .get("page")
            .and_then(MetaValue::as_i64)
            .and_then(|p| u32::try_from(p).ok());

        Self {
            folder: text_field("folder"),
            filename: text_field("filename"),
            section_title: text_field("section_title"),
            page,
            score: round_score(hit.score),
            chunk_id: hit.chunk_id,
            document_id: hit.document_id,
            chunk_index: hit.chunk_index,
            text: hit.text,
            low_confidence,
        }
    }
}

fn round_score(score: f32) -> f32 {
    (score * 10_000.0).round() / 10_000.0
}

/// Embed `query` and return the closest passages.
///
/// If a threshold filters out every hit, the unfiltered top results are
/// returned flagged `low_confidence` rather than nothing.
pub fn search(
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    query: &str,
    options: &SearchOptions,
) -> Result<Vec<SearchResult>> {
    let query = query.trim();
    anyhow::ensure!(!query.is_empty(), "Search query is empty");

    let embedding = embedder.embed_one(query)?;
    let hits = store.query(&embedding, options.top_k, &options.filter)?;
    tracing::debug!("Query {:?}: {} candidate passages", query, hits.len());

    let total = hits.len();
    let (kept, below): (Vec<_>, Vec<_>) = hits
        .into_iter()
        .partition(|hit| options.threshold <= 0.0 || hit.score >= options.threshold);

    if kept.is_empty() && total > 0 {
        tracing::debug!(
            "No passage reached threshold {}, returning best matches",
            options.threshold
        );
        return Ok(below
            .into_iter()
            .map(|hit| SearchResult::from_hit(hit, true))
            .collect());
    }

    Ok(kept
        .into_iter()
        .map(|hit| SearchResult::from_hit(hit, false))
        .collect())
}
