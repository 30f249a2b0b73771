// src/error.rs

use thiserror::Error;

/// Errors raised for invalid chunker configuration or malformed input.
///
/// Content-shape irregularities (empty text, oversized paragraphs, missing
/// headings) are never errors; they degrade to smaller or empty output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    /// A chunk size of zero can never make progress
    #[error("chunk size must be at least 1 character")]
    ZeroChunkSize,
    /// Page numbers are 1-based
    #[error("invalid page number {0}: pages are numbered from 1")]
    InvalidPageNumber(u32),
}
