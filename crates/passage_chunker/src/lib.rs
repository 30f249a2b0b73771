// src/lib.rs
//! # Passage Chunker
//!
//! Turns structurally noisy document text into bounded passages for
//! embedding and retrieval. Handles markup headings as well as CJK and Latin
//! chapter/section numbering, keeps the section title and source page of
//! every passage, and avoids mid-sentence cuts where a boundary exists.
//!
//! ## Pipeline
//!
//! 1. [`detect_headings`] finds structural markers.
//! 2. [`split_by_headings`] partitions the text into [`Section`]s.
//! 3. [`chunk_text`] greedily packs paragraphs under a character budget,
//!    sub-splitting oversized paragraphs with [`split_long_text`].
//! 4. [`chunk_by_sections`] runs the packer per section, prefixes passages
//!    with `"[title] "` and numbers them as one sequence.
//! 5. [`chunk_document_with_pages`] does the above over a paged document
//!    and maps every passage back to its page.
//!
//! ## Quick Start
//!
//! ```rust
//! use passage_chunker::{Chunker, Metadata};
//!
//! let chunker = Chunker::default();
//! let passages = chunker.chunk("# Title\n\nIntro para.\n\n## Sub\n\nBody para.", &Metadata::new());
//!
//! assert_eq!(passages[0].text, "[Title] Intro para.");
//! assert_eq!(passages[1].text, "[Sub] Body para.");
//! ```
//!
//! ## Custom configuration
//!
//! ```rust
//! use passage_chunker::{Chunker, Metadata, PageText};
//!
//! let chunker = Chunker::builder()
//!     .chunk_size(300)
//!     .chunk_overlap(30)
//!     .include_title_prefix(false)
//!     .build()
//!     .unwrap();
//!
//! let pages = vec![PageText::new(1, "first page"), PageText::new(2, "second page")];
//! let passages = chunker.chunk_pages(&pages, &Metadata::new()).unwrap();
//! assert_eq!(passages[0].metadata.page, Some(1));
//! ```

pub mod chunker;
pub mod error;
pub mod headings;
pub mod metadata;
pub mod pages;
pub mod sections;

pub use chunker::{
    chunk_by_sections, chunk_by_sections_with_overlap, chunk_text, chunk_text_default,
    split_long_text,
};
pub use error::ChunkError;
pub use headings::{detect_headings, HeadingOccurrence};
pub use metadata::{MetaValue, Metadata, Passage, PassageMetadata};
pub use pages::{chunk_document_with_pages, PageBuffer, PageMarker, PageText};
pub use sections::{split_by_headings, Section};

use std::borrow::Cow;

/// Default passage size budget, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default overlap budget between consecutive passages, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Configured entry point for chunking.
///
/// Normalizes line endings before dispatching to the section-aware builder
/// (`smart`) or the plain paragraph packer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    include_title_prefix: bool,
    smart: bool,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            include_title_prefix: true,
            smart: true,
        }
    }
}

impl Chunker {
    /// Create a builder for custom configuration.
    ///
    /// # Example
    ///
    /// ```rust
    /// use passage_chunker::{ChunkError, Chunker};
    ///
    /// let err = Chunker::builder().chunk_size(0).build().unwrap_err();
    /// assert_eq!(err, ChunkError::ZeroChunkSize);
    /// ```
    pub fn builder() -> ChunkerBuilder {
        ChunkerBuilder::new()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn is_smart(&self) -> bool {
        self.smart
    }

    /// Chunk one text blob. `metadata` is copied into every passage.
    pub fn chunk(&self, text: &str, metadata: &Metadata) -> Vec<Passage> {
        let text = normalize_line_endings(text);
        self.chunk_normalized(&text, metadata)
    }

    /// Chunk a paged document, attributing every passage to a page.
    ///
    /// Returns [`ChunkError::InvalidPageNumber`] for a page numbered 0.
    pub fn chunk_pages(
        &self,
        pages: &[PageText],
        metadata: &Metadata,
    ) -> Result<Vec<Passage>, ChunkError> {
        if let Some(bad) = pages.iter().find(|p| p.page == 0) {
            return Err(ChunkError::InvalidPageNumber(bad.page));
        }

        let pages: Vec<PageText> = pages
            .iter()
            .map(|p| PageText::new(p.page, normalize_line_endings(&p.text)))
            .collect();

        Ok(pages::chunk_pages_with(&pages, |text| {
            self.chunk_normalized(text, metadata)
        }))
    }

    fn chunk_normalized(&self, text: &str, metadata: &Metadata) -> Vec<Passage> {
        if self.smart {
            chunk_by_sections_with_overlap(
                text,
                self.chunk_size,
                self.chunk_overlap,
                self.include_title_prefix,
                metadata,
            )
        } else {
            chunk_text(text, self.chunk_size, self.chunk_overlap, metadata)
        }
    }
}

/// Builder for configuring a [`Chunker`].
#[derive(Debug, Clone)]
pub struct ChunkerBuilder {
    chunk_size: usize,
    chunk_overlap: usize,
    include_title_prefix: bool,
    smart: bool,
}

impl ChunkerBuilder {
    pub fn new() -> Self {
        let defaults = Chunker::default();
        Self {
            chunk_size: defaults.chunk_size,
            chunk_overlap: defaults.chunk_overlap,
            include_title_prefix: defaults.include_title_prefix,
            smart: defaults.smart,
        }
    }

    /// Maximum passage length in characters.
    ///
    /// Default: 500
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Characters carried from one passage into the next.
    ///
    /// Default: 50
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.chunk_overlap = overlap;
        self
    }

    /// Prefix passages with `"[section title] "`.
    ///
    /// Default: true
    pub fn include_title_prefix(mut self, include: bool) -> Self {
        self.include_title_prefix = include;
        self
    }

    /// Use heading-aware chunking instead of plain paragraph packing.
    ///
    /// Default: true
    pub fn smart(mut self, smart: bool) -> Self {
        self.smart = smart;
        self
    }

    pub fn build(self) -> Result<Chunker, ChunkError> {
        if self.chunk_size == 0 {
            return Err(ChunkError::ZeroChunkSize);
        }

        let chunk_overlap = chunker::clamp_overlap(self.chunk_size, self.chunk_overlap);
        if chunk_overlap != self.chunk_overlap {
            tracing::warn!(
                chunk_size = self.chunk_size,
                requested = self.chunk_overlap,
                clamped = chunk_overlap,
                "chunk overlap must be smaller than chunk size, clamping"
            );
        }

        Ok(Chunker {
            chunk_size: self.chunk_size,
            chunk_overlap,
            include_title_prefix: self.include_title_prefix,
            smart: self.smart,
        })
    }
}

impl Default for ChunkerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert CRLF and lone CR line endings to LF.
fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}
