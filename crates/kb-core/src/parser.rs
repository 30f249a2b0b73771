//! Text extraction from supported document formats.
//!
//! Markdown and plain text are always available. PDF, DOCX and PPTX
//! parsers are compiled in with the `document-processing` feature.

use crate::scanner::DocumentType;
use passage_chunker::PageText;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Page separator used by plain-text exports of paged documents
const FORM_FEED: char = '\x0c';

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported file: {0}")]
    UnknownExtension(PathBuf),
    #[error("no parser registered for document type '{0}'")]
    UnsupportedType(DocumentType),
    #[error("failed to extract text from {path}: {message}")]
    Extraction { path: PathBuf, message: String },
}

impl ParseError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    #[cfg_attr(not(feature = "document-processing"), allow(dead_code))]
    fn extraction(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Extraction {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Document-level metadata reported by a parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    /// Page (or slide) count of the source
    pub pages: usize,
}

/// Parser output: full text plus per-page text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub text: String,
    pub pages: Vec<PageText>,
    pub metadata: DocumentInfo,
}

impl ParsedDocument {
    /// Build from per-page text; the full text joins non-empty pages.
    pub fn from_pages(pages: Vec<PageText>, metadata: DocumentInfo) -> Self {
        let text = pages
            .iter()
            .map(|p| p.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        Self {
            text,
            pages,
            metadata,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

pub trait DocumentParser: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, doc_type: DocumentType) -> bool;

    fn parse(&self, path: &Path) -> Result<ParsedDocument, ParseError>;
}

fn read_text(path: &Path) -> Result<String, ParseError> {
    let bytes = std::fs::read(path).map_err(|e| ParseError::io(path, e))?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!("{} is not valid UTF-8, decoding lossily", path.display());
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    })
}

/// Markdown: one page, title from the first `# ` line.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownParser;

impl DocumentParser for MarkdownParser {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn supports(&self, doc_type: DocumentType) -> bool {
        doc_type == DocumentType::Md
    }

    fn parse(&self, path: &Path) -> Result<ParsedDocument, ParseError> {
        let text = read_text(path)?;
        let title = text
            .lines()
            .find_map(|line| line.strip_prefix("# "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(ParsedDocument {
            pages: vec![PageText::new(1, text.clone())],
            text,
            metadata: DocumentInfo {
                title,
                author: None,
                pages: 1,
            },
        })
    }
}

/// Plain text: pages split on form feeds, otherwise a single page.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn name(&self) -> &'static str {
        "text"
    }

    fn supports(&self, doc_type: DocumentType) -> bool {
        doc_type == DocumentType::Txt
    }

    fn parse(&self, path: &Path) -> Result<ParsedDocument, ParseError> {
        let text = read_text(path)?;
        let pages = split_form_feeds(&text);
        let count = pages.len();

        Ok(ParsedDocument::from_pages(
            pages,
            DocumentInfo {
                pages: count,
                ..Default::default()
            },
        ))
    }
}

/// Split text into 1-based pages on form feed characters.
pub fn split_form_feeds(text: &str) -> Vec<PageText> {
    text.split(FORM_FEED)
        .zip(1u32..)
        .map(|(page_text, page)| PageText::new(page, page_text))
        .collect()
}

/// Maps document types to parsers.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: HashMap<DocumentType, Arc<dyn DocumentParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in parser compiled into this build.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MarkdownParser));
        registry.register(Arc::new(PlainTextParser));

        #[cfg(feature = "document-processing")]
        {
            registry.register(Arc::new(binary::PdfParser));
            registry.register(Arc::new(binary::DocxParser));
            registry.register(Arc::new(binary::PptxParser));
        }

        registry
    }

    /// Register `parser` for every type it supports, replacing earlier ones.
    pub fn register(&mut self, parser: Arc<dyn DocumentParser>) {
        for doc_type in DocumentType::ALL {
            if parser.supports(doc_type) {
                self.parsers.insert(doc_type, Arc::clone(&parser));
            }
        }
    }

    pub fn supports(&self, doc_type: DocumentType) -> bool {
        self.parsers.contains_key(&doc_type)
    }

    pub fn parse(&self, path: &Path) -> Result<ParsedDocument, ParseError> {
        let doc_type = DocumentType::from_path(path)
            .ok_or_else(|| ParseError::UnknownExtension(path.to_path_buf()))?;
        self.parse_as(path, doc_type)
    }

    pub fn parse_as(
        &self,
        path: &Path,
        doc_type: DocumentType,
    ) -> Result<ParsedDocument, ParseError> {
        let parser = self
            .parsers
            .get(&doc_type)
            .ok_or(ParseError::UnsupportedType(doc_type))?;
        tracing::debug!("Parsing {} with {} parser", path.display(), parser.name());
        parser.parse(path)
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.parsers.keys().map(DocumentType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("ParserRegistry").field("types", &types).finish()
    }
}

#[cfg(feature = "document-processing")]
mod binary {
    use super::{DocumentInfo, DocumentParser, ParseError, ParsedDocument};
    use crate::scanner::DocumentType;
    use passage_chunker::PageText;
    use std::path::Path;

    /// PDF via lopdf page-by-page, falling back to pdf_extract.
    pub struct PdfParser;

    impl DocumentParser for PdfParser {
        fn name(&self) -> &'static str {
            "pdf"
        }

        fn supports(&self, doc_type: DocumentType) -> bool {
            doc_type == DocumentType::Pdf
        }

        fn parse(&self, path: &Path) -> Result<ParsedDocument, ParseError> {
            let doc = lopdf::Document::load(path).map_err(|e| ParseError::extraction(path, e))?;
            let (title, author) = pdf_info(&doc);

            let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
            let mut pages: Vec<PageText> = page_numbers
                .iter()
                .map(|&n| {
                    let text = doc.extract_text(&[n]).unwrap_or_else(|e| {
                        tracing::debug!("Page {n} of {} failed: {e}", path.display());
                        String::new()
                    });
                    PageText::new(n, text)
                })
                .collect();

            if pages.iter().all(|p| p.text.trim().is_empty()) {
                tracing::debug!(
                    "lopdf returned no text for {}, trying pdf_extract",
                    path.display()
                );
                let text =
                    pdf_extract::extract_text(path).map_err(|e| ParseError::extraction(path, e))?;
                pages = super::split_form_feeds(&text);
            }

            let info = DocumentInfo {
                title,
                author,
                pages: page_numbers.len().max(pages.len()),
            };
            Ok(ParsedDocument::from_pages(pages, info))
        }
    }

    fn pdf_info(doc: &lopdf::Document) -> (Option<String>, Option<String>) {
        let info = doc
            .trailer
            .get(b"Info")
            .ok()
            .and_then(|obj| obj.as_reference().ok())
            .and_then(|id| doc.get_object(id).ok());

        let Some(lopdf::Object::Dictionary(dict)) = info else {
            return (None, None);
        };

        let get_string = |key: &[u8]| -> Option<String> {
            let lopdf::Object::String(bytes, _) = dict.get(key).ok()? else {
                return None;
            };
            // Try UTF-8 first, then Latin-1
            let value = String::from_utf8(bytes.clone())
                .unwrap_or_else(|_| bytes.iter().map(|&b| b as char).collect());
            Some(value.trim().to_string()).filter(|s| !s.is_empty())
        };

        (get_string(b"Title"), get_string(b"Author"))
    }

    /// DOCX has no page model; the whole body is page 1.
    pub struct DocxParser;

    impl DocumentParser for DocxParser {
        fn name(&self) -> &'static str {
            "docx"
        }

        fn supports(&self, doc_type: DocumentType) -> bool {
            doc_type == DocumentType::Docx
        }

        fn parse(&self, path: &Path) -> Result<ParsedDocument, ParseError> {
            let text = docx_lite::extract_text(path).map_err(|e| ParseError::extraction(path, e))?;
            Ok(ParsedDocument::from_pages(
                vec![PageText::new(1, text)],
                DocumentInfo {
                    pages: 1,
                    ..Default::default()
                },
            ))
        }
    }

    /// PPTX: one page per slide.
    pub struct PptxParser;

    impl DocumentParser for PptxParser {
        fn name(&self) -> &'static str {
            "pptx"
        }

        fn supports(&self, doc_type: DocumentType) -> bool {
            doc_type == DocumentType::Pptx
        }

        fn parse(&self, path: &Path) -> Result<ParsedDocument, ParseError> {
            use pptx_to_md::{ParserConfig, PptxContainer};

            let config = ParserConfig::builder().extract_images(false).build();
            let mut container =
                PptxContainer::open(path, config).map_err(|e| ParseError::extraction(path, e))?;
            let slides = container
                .parse_all()
                .map_err(|e| ParseError::extraction(path, e))?;

            let pages: Vec<PageText> = slides
                .iter()
                .zip(1u32..)
                .map(|(slide, n)| PageText::new(n, slide.convert_to_md().unwrap_or_default()))
                .collect();
            let info = DocumentInfo {
                pages: pages.len(),
                ..Default::default()
            };
            Ok(ParsedDocument::from_pages(pages, info))
        }
    }
}
