// src/pages.rs

//! Page-aware chunking: concatenate pages, chunk once, map passages back.

use crate::chunker::{chunk_by_sections, chunk_text, paragraphs, title_prefix};
use crate::metadata::{Metadata, Passage};
use crate::DEFAULT_CHUNK_OVERLAP;
use serde::{Deserialize, Serialize};

/// Separator appended after every page in the concatenated buffer.
const PAGE_SEPARATOR: &str = "\n\n";

/// Text of one source page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based page number
    pub page: u32,
    pub text: String,
}

impl PageText {
    pub fn new(page: u32, text: impl Into<String>) -> Self {
        Self {
            page,
            text: text.into(),
        }
    }
}

/// Where a page begins in the concatenated document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMarker {
    /// Char offset into the concatenated text
    pub start_offset: usize,
    pub page_number: u32,
}

/// Concatenated page text plus the markers needed to map offsets back.
#[derive(Debug, Clone, Default)]
pub struct PageBuffer {
    pub text: String,
    pub markers: Vec<PageMarker>,
    /// Byte offset of each marker, parallel to `markers`
    byte_starts: Vec<usize>,
}

impl PageBuffer {
    /// Concatenate non-empty pages, each followed by a paragraph separator.
    pub fn build(pages: &[PageText]) -> Self {
        let mut buffer = Self::default();
        let mut chars = 0;

        for page in pages {
            let text = page.text.trim();
            if text.is_empty() {
                continue;
            }
            buffer.markers.push(PageMarker {
                start_offset: chars,
                page_number: page.page,
            });
            buffer.byte_starts.push(buffer.text.len());
            buffer.text.push_str(text);
            buffer.text.push_str(PAGE_SEPARATOR);
            chars += text.chars().count() + PAGE_SEPARATOR.len();
        }

        buffer
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Page of the last marker at or before `byte_pos`, defaulting to 1.
    fn page_at(&self, byte_pos: usize) -> u32 {
        let idx = self.byte_starts.partition_point(|&start| start <= byte_pos);
        idx.checked_sub(1)
            .map_or(1, |i| self.markers[i].page_number)
    }

    /// Attach a page number to every passage.
    ///
    /// Each passage body is located by searching forward from the previous
    /// match, so passages keep source order. A passage that cannot be found
    /// verbatim falls back to a running cursor advanced by passage length.
    pub fn attribute(&self, passages: &mut [Passage]) {
        let mut search_start = 0;
        let mut cursor = 0;

        for passage in passages.iter_mut() {
            let body = strip_title_prefix(passage);
            let probe = paragraphs(body).first().copied().unwrap_or(body);

            let found = if probe.is_empty() {
                None
            } else {
                self.text
                    .get(search_start..)
                    .and_then(|rest| rest.find(probe))
            };

            let position = match found {
                Some(found) => {
                    let pos = search_start + found;
                    search_start = pos + probe.chars().next().map_or(1, char::len_utf8);
                    cursor = pos + body.len();
                    pos
                }
                None => {
                    let pos = cursor.min(self.text.len());
                    cursor += body.len();
                    pos
                }
            };

            passage.metadata.page = Some(self.page_at(position));
        }
    }
}

fn strip_title_prefix(passage: &Passage) -> &str {
    passage
        .metadata
        .section_title
        .as_deref()
        .and_then(|title| passage.text.strip_prefix(title_prefix(title).as_str()))
        .unwrap_or(&passage.text)
}

/// Chunk a paged document and attribute each passage to its source page.
///
/// Page numbers below 1 are treated as page 1.
pub fn chunk_document_with_pages(
    pages: &[PageText],
    chunk_size: usize,
    use_smart_chunking: bool,
) -> Vec<Passage> {
    let pages: Vec<PageText> = pages
        .iter()
        .map(|p| PageText::new(p.page.max(1), p.text.as_str()))
        .collect();

    chunk_pages_with(&pages, |text| {
        if use_smart_chunking {
            chunk_by_sections(text, chunk_size, true, &Metadata::new())
        } else {
            chunk_text(text, chunk_size, DEFAULT_CHUNK_OVERLAP, &Metadata::new())
        }
    })
}

/// Concatenate `pages`, run `chunk_fn` once over the whole text, then map
/// each passage back to a page.
pub(crate) fn chunk_pages_with<F>(pages: &[PageText], chunk_fn: F) -> Vec<Passage>
where
    F: FnOnce(&str) -> Vec<Passage>,
{
    let buffer = PageBuffer::build(pages);
    if buffer.is_empty() {
        return Vec::new();
    }

    let mut passages = chunk_fn(&buffer.text);
    buffer.attribute(&mut passages);
    passages
}
