// src/chunker/packer.rs

use crate::metadata::{Metadata, Passage};
use crate::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

/// Joiner placed between packed paragraphs.
const PARAGRAPH_JOINER: &str = "\n\n";

/// Split-point families for oversized text, in priority order. The first
/// family with a match inside the window wins; within a family the
/// rightmost match wins.
const SEPARATOR_FAMILIES: &[&[&str]] = &[
    &["。", "！", "？"],
    &[". ", "! ", "? "],
    &["\n"],
    &["；", "; "],
];

static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n").expect("valid paragraph break regex"));

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Normalize a size budget: zero falls back to the default.
pub(crate) fn effective_chunk_size(chunk_size: usize) -> usize {
    if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    }
}

/// Clamp an overlap below the budget so splitting always advances.
pub(crate) fn clamp_overlap(chunk_size: usize, overlap: usize) -> usize {
    overlap.min(chunk_size.saturating_sub(1))
}

/// Split text into trimmed, non-empty paragraphs.
pub(crate) fn paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Greedy paragraph packer.
///
/// Accumulates paragraphs up to `chunk_size` characters (joiners included).
/// A paragraph larger than the budget is flushed on its own through
/// [`split_long_text`]. When a buffer is flushed and its last paragraph fits
/// in `chunk_overlap`, that paragraph seeds the next buffer.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    metadata: &Metadata,
) -> Vec<Passage> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chunk_size = effective_chunk_size(chunk_size);
    let chunk_overlap = clamp_overlap(chunk_size, chunk_overlap);

    let mut pieces: Vec<String> = Vec::new();
    let mut buffer = ParagraphBuffer::default();

    for para in paragraphs(text) {
        let para_len = char_len(para);

        if para_len > chunk_size {
            if let Some(flushed) = buffer.take() {
                pieces.push(flushed);
            }
            pieces.extend(split_long_text(para, chunk_size, chunk_overlap));
        } else if buffer.len_with(para_len) > chunk_size {
            let seed = buffer
                .last()
                .filter(|_| chunk_overlap > 0)
                .filter(|last| {
                    let seed_len = char_len(last);
                    seed_len <= chunk_overlap
                        && seed_len + PARAGRAPH_JOINER.len() + para_len <= chunk_size
                })
                .map(str::to_string);

            if let Some(flushed) = buffer.take() {
                pieces.push(flushed);
            }
            if let Some(seed) = seed {
                buffer.push(seed);
            }
            buffer.push(para);
        } else {
            buffer.push(para);
        }
    }

    if let Some(flushed) = buffer.take() {
        pieces.push(flushed);
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| Passage::new(i, piece, metadata))
        .collect()
}

/// [`chunk_text`] with the default overlap budget.
pub fn chunk_text_default(text: &str, chunk_size: usize, metadata: &Metadata) -> Vec<Passage> {
    chunk_text(text, chunk_size, DEFAULT_CHUNK_OVERLAP, metadata)
}

/// Split one oversized run of text into pieces of at most `chunk_size`
/// characters, preferring sentence and line boundaries.
///
/// Pieces cut at a boundary overlap the next piece by up to `overlap`
/// characters. A raw cut (no boundary in the window) starts the next piece
/// exactly at the cut.
pub fn split_long_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = effective_chunk_size(chunk_size);
    let overlap = clamp_overlap(chunk_size, overlap);

    // Byte offset of every char boundary, including the end of the text
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = offsets.len() - 1;

    let mut pieces = Vec::new();
    let mut start = 0;

    while start < total_chars {
        let end = start + chunk_size;
        if end >= total_chars {
            pieces.push(text[offsets[start]..].to_string());
            break;
        }

        let (split, at_boundary) = match find_split_point(text, &offsets, start, end) {
            Some(split) => (split, true),
            None => (end, false),
        };

        pieces.push(text[offsets[start]..offsets[split]].to_string());

        let next = if at_boundary && overlap > 0 {
            split.saturating_sub(overlap)
        } else {
            split
        };
        start = if next > start { next } else { split };
    }

    pieces
}

/// Char index just past the best separator in `[start, end)`, if any.
fn find_split_point(text: &str, offsets: &[usize], start: usize, end: usize) -> Option<usize> {
    let window_start = offsets[start];
    let window = &text[window_start..offsets[end]];

    for family in SEPARATOR_FAMILIES {
        let best = family
            .iter()
            .filter_map(|sep| {
                window
                    .rfind(sep)
                    .filter(|&pos| pos > 0)
                    .map(|pos| window_start + pos + sep.len())
            })
            .max();

        if let Some(byte_split) = best {
            // Separators end on a char boundary, so this lookup always hits
            if let Ok(split) = offsets.binary_search(&byte_split) {
                return Some(split);
            }
        }
    }

    None
}

/// Paragraph accumulator that tracks its joined length in characters.
#[derive(Default)]
struct ParagraphBuffer<'a> {
    parts: Vec<Cow<'a, str>>,
    chars: usize,
}

impl<'a> ParagraphBuffer<'a> {
    /// Joined length if a paragraph of `para_len` chars were appended.
    fn len_with(&self, para_len: usize) -> usize {
        if self.parts.is_empty() {
            para_len
        } else {
            self.chars + PARAGRAPH_JOINER.len() + para_len
        }
    }

    fn push(&mut self, para: impl Into<Cow<'a, str>>) {
        let para = para.into();
        self.chars = self.len_with(char_len(&para));
        self.parts.push(para);
    }

    fn last(&self) -> Option<&str> {
        self.parts.last().map(AsRef::as_ref)
    }

    fn take(&mut self) -> Option<String> {
        if self.parts.is_empty() {
            return None;
        }
        self.chars = 0;
        Some(std::mem::take(&mut self.parts).join(PARAGRAPH_JOINER))
    }
}
