// src/chunker/mod.rs

//! Passage builders: the size-bounded paragraph packer and the
//! section-aware builder layered on top of it.

mod packer;
mod section_aware;

pub use packer::{chunk_text, chunk_text_default, split_long_text};
pub use section_aware::{chunk_by_sections, chunk_by_sections_with_overlap};

pub(crate) use packer::{clamp_overlap, paragraphs};
pub(crate) use section_aware::title_prefix;
