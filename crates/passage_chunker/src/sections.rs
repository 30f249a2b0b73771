// src/sections.rs

use crate::headings::detect_headings;
use serde::{Deserialize, Serialize};

/// A contiguous span of text delimited by detected headings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Heading title, `None` for untitled leading text or an empty marker
    pub title: Option<String>,
    /// 0 for untitled leading text, otherwise the heading level
    pub level: usize,
    /// Body with the heading line removed, trimmed
    pub content: String,
}

impl Section {
    fn untitled(content: &str) -> Self {
        Self {
            title: None,
            level: 0,
            content: content.trim().to_string(),
        }
    }
}

/// Partition `text` into sections at each detected heading.
///
/// Sections with empty content are returned as-is; dropping them is the
/// caller's concern.
pub fn split_by_headings(text: &str) -> Vec<Section> {
    let headings = detect_headings(text);

    let Some(first) = headings.first() else {
        return vec![Section::untitled(text)];
    };

    let mut sections = Vec::with_capacity(headings.len() + 1);

    let leading = text[..first.position].trim();
    if !leading.is_empty() {
        sections.push(Section::untitled(leading));
    }

    for (i, heading) in headings.iter().enumerate() {
        let end = headings
            .get(i + 1)
            .map_or(text.len(), |next| next.position);
        // A heading line never overlaps the next heading, but clamp in case a
        // caller hands us occurrences from a different text.
        let body_start = (heading.position + heading.raw_match.len()).min(end);

        sections.push(Section {
            title: (!heading.title.is_empty()).then(|| heading.title.clone()),
            level: heading.level,
            content: text[body_start..end].trim().to_string(),
        });
    }

    sections
}
