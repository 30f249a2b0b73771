// src/chunker/section_aware.rs

use super::packer::{char_len, chunk_text, effective_chunk_size};
use crate::metadata::{Metadata, Passage};
use crate::sections::split_by_headings;
use crate::DEFAULT_CHUNK_OVERLAP;

/// Prefix prepended to passages of a titled section.
pub(crate) fn title_prefix(title: &str) -> String {
    format!("[{title}] ")
}

/// Split `text` by headings, pack each section, and number the passages
/// as one flat sequence.
///
/// Sections packed through [`chunk_text`] use the default overlap budget.
pub fn chunk_by_sections(
    text: &str,
    chunk_size: usize,
    include_title_prefix: bool,
    metadata: &Metadata,
) -> Vec<Passage> {
    chunk_by_sections_with_overlap(
        text,
        chunk_size,
        DEFAULT_CHUNK_OVERLAP,
        include_title_prefix,
        metadata,
    )
}

/// [`chunk_by_sections`] with an explicit overlap budget.
///
/// Overlap is applied only between passages of the same section.
pub fn chunk_by_sections_with_overlap(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    include_title_prefix: bool,
    metadata: &Metadata,
) -> Vec<Passage> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chunk_size = effective_chunk_size(chunk_size);
    let mut passages = Vec::new();
    let mut current_title: Option<String> = None;

    for section in split_by_headings(text) {
        if section.title.is_some() {
            current_title = section.title;
        }
        if section.content.is_empty() {
            continue;
        }

        let mut prefix = match (&current_title, include_title_prefix) {
            (Some(title), true) => title_prefix(title),
            _ => String::new(),
        };
        // A prefix that leaves no room for body text is dropped
        if char_len(&prefix) >= chunk_size {
            prefix.clear();
        }
        let budget = chunk_size - char_len(&prefix);

        let mut section_passages = if char_len(&section.content) <= budget {
            vec![Passage::new(0, section.content, metadata)]
        } else {
            chunk_text(&section.content, budget, chunk_overlap, metadata)
        };

        for passage in &mut section_passages {
            if !prefix.is_empty() {
                passage.text.insert_str(0, &prefix);
            }
            passage.metadata.section_title = current_title.clone();
            passage.metadata.section_level = Some(section.level);
        }
        passages.extend(section_passages);
    }

    for (i, passage) in passages.iter_mut().enumerate() {
        passage.set_index(i);
    }
    passages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(passages: &[Passage]) -> Vec<&str> {
        passages.iter().map(|p| p.text.as_str()).collect()
    }

    #[test]
    fn test_title_prefix_scenario() {
        let text = "# Title\n\nIntro para.\n\n## Sub\n\nBody para.";
        let passages = chunk_by_sections(text, 1000, true, &Metadata::new());

        assert_eq!(texts(&passages), vec!["[Title] Intro para.", "[Sub] Body para."]);
        assert_eq!(passages[0].metadata.section_title.as_deref(), Some("Title"));
        assert_eq!(passages[0].metadata.section_level, Some(1));
        assert_eq!(passages[1].metadata.section_level, Some(2));
    }

    #[test]
    fn test_without_prefix() {
        let text = "# Title\n\nIntro para.";
        let passages = chunk_by_sections(text, 1000, false, &Metadata::new());

        assert_eq!(texts(&passages), vec!["Intro para."]);
        assert_eq!(passages[0].metadata.section_title.as_deref(), Some("Title"));
    }

    #[test]
    fn test_empty_sections_dropped() {
        let text = "# Empty\n# Full\n\ncontent";
        let passages = chunk_by_sections(text, 1000, true, &Metadata::new());

        assert_eq!(texts(&passages), vec!["[Full] content"]);
        assert_eq!(passages[0].index, 0);
    }

    #[test]
    fn test_title_persists_across_untitled_marker() {
        let text = "# Guide\n\nintro\n\nChapter 2\n\nmore text";
        let passages = chunk_by_sections(text, 1000, true, &Metadata::new());

        assert_eq!(texts(&passages), vec!["[Guide] intro", "[Guide] more text"]);
        assert_eq!(passages[1].metadata.section_title.as_deref(), Some("Guide"));
        assert_eq!(passages[1].metadata.section_level, Some(2));
    }

    #[test]
    fn test_leading_untitled_section_has_no_prefix() {
        let text = "preface\n\n# Body\n\ntext";
        let passages = chunk_by_sections(text, 1000, true, &Metadata::new());

        assert_eq!(texts(&passages), vec!["preface", "[Body] text"]);
        assert_eq!(passages[0].metadata.section_title, None);
        assert_eq!(passages[0].metadata.section_level, Some(0));
    }

    #[test]
    fn test_oversized_section_packed_within_budget() {
        let body = (0..30)
            .map(|i| format!("Sentence number {i} in the body."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let text = format!("# Long Section\n\n{body}");
        let passages = chunk_by_sections(&text, 200, true, &Metadata::new());

        assert!(passages.len() > 1);
        for (i, p) in passages.iter().enumerate() {
            assert_eq!(p.index, i);
            assert_eq!(p.metadata.chunk_index, i);
            assert!(p.text.starts_with("[Long Section] "));
            assert!(p.char_len() <= 200, "{} chars", p.char_len());
        }
    }

    #[test]
    fn test_prefix_counts_against_budget() {
        let title = "A rather long heading for a tiny budget";
        let text = format!("# {title}\n\n{}", "word ".repeat(40));
        let passages = chunk_by_sections(&text, 50, true, &Metadata::new());

        assert!(passages.len() > 1);
        for p in &passages {
            assert!(p.text.starts_with(&format!("[{title}] ")));
            assert!(p.char_len() <= 50, "{} chars: {:?}", p.char_len(), p.text);
        }
    }

    #[test]
    fn test_prefix_wider_than_budget_is_dropped() {
        let text = format!("# {}\n\nshort body text", "T".repeat(40));
        let passages = chunk_by_sections(&text, 20, true, &Metadata::new());

        assert_eq!(texts(&passages), vec!["short body text"]);
        assert_eq!(passages[0].metadata.section_title, Some("T".repeat(40)));
    }

    #[test]
    fn test_indices_contiguous_across_sections() {
        let text = "# A\n\n".to_string()
            + &"alpha words here. ".repeat(20)
            + "\n\n# B\n\n"
            + &"beta words here. ".repeat(20);
        let passages = chunk_by_sections(&text, 100, true, &Metadata::new());

        let indices: Vec<_> = passages.iter().map(|p| p.index).collect();
        assert_eq!(indices, (0..passages.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_overlap_not_carried_across_sections() {
        let text = "# A\n\nshort a\n\n# B\n\nshort b";
        let passages = chunk_by_sections_with_overlap(text, 50, 20, false, &Metadata::new());

        assert_eq!(texts(&passages), vec!["short a", "short b"]);
    }
}
