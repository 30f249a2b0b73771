// tests/integration.rs

use passage_chunker::{
    chunk_by_sections, chunk_document_with_pages, chunk_text, detect_headings,
    split_by_headings, split_long_text, Chunker, MetaValue, Metadata, PageText,
};
use std::collections::HashSet;

fn heading_lines(text: &str) -> HashSet<String> {
    detect_headings(text)
        .into_iter()
        .map(|h| h.raw_match)
        .collect()
}

#[test]
fn test_course_notes_structure() {
    let markdown = include_str!("fixtures/course_notes.md");
    let sections = split_by_headings(markdown);

    let titles: Vec<_> = sections.iter().map(|s| s.title.as_deref()).collect();
    assert_eq!(
        titles,
        vec![
            None,
            Some("Programming Fundamentals"),
            Some("Functions"),
            Some("Data Structures"),
            Some("Algorithms"),
        ]
    );
    assert_eq!(sections[0].level, 0);
    assert_eq!(sections[1].level, 1);
    assert_eq!(sections[2].level, 2);
    assert_eq!(sections[3].level, 2);
}

#[test]
fn test_sections_reconstruct_source() {
    let markdown = include_str!("fixtures/course_notes.md");
    let headings = heading_lines(markdown);
    let sections = split_by_headings(markdown);
    let joined: String = sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    // Every non-heading line survives, in order
    let mut cursor = 0;
    for line in markdown.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if headings.contains(line) {
            continue;
        }
        let found = joined[cursor..]
            .find(line)
            .unwrap_or_else(|| panic!("line missing or out of order: {line}"));
        cursor += found + line.len();
    }

    // No heading marker leaks into a body
    for section in &sections {
        for heading in &headings {
            assert!(!section.content.contains(heading.as_str()));
        }
    }
}

#[test]
fn test_title_prefix_scenario() {
    let text = "# Title\n\nIntro para.\n\n## Sub\n\nBody para.";

    let sections = split_by_headings(text);
    assert_eq!(sections.len(), 2);
    assert!(sections.iter().all(|s| s.title.is_some()));

    let passages = chunk_by_sections(text, 1000, true, &Metadata::new());
    let texts: Vec<_> = passages.iter().map(|p| p.text.as_str()).collect();
    assert_eq!(texts, vec!["[Title] Intro para.", "[Sub] Body para."]);
}

#[test]
fn test_two_thousand_chars_without_terminators() {
    let text = "x".repeat(2000);

    let pieces = split_long_text(&text, 500, 50);
    assert_eq!(pieces.len(), 4);

    let passages = chunk_text(&text, 500, 50, &Metadata::new());
    assert_eq!(passages.len(), 4);
    for p in &passages {
        assert!(p.char_len() <= 500);
    }
    let total: usize = passages.iter().map(|p| p.char_len()).sum();
    // Adjacent pieces overlap by at most 50 chars
    assert!(total <= 2000 + 3 * 50);
}

#[test]
fn test_budget_respected_for_mixed_paragraphs() {
    let markdown = include_str!("fixtures/course_notes.md");
    for size in [40, 80, 150, 300] {
        for overlap in [0, 10, size / 2] {
            for p in chunk_text(markdown, size, overlap, &Metadata::new()) {
                assert!(
                    p.char_len() <= size,
                    "size={size} overlap={overlap}: {} chars",
                    p.char_len()
                );
            }
        }
    }
}

#[test]
fn test_index_contiguity() {
    let markdown = include_str!("fixtures/course_notes.md");
    let passages = chunk_by_sections(markdown, 120, true, &Metadata::new());
    let indices: Vec<_> = passages.iter().map(|p| p.index).collect();
    assert_eq!(indices, (0..passages.len()).collect::<Vec<_>>());

    let pages: Vec<_> = markdown
        .split("\n\n")
        .enumerate()
        .map(|(i, text)| PageText::new(i as u32 + 1, text))
        .collect();
    let passages = chunk_document_with_pages(&pages, 120, true);
    let indices: Vec<_> = passages.iter().map(|p| p.metadata.chunk_index).collect();
    assert_eq!(indices, (0..passages.len()).collect::<Vec<_>>());
}

#[test]
fn test_page_attribution_a_b() {
    let pages = vec![
        PageText::new(1, "A".repeat(100)),
        PageText::new(2, "B".repeat(100)),
    ];
    let passages = chunk_document_with_pages(&pages, 50, true);

    assert!(passages.iter().any(|p| p.metadata.page == Some(1)));
    assert!(passages.iter().any(|p| p.metadata.page == Some(2)));
    for p in &passages {
        let body: String = p.text.chars().filter(|c| !c.is_whitespace()).collect();
        if body.chars().all(|c| c == 'A') {
            assert_eq!(p.metadata.page, Some(1));
        }
        if body.chars().all(|c| c == 'B') {
            assert_eq!(p.metadata.page, Some(2));
        }
    }
}

#[test]
fn test_pages_with_sections_keep_titles_and_pages() {
    let pages = vec![
        PageText::new(1, "# Setup\n\nInstall the tool from the release page."),
        PageText::new(2, "Configure the scan directory in the config file."),
        PageText::new(3, "# Usage\n\nRun the index command, then search."),
    ];
    let passages = chunk_document_with_pages(&pages, 60, true);

    let by_text = |needle: &str| {
        passages
            .iter()
            .find(|p| p.text.contains(needle))
            .unwrap_or_else(|| panic!("no passage with {needle}"))
    };

    let install = by_text("Install the tool");
    assert_eq!(install.metadata.page, Some(1));
    assert_eq!(install.metadata.section_title.as_deref(), Some("Setup"));

    let configure = by_text("Configure the scan");
    assert_eq!(configure.metadata.page, Some(2));
    assert_eq!(configure.metadata.section_title.as_deref(), Some("Setup"));

    let run = by_text("Run the index");
    assert_eq!(run.metadata.page, Some(3));
    assert_eq!(run.metadata.section_title.as_deref(), Some("Usage"));
}

#[test]
fn test_chunker_attaches_caller_metadata() {
    let mut meta = Metadata::new();
    meta.insert("document_id".to_string(), "0123456789ab".into());
    meta.insert("filename".to_string(), "course_notes.md".into());
    meta.insert("folder".to_string(), MetaValue::Null);

    let chunker = Chunker::builder().chunk_size(200).build().unwrap();
    let pages = vec![PageText::new(1, include_str!("fixtures/course_notes.md"))];
    let passages = chunker.chunk_pages(&pages, &meta).unwrap();

    assert!(!passages.is_empty());
    for p in &passages {
        let stored = p.storable_metadata();
        assert_eq!(stored["document_id"], MetaValue::Text("0123456789ab".into()));
        assert_eq!(stored["page"], MetaValue::Int(1));
        assert!(!stored.contains_key("folder"));
    }
}

#[test]
fn test_degenerate_inputs_are_empty() {
    assert!(chunk_text("", 100, 10, &Metadata::new()).is_empty());
    assert!(chunk_by_sections("   ", 100, true, &Metadata::new()).is_empty());
    assert!(chunk_by_sections("# Only a heading", 100, true, &Metadata::new()).is_empty());
    assert!(chunk_document_with_pages(&[], 100, true).is_empty());
}
