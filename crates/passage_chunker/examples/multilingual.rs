use passage_chunker::{Chunker, Metadata, PageText};

fn main() {
    println!("=== Multilingual Chunking Examples ===\n");

    let chinese = r#"
第一章：系統概述

本系統負責掃描文件、建立索引並回答問題。所有內容都在本機處理。

一、功能特色

支援中文與英文混合內容。支援依資料夾篩選搜尋結果。

（一）搜尋

輸入問題後，系統會找出最相關的段落。
"#;

    let english = r#"
# User Guide

Start by pointing the scanner at your notes folder.

Chapter 2: Indexing

Indexing parses each file, splits it into passages and stores their vectors.

Section 3. Searching

Ask a question in plain language and read the cited passages.
"#;

    let chunker = Chunker::builder().chunk_size(120).build().unwrap_or_default();
    let metadata = Metadata::new();

    for (label, text) in [("Chinese", chinese), ("English", english)] {
        println!("--- {label} ---");
        for passage in chunker.chunk(text, &metadata) {
            println!(
                "#{} [{} chars] section={:?}\n{}\n",
                passage.index,
                passage.char_len(),
                passage.metadata.section_title,
                passage.text
            );
        }
    }

    println!("--- Paged document ---");
    let pages = vec![
        PageText::new(1, "# Overview\n\nThe first page introduces the project."),
        PageText::new(2, "The second page continues the overview."),
        PageText::new(3, "# Details\n\nThe third page starts a new section."),
    ];
    match chunker.chunk_pages(&pages, &metadata) {
        Ok(passages) => {
            for passage in passages {
                println!("page {:?}: {}", passage.metadata.page, passage.text);
            }
        }
        Err(e) => eprintln!("chunking failed: {e}"),
    }
}
