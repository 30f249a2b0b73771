//! Search latency benchmarks
//!
//! Covers query embedding plus brute-force scoring against the vector store.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kb_core::{search, Embedder, HashingEmbedder, SearchOptions, SqliteVectorStore, VectorStore};
use passage_chunker::{Chunker, Metadata, PageText};

/// Generate a corpus of documents
fn generate_corpus(num_docs: usize, words_per_doc: usize) -> Vec<(String, String)> {
    let topics = [
        "rust programming language memory safety ownership",
        "python machine learning neural network tensorflow",
        "database sql query optimization indexing",
        "kubernetes docker container orchestration devops",
        "encryption security authentication authorization",
        "testing unit integration end to end automation",
    ];

    (0..num_docs)
        .map(|i| {
            let topic = topics[i % topics.len()];
            let mut content = format!("# Document {i}: {topic}\n\n");

            let words: Vec<&str> = topic.split_whitespace().collect();
            for _ in 0..(words_per_doc / 10) {
                for (j, word) in words.iter().enumerate() {
                    content.push_str(word);
                    content.push(' ');
                    if j % 5 == 4 {
                        content.push_str(". ");
                    }
                }
                content.push_str("\n\n");
            }

            (format!("doc{i}"), content)
        })
        .collect()
}

/// Build an in-memory store with every document chunked and embedded
fn setup_store(
    embedder: &HashingEmbedder,
    num_docs: usize,
    words_per_doc: usize,
) -> SqliteVectorStore {
    let store = SqliteVectorStore::in_memory().expect("Failed to create store");
    let chunker = Chunker::default();

    for (id, content) in generate_corpus(num_docs, words_per_doc) {
        let mut meta = Metadata::new();
        meta.insert("document_id".to_string(), id.as_str().into());
        let passages = chunker
            .chunk_pages(&[PageText::new(1, content)], &meta)
            .expect("Failed to chunk");
        let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
        let embeddings = embedder.embed(&texts).expect("Failed to embed");
        store
            .upsert(&id, &passages, &embeddings)
            .expect("Failed to store passages");
    }

    store
}

fn bench_search_corpus_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_corpus_size");
    group.sample_size(20);
    let embedder = HashingEmbedder::default();

    for num_docs in [10, 100, 500] {
        let store = setup_store(&embedder, num_docs, 500);
        let options = SearchOptions {
            top_k: 10,
            ..Default::default()
        };

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{num_docs}_docs")),
            &store,
            |b, store| {
                b.iter(|| {
                    let query = black_box("rust memory safety");
                    let results =
                        search(&embedder, store, query, &options).expect("Search failed");
                    black_box(results)
                });
            },
        );
    }

    group.finish();
}

fn bench_query_embedding(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_embedding");
    let embedder = HashingEmbedder::default();

    let queries = [
        ("short", "rust"),
        ("medium", "rust programming language"),
        (
            "long",
            "rust programming language memory safety ownership borrowing lifetimes type system",
        ),
        ("cjk", "向量資料庫的索引與查詢最佳化"),
    ];

    for (name, query) in queries {
        group.bench_with_input(BenchmarkId::from_parameter(name), query, |b, query| {
            b.iter(|| black_box(embedder.embed_one(black_box(query)).expect("Embed failed")));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_search_corpus_size, bench_query_embedding);
criterion_main!(benches);
