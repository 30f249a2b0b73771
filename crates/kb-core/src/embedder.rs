//! Text embedding interface and the built-in feature-hashing embedder.

use anyhow::{Context, Result};
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Trait for embedding backends
///
/// Implementations must be shareable across indexing worker threads.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, in order.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Length of every vector this embedder produces
    fn dimension(&self) -> usize;

    /// Model identifier recorded alongside the index
    fn name(&self) -> &str;

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text])?
            .into_iter()
            .next()
            .context("Embedder returned no vector")
    }
}

/// Embed `texts` in batches of `batch_size`.
///
/// Fails if any batch returns a different number of vectors than inputs.
pub fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: &[&str],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let mut embeddings = Vec::with_capacity(texts.len());

    for (i, batch) in texts.chunks(batch_size).enumerate() {
        let vectors = embedder
            .embed(batch)
            .with_context(|| format!("Embedding batch {} failed", i + 1))?;
        anyhow::ensure!(
            vectors.len() == batch.len(),
            "Embedder returned {} vectors for {} texts",
            vectors.len(),
            batch.len()
        );
        embeddings.extend(vectors);
    }

    Ok(embeddings)
}

/// Seed separating word features from bigram features
const WORD_SEED: u64 = 0x6b62_776f_7264;
const BIGRAM_SEED: u64 = 0x6b62_6269_6772;

/// Deterministic feature-hashing embedder.
///
/// Hashes lowercase word unigrams and character bigrams into `dimension`
/// signed buckets and L2-normalizes the result. Bigrams make CJK text
/// without spaces comparable. Needs no model files, so it backs offline use
/// and tests.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    name: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            name: format!("hashing-{dimension}"),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimension];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.add_feature(&mut vector, word.as_bytes(), WORD_SEED, 1.0);
        }

        let chars: Vec<char> = lowered.chars().filter(|c| !c.is_whitespace()).collect();
        let mut buf = [0u8; 8];
        for pair in chars.windows(2) {
            let a = pair[0].encode_utf8(&mut buf[..4]).len();
            let b = pair[1].encode_utf8(&mut buf[a..]).len();
            self.add_feature(&mut vector, &buf[..a + b], BIGRAM_SEED, 0.5);
        }

        normalize(&mut vector);
        vector
    }

    fn add_feature(&self, vector: &mut [f32], bytes: &[u8], seed: u64, weight: f32) {
        let hash = xxh3_64_with_seed(bytes, seed);
        let bucket = (hash % self.dimension as u64) as usize;
        // High bit picks the sign so collisions cancel rather than pile up
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EMBEDDING_DIMENSION)
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Scale `vector` to unit length; the zero vector is left unchanged.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::cosine_similarity;

    #[test]
    fn test_hashing_embedder_shape_and_norm() {
        let embedder = HashingEmbedder::new(64);
        let vectors = embedder.embed(&["hello world", "", "第一章"]).unwrap();

        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.len() == 64));
        let norm: f32 = vectors[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        // Empty input stays the zero vector
        assert!(vectors[1].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::default();
        assert_eq!(
            embedder.embed_one("Rust ownership").unwrap(),
            embedder.embed_one("Rust ownership").unwrap()
        );
        assert_eq!(embedder.dimension(), 384);
        assert_eq!(embedder.name(), "hashing-384");
    }

    #[test]
    fn test_related_text_scores_higher() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed_one("how do I install the tool").unwrap();
        let related = embedder.embed_one("To install the tool, run the installer").unwrap();
        let unrelated = embedder.embed_one("Merge sort is a stable sorting algorithm").unwrap();

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_cjk_bigrams_match_without_spaces() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed_one("安裝步驟").unwrap();
        let related = embedder.embed_one("以下說明安裝步驟與設定").unwrap();
        let unrelated = embedder.embed_one("排序演算法的比較").unwrap();

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    struct ShortEmbedder;

    impl Embedder for ShortEmbedder {
        fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().skip(1).map(|_| vec![0.0]).collect())
        }
        fn dimension(&self) -> usize {
            1
        }
        fn name(&self) -> &str {
            "short"
        }
    }

    #[test]
    fn test_embed_in_batches_checks_counts() {
        let err = embed_in_batches(&ShortEmbedder, &["a", "b", "c"], 2).unwrap_err();
        assert!(err.to_string().contains("vectors for"));

        let embedder = HashingEmbedder::new(8);
        let texts = ["a", "b", "c", "d", "e"];
        let vectors = embed_in_batches(&embedder, &texts, 2).unwrap();
        assert_eq!(vectors.len(), 5);
        assert_eq!(vectors[4], embedder.embed_one("e").unwrap());
    }
}
