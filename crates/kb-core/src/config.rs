//! Configuration loading for the knowledge base.
//!
//! Every table and key is optional; accessors fall back to the `DEFAULT_*`
//! constants below. Environment variables override file values through
//! [`Config::apply_env`].

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    pub paths: Option<PathsConfig>,
    pub chunking: Option<ChunkingConfig>,
    pub embedding: Option<EmbeddingConfig>,
    pub indexing: Option<IndexingConfig>,
    pub llm: Option<LlmConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PathsConfig {
    pub scan_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub recursive: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ChunkingConfig {
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub smart: Option<bool>,
    pub include_title_prefix: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct EmbeddingConfig {
    pub model: Option<String>,
    pub dimension: Option<usize>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct IndexingConfig {
    pub max_file_mb: Option<u64>,
    pub threads: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct LlmConfig {
    pub provider: Option<LlmProvider>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    Anthropic,
    /// No generator; answers fall back to a context excerpt
    #[serde(rename = "none")]
    Disabled,
}

impl std::str::FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "none" | "" => Ok(Self::Disabled),
            other => anyhow::bail!("Unknown LLM provider: {other}"),
        }
    }
}

pub const DEFAULT_SCAN_DIR: &str = "./documents";
pub const DEFAULT_DATA_DIR: &str = "./data";
/// Database file name inside the data directory
pub const DEFAULT_DB_FILE: &str = "knowledge.db";
/// Vector index file name inside the data directory
pub const DEFAULT_VECTOR_FILE: &str = "vectors.db";

pub const DEFAULT_CHUNK_SIZE: usize = passage_chunker::DEFAULT_CHUNK_SIZE;
pub const DEFAULT_CHUNK_OVERLAP: usize = passage_chunker::DEFAULT_CHUNK_OVERLAP;

pub const DEFAULT_EMBEDDING_MODEL: &str = "hashing-v1";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 32;

/// Files larger than this are skipped (50 MB)
pub const DEFAULT_MAX_FILE_MB: u64 = 50;

pub const DEFAULT_LLM_PROVIDER: LlmProvider = LlmProvider::Ollama;
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-haiku-20240307";
pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

impl Config {
    pub fn scan_dir(&self) -> PathBuf {
        self.paths
            .as_ref()
            .and_then(|p| p.scan_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCAN_DIR))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .as_ref()
            .and_then(|p| p.data_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    /// Bookkeeping database path. Defaults to `<data_dir>/knowledge.db`.
    pub fn db_path(&self) -> PathBuf {
        self.paths
            .as_ref()
            .and_then(|p| p.db_path.clone())
            .unwrap_or_else(|| self.data_dir().join(DEFAULT_DB_FILE))
    }

    pub fn vector_path(&self) -> PathBuf {
        self.data_dir().join(DEFAULT_VECTOR_FILE)
    }

    pub fn recursive(&self) -> bool {
        self.paths
            .as_ref()
            .and_then(|p| p.recursive)
            .unwrap_or(true)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunking
            .as_ref()
            .and_then(|c| c.chunk_size)
            .unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunking
            .as_ref()
            .and_then(|c| c.chunk_overlap)
            .unwrap_or(DEFAULT_CHUNK_OVERLAP)
    }

    pub fn smart_chunking(&self) -> bool {
        self.chunking.as_ref().and_then(|c| c.smart).unwrap_or(true)
    }

    pub fn include_title_prefix(&self) -> bool {
        self.chunking
            .as_ref()
            .and_then(|c| c.include_title_prefix)
            .unwrap_or(true)
    }

    /// Build a chunker from the `[chunking]` table.
    pub fn chunker(&self) -> Result<passage_chunker::Chunker> {
        passage_chunker::Chunker::builder()
            .chunk_size(self.chunk_size())
            .chunk_overlap(self.chunk_overlap())
            .smart(self.smart_chunking())
            .include_title_prefix(self.include_title_prefix())
            .build()
            .context("Invalid [chunking] configuration")
    }

    pub fn embedding_model(&self) -> String {
        self.embedding
            .as_ref()
            .and_then(|e| e.model.clone())
            .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string())
    }

    pub fn embedding_dimension(&self) -> usize {
        self.embedding
            .as_ref()
            .and_then(|e| e.dimension)
            .unwrap_or(DEFAULT_EMBEDDING_DIMENSION)
    }

    pub fn embedding_batch_size(&self) -> usize {
        self.embedding
            .as_ref()
            .and_then(|e| e.batch_size)
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_EMBEDDING_BATCH_SIZE)
    }

    /// Get maximum indexable file size in bytes.
    /// Returns configured value or default (50MB).
    pub fn max_file_bytes(&self) -> u64 {
        self.indexing
            .as_ref()
            .and_then(|i| i.max_file_mb)
            .unwrap_or(DEFAULT_MAX_FILE_MB)
            .saturating_mul(1024 * 1024)
    }

    /// Worker threads for indexing; `None` lets rayon decide.
    pub fn index_threads(&self) -> Option<usize> {
        self.indexing
            .as_ref()
            .and_then(|i| i.threads)
            .filter(|&n| n > 0)
    }

    pub fn llm_provider(&self) -> LlmProvider {
        self.llm
            .as_ref()
            .and_then(|l| l.provider)
            .unwrap_or(DEFAULT_LLM_PROVIDER)
    }

    pub fn llm_model(&self) -> String {
        let configured = self.llm.as_ref().and_then(|l| l.model.clone());
        configured.unwrap_or_else(|| match self.llm_provider() {
            LlmProvider::Anthropic => DEFAULT_ANTHROPIC_MODEL.to_string(),
            _ => DEFAULT_OLLAMA_MODEL.to_string(),
        })
    }

    pub fn llm_base_url(&self) -> String {
        let configured = self.llm.as_ref().and_then(|l| l.base_url.clone());
        configured.unwrap_or_else(|| match self.llm_provider() {
            LlmProvider::Anthropic => DEFAULT_ANTHROPIC_URL.to_string(),
            _ => DEFAULT_OLLAMA_URL.to_string(),
        })
    }

    pub fn llm_api_key(&self) -> Option<String> {
        self.llm
            .as_ref()
            .and_then(|l| l.api_key.clone())
            .filter(|k| !k.is_empty())
    }

    pub fn llm_timeout_secs(&self) -> u64 {
        self.llm
            .as_ref()
            .and_then(|l| l.timeout_secs)
            .unwrap_or(DEFAULT_LLM_TIMEOUT_SECS)
    }

    /// Apply `KB_*` and `ANTHROPIC_API_KEY` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (used by tests).
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = var("KB_SCAN_DIR") {
            self.paths.get_or_insert_with(Default::default).scan_dir = Some(dir.into());
        }
        if let Some(dir) = var("KB_DATA_DIR") {
            self.paths.get_or_insert_with(Default::default).data_dir = Some(dir.into());
        }
        if let Some(size) = var("KB_CHUNK_SIZE") {
            let size = size
                .trim()
                .parse()
                .with_context(|| format!("KB_CHUNK_SIZE is not a number: {size}"))?;
            self.chunking.get_or_insert_with(Default::default).chunk_size = Some(size);
        }
        if let Some(overlap) = var("KB_CHUNK_OVERLAP") {
            let overlap = overlap
                .trim()
                .parse()
                .with_context(|| format!("KB_CHUNK_OVERLAP is not a number: {overlap}"))?;
            self.chunking.get_or_insert_with(Default::default).chunk_overlap = Some(overlap);
        }
        if let Some(provider) = var("KB_LLM_PROVIDER") {
            self.llm.get_or_insert_with(Default::default).provider = Some(provider.parse()?);
        }
        if let Some(model) = var("KB_LLM_MODEL") {
            self.llm.get_or_insert_with(Default::default).model = Some(model);
        }
        if let Some(key) = var("ANTHROPIC_API_KEY") {
            self.llm.get_or_insert_with(Default::default).api_key = Some(key);
        }
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "kb").context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file as TOML: {}", path.display()))?;
    Ok(config)
}
