//! Document discovery under the scan directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Length of a document ID in hex characters
pub const DOCUMENT_ID_LEN: usize = 12;

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Md,
    Txt,
    Pdf,
    Pptx,
    Docx,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [Self::Md, Self::Txt, Self::Pdf, Self::Pptx, Self::Docx];

    /// Map a file extension (case-insensitive, without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Some(Self::Md),
            "txt" => Some(Self::Txt),
            "pdf" => Some(Self::Pdf),
            "pptx" => Some(Self::Pptx),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md => "md",
            Self::Txt => "txt",
            Self::Pdf => "pdf",
            Self::Pptx => "pptx",
            Self::Docx => "docx",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_extension(s).with_context(|| format!("Unknown document type: {s}"))
    }
}

/// A supported file found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedDocument {
    pub id: String,
    pub filename: String,
    pub filepath: PathBuf,
    /// Parent directory relative to the scan root, `None` at the root
    pub folder: Option<String>,
    pub doc_type: DocumentType,
    pub size_kb: u64,
}

/// Stable document ID: the first 12 hex chars of SHA-256 over the path.
pub fn document_id(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..DOCUMENT_ID_LEN].to_string()
}

/// Check if a directory should be skipped
pub fn should_skip_dir(name: &str) -> bool {
    const SKIP_DIRS: &[&str] = &[
        // Version control
        ".git",
        ".svn",
        ".hg",
        // IDEs and editors
        ".idea",
        ".vscode",
        // Package managers / dependencies
        "node_modules",
        "vendor",
        // Build outputs
        "target",
        "dist",
        "build",
        // Caches and virtualenvs
        "__pycache__",
        ".cache",
        ".venv",
        "venv",
        // Desktop metadata
        ".Trash",
        ".obsidian",
    ];

    SKIP_DIRS.contains(&name)
}

/// Walk `root` and collect every supported document.
///
/// A missing root yields an empty list. Results are sorted by path.
pub fn scan_directory(root: &Path, recursive: bool) -> Result<Vec<ScannedDocument>> {
    if !root.exists() {
        tracing::warn!("Scan directory does not exist: {}", root.display());
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    collect_files(root, recursive, &mut files)?;
    files.sort();

    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        let Some(doc_type) = DocumentType::from_path(&path) else {
            continue;
        };
        let size = std::fs::metadata(&path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();

        documents.push(ScannedDocument {
            id: document_id(&path),
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            folder: relative_folder(root, &path),
            filepath: path,
            doc_type,
            size_kb: (size + 512) / 1024,
        });
    }

    tracing::debug!("Scanned {} documents under {}", documents.len(), root.display());
    Ok(documents)
}

/// Parent directory of `path` relative to `root`, joined with "/".
pub fn relative_folder(root: &Path, path: &Path) -> Option<String> {
    let parent = path.strip_prefix(root).ok()?.parent()?;
    if parent.as_os_str().is_empty() {
        return None;
    }
    let parts: Vec<_> = parent
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Some(parts.join("/"))
}

fn collect_files(path: &Path, recursive: bool, files: &mut Vec<PathBuf>) -> Result<()> {
    if path.is_file() {
        if DocumentType::from_path(path).is_some() {
            files.push(path.to_path_buf());
        }
        return Ok(());
    }

    let entries = std::fs::read_dir(path)
        .with_context(|| format!("Failed to read directory: {}", path.display()))?;

    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let entry_path = entry.path();

        // Symlinked directories can point back at an ancestor
        if file_type.is_symlink() && entry_path.is_dir() {
            tracing::debug!("Skipping symlinked directory {}", entry_path.display());
            continue;
        }

        if file_type.is_dir() {
            let skip = entry_path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(should_skip_dir);
            if recursive && !skip {
                collect_files(&entry_path, recursive, files)?;
            }
        } else if entry_path.is_file() && DocumentType::from_path(&entry_path).is_some() {
            files.push(entry_path);
        }
    }

    Ok(())
}
