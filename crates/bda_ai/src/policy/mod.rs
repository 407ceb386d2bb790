use std::path::{Path, PathBuf};

use bda_core::error::AppError;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

pub mod chunking;
pub mod extract;
pub mod index;
pub mod model;

pub use chunking::{ChunkSplitter, Chunks};
pub use extract::{default_extractors, JsonExtractor, PlainTextExtractor, TextExtractor};
pub use index::VectorIndex;
pub use model::{Chunk, Document, EmbeddedChunk, IndexStatus, SearchHit};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct IngestReport {
    pub documents_loaded: usize,
    pub chunks_added: usize,
    pub skipped: Vec<SkippedFile>,
}

/// Every regular file under `dir`, depth first with entries sorted by name. Symlinks are
/// neither followed nor ingested.
fn walk_files(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            AppError::new("INGEST_READ_FAILED", "Failed to read policy directory")
                .with_details(format!("path={}; err={}", dir.display(), e))
        })?;
        if entry.file_type().is_file() {
            out.push(entry.into_path());
        }
    }
    Ok(out)
}

/// Load one document with the first extractor that supports it.
pub fn load_document(path: &Path, extractors: &[Box<dyn TextExtractor>]) -> Result<Document, AppError> {
    let extractor = extractors.iter().find(|x| x.supports(path)).ok_or_else(|| {
        AppError::new("INGEST_UNSUPPORTED", "Unsupported policy file type")
            .with_details(format!("path={}", path.display()))
    })?;
    Ok(Document {
        text: extractor.extract(path)?,
        source: path.file_name().map(|n| n.to_string_lossy().to_string()),
    })
}

/// Chunk and index every supported document under `dir`. Unreadable or unsupported files are
/// reported in [`IngestReport::skipped`]; embedding or index failures abort.
pub fn ingest_policy_dir(
    dir: &Path,
    splitter: &ChunkSplitter,
    extractors: &[Box<dyn TextExtractor>],
    index: &VectorIndex,
) -> Result<IngestReport, AppError> {
    if !dir.is_dir() {
        return Err(AppError::new("INGEST_DIR_NOT_FOUND", "Policy directory not found")
            .with_details(format!("path={}", dir.display())));
    }

    let mut report = IngestReport::default();
    let mut chunks: Vec<String> = Vec::new();
    for path in walk_files(dir)? {
        match load_document(&path, extractors) {
            Ok(doc) if doc.text.trim().is_empty() => {
                tracing::debug!(path = %path.display(), "skipping empty policy document");
            }
            Ok(doc) => {
                let before = chunks.len();
                chunks.extend(splitter.split_text(&doc.text));
                tracing::info!(
                    source = doc.source.as_deref().unwrap_or(""),
                    chars = doc.text.chars().count(),
                    chunks = chunks.len() - before,
                    "loaded policy document"
                );
                report.documents_loaded += 1;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), code = %e.code, "skipping policy file");
                report.skipped.push(SkippedFile {
                    path: path.display().to_string(),
                    code: e.code,
                    message: e.message,
                });
            }
        }
    }

    report.chunks_added = index.add(&chunks)?;
    Ok(report)
}
