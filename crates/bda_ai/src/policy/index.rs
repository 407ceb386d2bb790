use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bda_core::error::AppError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::model::{EmbeddedChunk, IndexStatus, SearchHit};
use crate::embeddings::Embedder;
use crate::retrieve::similarity;

pub const MAX_K: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexFile {
    embedder: String,
    entries: Vec<EmbeddedChunk>,
}

/// JSON file under `<root>/index/`, replaced atomically on every write.
#[derive(Debug, Clone)]
struct IndexFileStore {
    root: PathBuf,
}

impl IndexFileStore {
    fn index_dir(&self) -> PathBuf {
        self.root.join("index")
    }

    fn entries_path(&self) -> PathBuf {
        self.index_dir().join("index_entries.json")
    }

    fn read(&self) -> Result<Option<IndexFile>, AppError> {
        let path = self.entries_path();
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|e| {
            AppError::new("INDEX_READ_FAILED", "Failed to read policy index")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            AppError::new("INDEX_CORRUPT", "Failed to decode policy index")
                .with_details(format!("path={}; err={}", path.display(), e))
        })
    }

    fn write(&self, file: &IndexFile) -> Result<(), AppError> {
        let dir = self.index_dir();
        fs::create_dir_all(&dir).map_err(|e| {
            AppError::new("INDEX_WRITE_FAILED", "Failed to create index directory")
                .with_details(format!("path={}; err={}", dir.display(), e))
        })?;
        let path = self.entries_path();
        let tmp = path.with_extension("tmp");
        let json = serde_json::to_vec(file).map_err(|e| {
            AppError::new("INDEX_WRITE_FAILED", "Failed to encode policy index")
                .with_details(e.to_string())
        })?;
        fs::write(&tmp, &json).map_err(|e| {
            AppError::new("INDEX_WRITE_FAILED", "Failed to write policy index")
                .with_details(format!("path={}; err={}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &path).map_err(|e| {
            AppError::new("INDEX_WRITE_FAILED", "Failed to finalize policy index write")
                .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
        })?;
        Ok(())
    }
}

/// Embedded policy chunks with cosine-similarity search.
///
/// Notes:
/// - Texts are embedded before any lock is taken.
/// - Searches share a read lock; only the final append takes the write lock, so a reader may
///   miss an in-flight add but never sees a partial one.
/// - Adds (and their persistence) are serialized by a separate writer mutex.
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<EmbeddedChunk>>,
    writer: Mutex<()>,
    store: Option<IndexFileStore>,
}

impl VectorIndex {
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
            writer: Mutex::new(()),
            store: None,
        }
    }

    /// Load the index persisted under `dir`, or start empty when none exists. An index built
    /// with a different embedder is rejected; rebuild it with [`VectorIndex::open_empty`].
    pub fn open(dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self, AppError> {
        let store = IndexFileStore {
            root: dir.to_path_buf(),
        };
        let entries = match store.read()? {
            Some(file) => {
                let id = embedder.id();
                if file.embedder != id {
                    return Err(AppError::new(
                        "INDEX_EMBEDDER_MISMATCH",
                        "Policy index was built with a different embedder; re-ingest with --clear",
                    )
                    .with_details(format!("index={}; configured={}", file.embedder, id)));
                }
                file.entries
            }
            None => Vec::new(),
        };
        Ok(Self {
            embedder,
            entries: RwLock::new(entries),
            writer: Mutex::new(()),
            store: Some(store),
        })
    }

    /// Like [`VectorIndex::open`] but discards whatever is on disk.
    pub fn open_empty(dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self, AppError> {
        let index = Self {
            embedder,
            entries: RwLock::new(Vec::new()),
            writer: Mutex::new(()),
            store: Some(IndexFileStore {
                root: dir.to_path_buf(),
            }),
        };
        index.clear()?;
        Ok(index)
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, Vec<EmbeddedChunk>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, Vec<EmbeddedChunk>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Embed and append `texts`. Blank strings are dropped; duplicates are kept. Returns the
    /// number of chunks added.
    pub fn add<S: AsRef<str>>(&self, texts: &[S]) -> Result<usize, AppError> {
        let texts: Vec<&str> = texts
            .iter()
            .map(|t| t.as_ref())
            .filter(|t| !t.trim().is_empty())
            .collect();
        if texts.is_empty() {
            return Ok(0);
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            let v = self.embedder.embed(text).map_err(|e| {
                AppError::new("EMBEDDINGS_FAILED", "Failed to compute embeddings")
                    .with_details(format!("chunk={i}; err={e}"))
                    .with_retryable(e.retryable)
            })?;
            vectors.push(v);
        }

        let _writer = self.lock_writer();
        let mut dims = self.read_entries().first().map(|e| e.embedding.len());
        for v in vectors.iter() {
            match dims {
                Some(d) if d != v.len() => {
                    return Err(AppError::new(
                        "INDEX_DIMS_MISMATCH",
                        "Embedding dimension mismatch across chunks",
                    )
                    .with_details(format!("expected={d}; got={}", v.len())));
                }
                Some(_) => {}
                None => dims = Some(v.len()),
            }
        }

        let base = self.read_entries().len() as u64;
        let new_entries: Vec<EmbeddedChunk> = texts
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (text, embedding))| {
                let seq = base + i as u64;
                EmbeddedChunk {
                    chunk_id: hex::encode(Sha256::digest(format!("{seq}:{text}").as_bytes())),
                    seq,
                    text: text.to_string(),
                    text_sha256: hex::encode(Sha256::digest(text.as_bytes())),
                    embedding,
                }
            })
            .collect();

        // Persist first so a failed write leaves memory and disk in agreement.
        if let Some(store) = self.store.as_ref() {
            let mut snapshot = self.read_entries().clone();
            snapshot.extend(new_entries.iter().cloned());
            store.write(&IndexFile {
                embedder: self.embedder.id(),
                entries: snapshot,
            })?;
        }

        let added = new_entries.len();
        self.write_entries().extend(new_entries);
        tracing::debug!(added, total = base as usize + added, "policy index updated");
        Ok(added)
    }

    /// Top `k` (clamped to 1..=50) entries by cosine similarity, best first, ties by insertion
    /// order. The threshold filter runs after the top-k cut, so it can only shrink the result.
    pub fn similarity_search(
        &self,
        query: &str,
        k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchHit>, AppError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let q = query.trim();
        if q.is_empty() {
            return Err(AppError::new("RETRIEVAL_QUERY_EMPTY", "Query must not be empty"));
        }
        let k = k.clamp(1, MAX_K);

        let qv = self.embedder.embed(q).map_err(|e| {
            AppError::new("EMBEDDINGS_FAILED", "Failed to embed query")
                .with_details(e.to_string())
                .with_retryable(e.retryable)
        })?;
        let qnorm = similarity::l2_norm(&qv);
        if qnorm == 0.0 {
            return Err(AppError::new("RETRIEVAL_FAILED", "Query embedding norm is zero"));
        }

        let mut hits: Vec<SearchHit> = Vec::new();
        {
            let entries = self.read_entries();
            for e in entries.iter() {
                if e.embedding.len() != qv.len() {
                    return Err(AppError::new(
                        "INDEX_DIMS_MISMATCH",
                        "Query embedding dims do not match index dims",
                    )
                    .with_details(format!(
                        "chunk_id={}; index_dims={}; query_dims={}",
                        e.chunk_id,
                        e.embedding.len(),
                        qv.len()
                    )));
                }
                let vnorm = similarity::l2_norm(&e.embedding);
                if vnorm == 0.0 {
                    continue;
                }
                hits.push(SearchHit {
                    chunk_id: e.chunk_id.clone(),
                    seq: e.seq,
                    score: similarity::cosine_similarity(&qv, &e.embedding, qnorm, vnorm),
                    text: e.text.clone(),
                });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.seq.cmp(&b.seq))
        });
        hits.truncate(k);
        if let Some(t) = score_threshold {
            hits.retain(|h| h.score >= t);
        }
        Ok(hits)
    }

    pub fn count(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn status(&self) -> IndexStatus {
        let entries = self.read_entries();
        IndexStatus {
            chunk_count: entries.len(),
            dims: entries.first().map(|e| e.embedding.len()),
            embedder: self.embedder.id(),
            persisted: self.store.is_some(),
        }
    }

    /// Drop every entry, on disk too when persisted.
    pub fn clear(&self) -> Result<(), AppError> {
        let _writer = self.lock_writer();
        if let Some(store) = self.store.as_ref() {
            store.write(&IndexFile {
                embedder: self.embedder.id(),
                entries: Vec::new(),
            })?;
        }
        self.write_entries().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;

    fn index() -> VectorIndex {
        VectorIndex::in_memory(Arc::new(HashingEmbedder::new(128)))
    }

    #[test]
    fn blank_texts_are_dropped_and_duplicates_kept() {
        let idx = index();
        let added = idx.add(&["refund policy", "  ", "refund policy"]).expect("add");
        assert_eq!(added, 2);
        assert_eq!(idx.count(), 2);
        let ids: Vec<String> = idx.read_entries().iter().map(|e| e.chunk_id.clone()).collect();
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn empty_index_search_is_empty_even_for_blank_query() {
        let idx = index();
        assert!(idx.similarity_search("", 3, None).expect("search").is_empty());
        assert!(idx.is_empty());
    }

    #[test]
    fn blank_query_on_populated_index_is_an_error() {
        let idx = index();
        idx.add(&["refund policy"]).expect("add");
        let err = idx.similarity_search("  ", 3, None).expect_err("should fail");
        assert_eq!(err.code, "RETRIEVAL_QUERY_EMPTY");
    }

    #[test]
    fn ranks_by_similarity() {
        let idx = index();
        idx.add(&[
            "travel expenses need receipts",
            "pricing changes require revenue review",
            "office plants are watered weekly",
        ])
        .expect("add");
        let hits = idx.similarity_search("revenue pricing", 2, None).expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "pricing changes require revenue review");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let idx = index();
        idx.add(&["same words here", "same words here", "same words here"]).expect("add");
        let seqs: Vec<u64> = idx
            .similarity_search("same words", 3, None)
            .expect("search")
            .iter()
            .map(|h| h.seq)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn clear_empties_the_index() {
        let idx = index();
        idx.add(&["a policy"]).expect("add");
        idx.clear().expect("clear");
        assert_eq!(idx.status().chunk_count, 0);
        assert_eq!(idx.status().dims, None);
    }
}
