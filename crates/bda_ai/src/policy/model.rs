use serde::{Deserialize, Serialize};

/// Plain document text plus an optional label (usually the file name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub text: String,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub ordinal: u32,
    /// Character offsets of the window the chunk was cut from.
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk_id: String,
    /// Insertion order within the index.
    pub seq: u64,
    pub text: String,
    pub text_sha256: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub chunk_id: String,
    pub seq: u64,
    pub score: f32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexStatus {
    pub chunk_count: usize,
    pub dims: Option<usize>,
    pub embedder: String,
    pub persisted: bool,
}
