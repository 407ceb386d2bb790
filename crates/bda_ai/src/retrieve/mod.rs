use std::sync::Arc;

use bda_core::config::RetrievalSettings;
use bda_core::error::AppError;

use crate::policy::{SearchHit, VectorIndex};

pub mod similarity;

/// Query layer over a [`VectorIndex`] with fixed top-k and threshold.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    top_k: usize,
    threshold: Option<f32>,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, top_k: usize, threshold: Option<f32>) -> Self {
        Self {
            index,
            top_k: top_k.max(1),
            threshold,
        }
    }

    pub fn from_settings(index: Arc<VectorIndex>, settings: &RetrievalSettings) -> Self {
        Self::new(index, settings.top_k, settings.threshold())
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Ranked chunk texts. An empty index answers without searching.
    pub fn retrieve(&self, query: &str) -> Result<Vec<String>, AppError> {
        Ok(self.retrieve_hits(query)?.into_iter().map(|h| h.text).collect())
    }

    pub fn retrieve_hits(&self, query: &str) -> Result<Vec<SearchHit>, AppError> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }
        self.index.similarity_search(query, self.top_k, self.threshold)
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("top_k", &self.top_k)
            .field("threshold", &self.threshold)
            .field("chunks", &self.index.count())
            .finish()
    }
}
