use std::sync::Arc;

use bda_core::config::{EmbeddingProvider, EmbeddingSettings};
use bda_core::error::AppError;

use crate::ollama::OllamaClient;

pub mod hashing;
pub mod ollama_embed;

pub use hashing::HashingEmbedder;
pub use ollama_embed::OllamaEmbedder;

pub trait Embedder: Send + Sync {
    fn embed(&self, input: &str) -> Result<Vec<f32>, AppError>;

    /// Stable identity of the vector space (provider, model, width). Vectors from embedders
    /// with different ids are not comparable.
    fn id(&self) -> String;
}

pub fn from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>, AppError> {
    match settings.provider {
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(settings.dims))),
        EmbeddingProvider::Ollama => {
            let client = OllamaClient::new(&settings.base_url)?;
            Ok(Arc::new(OllamaEmbedder::new(
                client,
                settings.model.clone(),
                std::time::Duration::from_secs(settings.timeout_secs),
            )))
        }
    }
}
