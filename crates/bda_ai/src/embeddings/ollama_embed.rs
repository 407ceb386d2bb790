use std::time::Duration;

use bda_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::ollama::OllamaClient;

const MAX_INPUT_CHARS: usize = 12_000;

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
    timeout: Duration,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient, model: String, timeout: Duration) -> Self {
        Self {
            client,
            model,
            timeout,
        }
    }
}

#[derive(Serialize)]
struct EmbedBody<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedReply {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Cuts `input` to at most `max` chars on a char boundary.
fn clamp_chars(input: &str, max: usize) -> &str {
    input
        .char_indices()
        .nth(max)
        .map_or(input, |(idx, _)| &input[..idx])
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        let body = EmbedBody {
            model: &self.model,
            prompt: clamp_chars(input, MAX_INPUT_CHARS),
        };
        let reply: EmbedReply =
            self.client
                .post_json("/api/embeddings", &body, self.timeout, "EMBEDDINGS_FAILED")?;
        if reply.embedding.is_empty() {
            return Err(AppError::new("EMBEDDINGS_FAILED", "Embedding vector was empty")
                .with_details(format!("model={}", self.model)));
        }
        Ok(reply.embedding)
    }

    fn id(&self) -> String {
        format!("ollama:{}", self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_respects_char_boundaries() {
        assert_eq!(clamp_chars("héllo", 2), "hé");
        assert_eq!(clamp_chars("abc", 10), "abc");
        assert_eq!(clamp_chars("", 3), "");
    }
}
