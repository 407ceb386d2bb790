use std::time::Duration;

use bda_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::ChatModel;
use crate::ollama::OllamaClient;

/// Non-streaming `/api/generate` against a local Ollama daemon.
#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: OllamaClient,
    model: String,
    timeout: Duration,
}

impl OllamaLlm {
    pub fn new(client: OllamaClient, model: String, timeout: Duration) -> Self {
        Self {
            client,
            model,
            timeout,
        }
    }
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateReply {
    #[serde(default)]
    response: String,
}

impl ChatModel for OllamaLlm {
    fn generate(&self, prompt: &str) -> Result<String, AppError> {
        let body = GenerateBody {
            model: &self.model,
            prompt,
            stream: false,
        };
        let reply: GenerateReply =
            self.client
                .post_json("/api/generate", &body, self.timeout, "GENERATION_FAILED")?;
        if reply.response.trim().is_empty() {
            return Err(AppError::new("GENERATION_FAILED", "Model returned no text")
                .with_details(format!("model={}", self.model)));
        }
        Ok(reply.response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
