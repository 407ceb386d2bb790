use std::sync::Arc;
use std::time::Duration;

use bda_core::config::{LlmProvider, LlmSettings};
use bda_core::error::AppError;

use crate::ollama::OllamaClient;

pub mod groq;
pub mod ollama_llm;

pub use groq::GroqChat;
pub use ollama_llm::OllamaLlm;

pub trait ChatModel: Send + Sync {
    /// One completion for `prompt`. Implementations bound the call with a timeout.
    fn generate(&self, prompt: &str) -> Result<String, AppError>;

    fn model_name(&self) -> &str;
}

/// Whether a chat model can be used, decided once at startup.
#[derive(Clone)]
pub enum LlmState {
    Available(Arc<dyn ChatModel>),
    Unavailable(AppError),
}

impl LlmState {
    pub fn from_settings(settings: &LlmSettings) -> Self {
        connect(settings).into()
    }

    pub fn is_available(&self) -> bool {
        matches!(self, LlmState::Available(_))
    }
}

impl From<Result<Arc<dyn ChatModel>, AppError>> for LlmState {
    fn from(r: Result<Arc<dyn ChatModel>, AppError>) -> Self {
        match r {
            Ok(m) => LlmState::Available(m),
            Err(e) => LlmState::Unavailable(e),
        }
    }
}

impl std::fmt::Debug for LlmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmState::Available(m) => f.debug_tuple("Available").field(&m.model_name()).finish(),
            LlmState::Unavailable(e) => f.debug_tuple("Unavailable").field(&e.code).finish(),
        }
    }
}

/// Build the configured chat model. Errors are configuration errors and mean the deterministic
/// composer answers every request.
pub fn connect(settings: &LlmSettings) -> Result<Arc<dyn ChatModel>, AppError> {
    if settings.model.trim().is_empty() {
        return Err(AppError::new("CONFIG_INVALID", "llm.model cannot be empty"));
    }
    let timeout = Duration::from_secs(settings.timeout_secs.max(1));
    match settings.provider {
        LlmProvider::Disabled => Err(AppError::new(
            "CONFIG_LLM_DISABLED",
            "LLM provider is disabled by configuration",
        )),
        LlmProvider::Groq => {
            let key = settings
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .ok_or_else(|| {
                    AppError::new(
                        "CONFIG_MISSING_CREDENTIAL",
                        "GROQ_API_KEY not set in environment variables",
                    )
                })?;
            if !settings.api_base.starts_with("https://") && !settings.api_base.starts_with("http://") {
                return Err(AppError::new("CONFIG_INVALID", "llm.api_base must be an http(s) URL")
                    .with_details(format!("api_base={}", settings.api_base)));
            }
            Ok(Arc::new(GroqChat::new(
                settings.api_base.trim_end_matches('/').to_string(),
                key.to_string(),
                settings.model.clone(),
                settings.temperature,
                settings.max_tokens,
                timeout,
            )))
        }
        LlmProvider::Ollama => {
            let client = OllamaClient::new(&settings.ollama_base_url)?;
            Ok(Arc::new(OllamaLlm::new(client, settings.model.clone(), timeout)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_is_a_configuration_error() {
        let err = connect(&LlmSettings::default()).err().expect("should fail");
        assert_eq!(err.code, "CONFIG_MISSING_CREDENTIAL");

        let blank = LlmSettings {
            api_key: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(connect(&blank).err().expect("fail").code, "CONFIG_MISSING_CREDENTIAL");
    }

    #[test]
    fn disabled_provider_never_connects() {
        let s = LlmSettings {
            provider: LlmProvider::Disabled,
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        let state = LlmState::from_settings(&s);
        assert!(!state.is_available());
        match state {
            LlmState::Unavailable(e) => assert_eq!(e.code, "CONFIG_LLM_DISABLED"),
            LlmState::Available(_) => panic!("expected unavailable"),
        }
    }

    #[test]
    fn configured_providers_connect_without_network() {
        let groq = LlmSettings {
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        assert_eq!(connect(&groq).expect("groq").model_name(), "gemma2-9b-it");

        let ollama = LlmSettings {
            provider: LlmProvider::Ollama,
            model: "llama3.2".to_string(),
            ..Default::default()
        };
        assert_eq!(connect(&ollama).expect("ollama").model_name(), "llama3.2");
    }
}
