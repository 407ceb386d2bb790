use std::time::Duration;

use bda_core::error::AppError;
use serde::de::DeserializeOwned;
use serde::Serialize;

const HEALTH_TIMEOUT: Duration = Duration::from_millis(800);

/// Base URL holder for a local Ollama daemon.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
}

impl OllamaClient {
    /// Strictly limited to `127.0.0.1` with an optional valid port.
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let base_url = base_url.trim_end_matches('/').to_string();

        let rest = base_url.strip_prefix("http://127.0.0.1");
        let ok = match rest {
            Some("") => true,
            Some(r) => r
                .strip_prefix(':')
                .and_then(|port| port.parse::<u16>().ok())
                .is_some_and(|port| port != 0),
            None => false,
        };
        if !ok {
            return Err(AppError::new(
                "CONFIG_REMOTE_NOT_ALLOWED",
                "Ollama base URL must be localhost (127.0.0.1)",
            )
            .with_details(format!("base_url={base_url}")));
        }

        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn health_check(&self) -> Result<(), AppError> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = ureq::get(&url)
            .timeout(HEALTH_TIMEOUT)
            .call();

        match resp {
            Ok(r) if r.status() == 200 => Ok(()),
            Ok(r) => Err(
                AppError::new("GENERATION_OLLAMA_UNHEALTHY", "Ollama health check failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(e) => Err(AppError::new(
                "GENERATION_OLLAMA_UNREACHABLE",
                "Failed to reach Ollama on 127.0.0.1",
            )
            .with_details(e.to_string())
            .with_retryable(true)),
        }
    }

    /// POSTs `body` to `path` and decodes the reply; every failure carries `code`.
    pub(crate) fn post_json<B, R>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
        code: &str,
    ) -> Result<R, AppError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let payload = serde_json::to_value(body).map_err(|e| {
            AppError::new(code, "Failed to encode Ollama request").with_details(e.to_string())
        })?;

        let resp = match ureq::post(&url).timeout(timeout).send_json(payload) {
            Ok(r) => r,
            Err(ureq::Error::Status(status, _)) => {
                return Err(AppError::new(code, "Ollama returned an error status")
                    .with_details(format!("path={path} status={status}"))
                    .with_retryable(status >= 500));
            }
            Err(e) => {
                return Err(AppError::new(code, "Failed to reach Ollama on 127.0.0.1")
                    .with_details(e.to_string())
                    .with_retryable(true));
            }
        };
        if resp.status() != 200 {
            return Err(AppError::new(code, "Unexpected Ollama response")
                .with_details(format!("path={path} status={}", resp.status())));
        }
        resp.into_json().map_err(|e| {
            AppError::new(code, "Failed to decode Ollama response").with_details(e.to_string())
        })
    }
}
