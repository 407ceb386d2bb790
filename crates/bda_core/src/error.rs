use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad failure classes. The code prefix of an [`AppError`] decides its kind, which in turn
/// decides whether the failure is shown to the user or absorbed by the deterministic path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Retrieval,
    Generation,
    Validation,
    IncompleteResponse,
    RateLimited,
    Storage,
    Other,
}

/// Single structured error shape used across the pipeline and the command line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        let code = self.code.as_str();
        if code.starts_with("CONFIG_") {
            ErrorKind::Configuration
        } else if code.starts_with("RETRIEVAL_")
            || code.starts_with("INDEX_")
            || code.starts_with("EMBEDDINGS_")
        {
            ErrorKind::Retrieval
        } else if code.starts_with("GENERATION_") {
            ErrorKind::Generation
        } else if code.starts_with("VALIDATION_") {
            ErrorKind::Validation
        } else if code == "INCOMPLETE_RESPONSE" {
            ErrorKind::IncompleteResponse
        } else if code == "RATE_LIMITED" {
            ErrorKind::RateLimited
        } else if code.starts_with("DB_") || code.starts_with("EXPORT_") || code.starts_with("INGEST_") {
            ErrorKind::Storage
        } else {
            ErrorKind::Other
        }
    }

    /// Only validation and rate-limit failures reach the user; everything on the generation
    /// path degrades to the rule-based answer instead.
    pub fn is_user_visible(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::RateLimited)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.details.as_deref() {
            Some(d) => write!(f, "[{}] {} ({})", self.code, self.message, d),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for AppError {}
