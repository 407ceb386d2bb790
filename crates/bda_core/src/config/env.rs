//! Environment variable overlay.
//!
//! Format: `BDA_<SECTION>_<FIELD>=value`, for example `BDA_RETRIEVAL_TOP_K=5` or
//! `BDA_RATE_LIMIT_ENABLED=false`. `BDA_ENVIRONMENT` sets the environment and the bare
//! `GROQ_API_KEY` supplies the LLM credential.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;

use super::{EmbeddingProvider, Environment, LlmProvider, Settings};

const PREFIX: &str = "BDA_";

// Longest first so `RATE_LIMIT_*` is not read as section `RATE`.
const SECTIONS: [&str; 9] = [
    "rate_limit",
    "embeddings",
    "retrieval",
    "chunking",
    "logging",
    "uploads",
    "paths",
    "cache",
    "llm",
];

/// Apply every recognised variable from `vars` onto `settings`. Unknown `BDA_` variables are
/// ignored with a warning; unparseable values are configuration errors.
pub fn apply_env_vars<I>(settings: &mut Settings, vars: I) -> Result<(), AppError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        if key == "GROQ_API_KEY" {
            let v = value.trim();
            if !v.is_empty() {
                settings.llm.api_key = Some(v.to_string());
            }
            continue;
        }
        let Some(rest) = key.strip_prefix(PREFIX) else {
            continue;
        };
        let rest = rest.to_lowercase();
        if rest == "environment" {
            settings.environment = parse_environment(&key, &value)?;
            continue;
        }

        let Some((section, field)) = split_section(&rest) else {
            tracing::warn!(var = %key, "ignoring unrecognised configuration variable");
            continue;
        };
        if !apply_field(settings, section, field, &key, &value)? {
            tracing::warn!(var = %key, "ignoring unrecognised configuration variable");
        }
    }
    Ok(())
}

fn split_section(rest: &str) -> Option<(&'static str, &str)> {
    SECTIONS.iter().find_map(|s| {
        rest.strip_prefix(s)
            .and_then(|r| r.strip_prefix('_'))
            .filter(|f| !f.is_empty())
            .map(|f| (*s, f))
    })
}

fn apply_field(
    settings: &mut Settings,
    section: &str,
    field: &str,
    key: &str,
    value: &str,
) -> Result<bool, AppError> {
    match (section, field) {
        ("paths", "data_dir") => settings.paths.data_dir = PathBuf::from(value),
        ("paths", "db_path") => settings.paths.db_path = Some(PathBuf::from(value)),
        ("paths", "vector_store_dir") => settings.paths.vector_store_dir = Some(PathBuf::from(value)),
        ("paths", "audit_log_path") => settings.paths.audit_log_path = Some(PathBuf::from(value)),

        ("chunking", "chunk_size") => settings.chunking.chunk_size = parse(key, value)?,
        ("chunking", "chunk_overlap") => settings.chunking.chunk_overlap = parse(key, value)?,

        ("retrieval", "top_k") => settings.retrieval.top_k = parse(key, value)?,
        ("retrieval", "similarity_threshold") => {
            settings.retrieval.similarity_threshold = parse(key, value)?
        }
        ("retrieval", "max_policy_chars") => settings.retrieval.max_policy_chars = parse(key, value)?,

        ("embeddings", "provider") => {
            settings.embeddings.provider = match value.trim().to_lowercase().as_str() {
                "hashing" => EmbeddingProvider::Hashing,
                "ollama" => EmbeddingProvider::Ollama,
                _ => return Err(invalid(key, value, "expected hashing or ollama")),
            }
        }
        ("embeddings", "model") => settings.embeddings.model = value.trim().to_string(),
        ("embeddings", "dims") => settings.embeddings.dims = parse(key, value)?,
        ("embeddings", "base_url") => settings.embeddings.base_url = value.trim().to_string(),
        ("embeddings", "timeout_secs") => settings.embeddings.timeout_secs = parse(key, value)?,

        ("llm", "provider") => {
            settings.llm.provider = match value.trim().to_lowercase().as_str() {
                "groq" => LlmProvider::Groq,
                "ollama" => LlmProvider::Ollama,
                "disabled" | "none" => LlmProvider::Disabled,
                _ => return Err(invalid(key, value, "expected groq, ollama or disabled")),
            }
        }
        ("llm", "model") => settings.llm.model = value.trim().to_string(),
        ("llm", "temperature") => settings.llm.temperature = parse(key, value)?,
        ("llm", "max_tokens") => settings.llm.max_tokens = parse(key, value)?,
        ("llm", "api_base") => settings.llm.api_base = value.trim().to_string(),
        ("llm", "ollama_base_url") => settings.llm.ollama_base_url = value.trim().to_string(),
        ("llm", "timeout_secs") => settings.llm.timeout_secs = parse(key, value)?,

        ("rate_limit", "enabled") => settings.rate_limit.enabled = parse_bool(key, value)?,
        ("rate_limit", "requests") => settings.rate_limit.requests = parse(key, value)?,
        ("rate_limit", "window_secs") => settings.rate_limit.window_secs = parse(key, value)?,

        ("cache", "enabled") => settings.cache.enabled = parse_bool(key, value)?,
        ("cache", "ttl_secs") => settings.cache.ttl_secs = parse(key, value)?,
        ("cache", "max_entries") => settings.cache.max_entries = parse(key, value)?,

        ("uploads", "max_upload_bytes") => settings.uploads.max_upload_bytes = parse(key, value)?,
        ("uploads", "allowed_extensions") => settings.uploads.allowed_extensions = value.to_string(),

        ("logging", "level") => settings.logging.level = value.trim().to_lowercase(),

        _ => return Ok(false),
    }
    Ok(true)
}

fn parse<T>(key: &str, value: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| invalid(key, value, &e.to_string()))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected a boolean")),
    }
}

fn parse_environment(key: &str, value: &str) -> Result<Environment, AppError> {
    match value.trim().to_lowercase().as_str() {
        "development" => Ok(Environment::Development),
        "staging" => Ok(Environment::Staging),
        "production" => Ok(Environment::Production),
        _ => Err(invalid(key, value, "expected development, staging or production")),
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> AppError {
    AppError::new("CONFIG_INVALID", "Invalid configuration environment variable")
        .with_details(format!("var={key}; value={value}; err={reason}"))
}
