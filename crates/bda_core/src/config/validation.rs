use crate::error::AppError;

use super::{
    CacheSettings, ChunkingSettings, EmbeddingSettings, LlmSettings, RateLimitSettings,
    RetrievalSettings, Settings, UploadSettings,
};

/// Checks beyond what the type system enforces. Errors name the offending field.
pub trait Validate {
    fn validate(&self) -> Result<(), AppError>;
}

fn out_of_range(field: &str, value: impl std::fmt::Display, range: &str) -> AppError {
    AppError::new("CONFIG_INVALID", format!("{field} is out of range"))
        .with_details(format!("field={field}; value={value}; allowed={range}"))
}

fn check_usize(field: &str, value: usize, min: usize, max: usize) -> Result<(), AppError> {
    if !(min..=max).contains(&value) {
        return Err(out_of_range(field, value, &format!("{min}..={max}")));
    }
    Ok(())
}

fn check_f32(field: &str, value: f32, min: f32, max: f32) -> Result<(), AppError> {
    if !value.is_finite() || !(min..=max).contains(&value) {
        return Err(out_of_range(field, value, &format!("{min}..={max}")));
    }
    Ok(())
}

fn check_url(field: &str, value: &str) -> Result<(), AppError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(AppError::new("CONFIG_INVALID", format!("{field} must be an http(s) URL"))
            .with_details(format!("field={field}; value={value}")));
    }
    Ok(())
}

impl Validate for ChunkingSettings {
    fn validate(&self) -> Result<(), AppError> {
        check_usize("chunking.chunk_size", self.chunk_size, 100, 2000)?;
        check_usize("chunking.chunk_overlap", self.chunk_overlap, 0, 500)?;
        if self.chunk_overlap >= self.chunk_size {
            return Err(AppError::new(
                "CONFIG_INVALID",
                "chunking.chunk_overlap must be smaller than chunking.chunk_size",
            )
            .with_details(format!(
                "chunk_overlap={}; chunk_size={}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

impl Validate for RetrievalSettings {
    fn validate(&self) -> Result<(), AppError> {
        check_usize("retrieval.top_k", self.top_k, 1, 20)?;
        check_f32(
            "retrieval.similarity_threshold",
            self.similarity_threshold,
            -1.0,
            1.0,
        )?;
        if self.max_policy_chars < 500 {
            return Err(out_of_range(
                "retrieval.max_policy_chars",
                self.max_policy_chars,
                ">= 500",
            ));
        }
        Ok(())
    }
}

impl Validate for EmbeddingSettings {
    fn validate(&self) -> Result<(), AppError> {
        check_usize("embeddings.dims", self.dims, 8, 8192)?;
        if self.model.trim().is_empty() {
            return Err(AppError::new("CONFIG_INVALID", "embeddings.model cannot be empty"));
        }
        check_url("embeddings.base_url", &self.base_url)?;
        if self.timeout_secs == 0 {
            return Err(out_of_range("embeddings.timeout_secs", 0, ">= 1"));
        }
        Ok(())
    }
}

impl Validate for LlmSettings {
    fn validate(&self) -> Result<(), AppError> {
        if self.model.trim().is_empty() {
            return Err(AppError::new("CONFIG_INVALID", "llm.model cannot be empty"));
        }
        check_f32("llm.temperature", self.temperature, 0.0, 2.0)?;
        if !(100..=8192).contains(&self.max_tokens) {
            return Err(out_of_range("llm.max_tokens", self.max_tokens, "100..=8192"));
        }
        check_url("llm.api_base", &self.api_base)?;
        check_url("llm.ollama_base_url", &self.ollama_base_url)?;
        if self.timeout_secs == 0 {
            return Err(out_of_range("llm.timeout_secs", 0, ">= 1"));
        }
        Ok(())
    }
}

impl Validate for RateLimitSettings {
    fn validate(&self) -> Result<(), AppError> {
        if self.enabled {
            if self.requests == 0 {
                return Err(out_of_range("rate_limit.requests", 0, ">= 1"));
            }
            if self.window_secs == 0 {
                return Err(out_of_range("rate_limit.window_secs", 0, ">= 1"));
            }
        }
        Ok(())
    }
}

impl Validate for CacheSettings {
    fn validate(&self) -> Result<(), AppError> {
        if self.enabled && self.max_entries == 0 {
            return Err(out_of_range("cache.max_entries", 0, ">= 1"));
        }
        Ok(())
    }
}

impl Validate for UploadSettings {
    fn validate(&self) -> Result<(), AppError> {
        if self.max_upload_bytes == 0 {
            return Err(out_of_range("uploads.max_upload_bytes", 0, ">= 1"));
        }
        if self.allowed_extensions_list().is_empty() {
            return Err(AppError::new(
                "CONFIG_INVALID",
                "uploads.allowed_extensions must list at least one extension",
            ));
        }
        Ok(())
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<(), AppError> {
        self.chunking.validate()?;
        self.retrieval.validate()?;
        self.embeddings.validate()?;
        self.llm.validate()?;
        self.rate_limit.validate()?;
        self.cache.validate()?;
        self.uploads.validate()?;
        Ok(())
    }
}
