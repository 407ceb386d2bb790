use std::fs;
use std::path::Path;

use crate::error::AppError;

pub const QUESTION_MIN_CHARS: usize = 5;
pub const QUESTION_MAX_CHARS: usize = 1000;
pub const POLICY_MAX_CHARS: usize = 100_000;
pub const INSIGHTS_MAX_CHARS: usize = 200_000;
pub const USER_ID_MAX_CHARS: usize = 100;

const UNSAFE_PATTERNS: [&str; 4] = ["<script", "javascript:", "onerror=", "onload="];

/// A missing or blank question is allowed; a default is used downstream.
pub fn validate_question(question: Option<&str>) -> Result<(), AppError> {
    let Some(q) = question.filter(|q| !q.trim().is_empty()) else {
        return Ok(());
    };
    let len = q.chars().count();
    if len < QUESTION_MIN_CHARS {
        return Err(AppError::new(
            "VALIDATION_QUESTION_TOO_SHORT",
            format!("Question is too short (minimum {QUESTION_MIN_CHARS} characters)"),
        ));
    }
    if len > QUESTION_MAX_CHARS {
        return Err(AppError::new(
            "VALIDATION_QUESTION_TOO_LONG",
            format!("Question is too long (maximum {QUESTION_MAX_CHARS} characters)"),
        )
        .with_details(format!("chars={len}")));
    }
    let lower = q.to_lowercase();
    if let Some(p) = UNSAFE_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(AppError::new(
            "VALIDATION_QUESTION_UNSAFE",
            "Question contains potentially unsafe content",
        )
        .with_details(format!("pattern={p}")));
    }
    Ok(())
}

pub fn validate_policy_text(policy: &str) -> Result<(), AppError> {
    let len = policy.chars().count();
    if len > POLICY_MAX_CHARS {
        return Err(AppError::new(
            "VALIDATION_POLICY_TOO_LONG",
            "Policy text is too long (maximum 100KB)",
        )
        .with_details(format!("chars={len}")));
    }
    Ok(())
}

/// Raw text is accepted as-is. Text that looks like JSON must be a well-formed object.
pub fn validate_insights_text(insights: &str) -> Result<(), AppError> {
    let len = insights.chars().count();
    if len > INSIGHTS_MAX_CHARS {
        return Err(AppError::new(
            "VALIDATION_INSIGHTS_TOO_LONG",
            format!("Insights text is too long (maximum {INSIGHTS_MAX_CHARS} characters)"),
        )
        .with_details(format!("chars={len}")));
    }
    let trimmed = insights.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return Ok(());
    }
    match serde_json::from_str::<serde_json::Value>(insights) {
        Ok(serde_json::Value::Object(_)) => Ok(()),
        Ok(_) => Err(AppError::new(
            "VALIDATION_INSIGHTS_NOT_OBJECT",
            "Insights must be a JSON object",
        )),
        Err(e) => Err(AppError::new("VALIDATION_INSIGHTS_INVALID_JSON", "Invalid JSON format")
            .with_details(e.to_string())),
    }
}

pub fn validate_user_id(user_id: &str) -> Result<(), AppError> {
    if user_id.trim().is_empty() {
        return Err(AppError::new("VALIDATION_USER_ID_EMPTY", "User ID is empty"));
    }
    if user_id.chars().count() > USER_ID_MAX_CHARS {
        return Err(AppError::new(
            "VALIDATION_USER_ID_TOO_LONG",
            format!("User ID is too long (maximum {USER_ID_MAX_CHARS} characters)"),
        ));
    }
    if !user_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(AppError::new(
            "VALIDATION_USER_ID_INVALID",
            "User ID contains invalid characters",
        ));
    }
    Ok(())
}

/// Checks existence, size and extension. `allowed_extensions` are lowercase, without dots.
pub fn validate_upload_file(
    path: &Path,
    max_bytes: u64,
    allowed_extensions: &[String],
) -> Result<(), AppError> {
    let meta = fs::metadata(path).map_err(|e| {
        AppError::new("VALIDATION_FILE_NOT_FOUND", "File not found")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    if !meta.is_file() {
        return Err(AppError::new("VALIDATION_FILE_NOT_FOUND", "Not a regular file")
            .with_details(format!("path={}", path.display())));
    }
    let size = meta.len();
    if size > max_bytes {
        return Err(AppError::new("VALIDATION_FILE_TOO_LARGE", "File too large").with_details(
            format!(
                "size={:.1}MB; max={:.1}MB",
                size as f64 / (1024.0 * 1024.0),
                max_bytes as f64 / (1024.0 * 1024.0)
            ),
        ));
    }
    if size == 0 {
        return Err(AppError::new("VALIDATION_FILE_EMPTY", "File is empty")
            .with_details(format!("path={}", path.display())));
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if !allowed_extensions.iter().any(|a| *a == ext) {
        return Err(AppError::new("VALIDATION_FILE_TYPE", "File type not allowed")
            .with_details(format!("ext={ext}")));
    }
    Ok(())
}

/// Strip NUL bytes, trim, and cap at `max_chars` characters when given.
pub fn sanitize_input(text: &str, max_chars: Option<usize>) -> String {
    let cleaned: String = text.chars().filter(|c| *c != '\0').collect();
    let trimmed = cleaned.trim();
    match max_chars {
        Some(max) if trimmed.chars().count() > max => {
            tracing::warn!(max_chars = max, "input truncated");
            trimmed.chars().take(max).collect()
        }
        _ => trimmed.to_string(),
    }
}
