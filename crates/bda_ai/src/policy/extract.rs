use std::fs;
use std::path::Path;

use bda_core::error::AppError;
use serde_json::Value;

/// Turns a file into plain text. Binary formats are not handled here.
pub trait TextExtractor: Send + Sync {
    fn supports(&self, path: &Path) -> bool;
    fn extract(&self, path: &Path) -> Result<String, AppError>;
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn read_utf8(path: &Path) -> Result<String, AppError> {
    fs::read_to_string(path).map_err(|e| {
        AppError::new("INGEST_READ_FAILED", "Failed to read policy document")
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

/// `.txt` and `.md`, read as UTF-8 and trimmed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn supports(&self, path: &Path) -> bool {
        matches!(extension(path).as_deref(), Some("txt") | Some("md"))
    }

    fn extract(&self, path: &Path) -> Result<String, AppError> {
        Ok(read_utf8(path)?.trim().to_string())
    }
}

/// `.json`: every scalar leaf, in document order, joined by single spaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExtractor;

impl TextExtractor for JsonExtractor {
    fn supports(&self, path: &Path) -> bool {
        extension(path).as_deref() == Some("json")
    }

    fn extract(&self, path: &Path) -> Result<String, AppError> {
        let raw = read_utf8(path)?;
        let value: Value = serde_json::from_str(&raw).map_err(|e| {
            AppError::new("INGEST_PARSE_FAILED", "Failed to decode JSON policy document")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        Ok(flatten_json(&value))
    }
}

pub fn flatten_json(value: &Value) -> String {
    let mut parts = Vec::new();
    collect_leaves(value, &mut parts);
    parts.join(" ")
}

fn collect_leaves(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => map.values().for_each(|v| collect_leaves(v, out)),
        Value::Array(items) => items.iter().for_each(|v| collect_leaves(v, out)),
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() {
                out.push(s.to_string());
            }
        }
        Value::Number(n) => out.push(n.to_string()),
        Value::Bool(b) => out.push(b.to_string()),
        Value::Null => {}
    }
}

pub fn default_extractors() -> Vec<Box<dyn TextExtractor>> {
    vec![Box::new(PlainTextExtractor), Box::new(JsonExtractor)]
}
