use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const ACTION_DECISION_CREATED: &str = "decision_created";

/// Input-presence facts about a request. Counts and lengths only, never raw content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AuditInputs {
    pub computed_insights_present: bool,
    pub computed_insights_length: usize,
    pub policies_count: usize,
    pub past_feedback_present: bool,
}

/// What gets recorded for every answer request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditRecord {
    pub timestamp: String,
    pub question: Option<String>,
    pub decision_id: Option<i64>,
    pub inputs: AuditInputs,
    pub output_keys: Vec<String>,
    pub answer_source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAuditLog {
    pub decision_id: Option<i64>,
    pub action: String,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub details: serde_json::Value,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditLogEntry {
    pub id: i64,
    pub decision_id: Option<i64>,
    pub action: String,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub details: serde_json::Value,
    pub created_at: String,
}

/// Append one row. The schema rejects updates and deletes on `audit_logs`.
pub fn append_audit_log(conn: &Connection, entry: &NewAuditLog) -> Result<i64, AppError> {
    if entry.action.trim().is_empty() {
        return Err(AppError::new("DB_AUDIT_INVALID", "Audit action is required"));
    }
    let details_json = serde_json::to_string(&entry.details).map_err(|e| {
        AppError::new("DB_AUDIT_INVALID", "Failed to encode audit details").with_details(e.to_string())
    })?;

    conn.execute(
        r#"
        INSERT INTO audit_logs(decision_id, action, user_id, ip_address, details_json, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            entry.decision_id,
            entry.action,
            entry.user_id,
            entry.ip_address,
            details_json,
            entry.created_at
        ],
    )
    .map_err(|e| {
        AppError::new("DB_AUDIT_INSERT_FAILED", "Failed to append audit log")
            .with_details(e.to_string())
    })?;
    Ok(conn.last_insert_rowid())
}

/// Oldest first. `None` lists every entry.
pub fn list_audit_logs(conn: &Connection, decision_id: Option<i64>) -> Result<Vec<AuditLogEntry>, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, decision_id, action, user_id, ip_address, details_json, created_at
            FROM audit_logs
            WHERE ?1 IS NULL OR decision_id = ?1
            ORDER BY id ASC
            "#,
        )
        .map_err(|e| {
            AppError::new("DB_AUDIT_QUERY_FAILED", "Failed to query audit logs")
                .with_details(e.to_string())
        })?;

    let rows = stmt
        .query_map([decision_id], |row| {
            let details_json: String = row.get(5)?;
            let details = serde_json::from_str(&details_json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
            })?;
            Ok(AuditLogEntry {
                id: row.get(0)?,
                decision_id: row.get(1)?,
                action: row.get(2)?,
                user_id: row.get(3)?,
                ip_address: row.get(4)?,
                details,
                created_at: row.get(6)?,
            })
        })
        .map_err(|e| {
            AppError::new("DB_AUDIT_QUERY_FAILED", "Failed to map audit logs")
                .with_details(e.to_string())
        })?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(|e| {
            AppError::new("DB_AUDIT_QUERY_FAILED", "Failed to read audit log row")
                .with_details(e.to_string())
        })?);
    }
    Ok(out)
}

#[derive(Serialize)]
struct AuditLine<'a> {
    timestamp: &'a str,
    audit: &'a AuditRecord,
}

/// Append `record` as one JSON line to `path`, creating parent directories as needed.
pub fn append_audit_jsonl(path: &Path, record: &AuditRecord) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::new("EXPORT_AUDIT_FILE_FAILED", "Failed to create audit log directory")
                .with_details(format!("path={}; err={}", parent.display(), e))
        })?;
    }
    let mut line = serde_json::to_string(&AuditLine {
        timestamp: &record.timestamp,
        audit: record,
    })
    .map_err(|e| {
        AppError::new("EXPORT_AUDIT_FILE_FAILED", "Failed to encode audit record")
            .with_details(e.to_string())
    })?;
    line.push('\n');

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| f.write_all(line.as_bytes()))
        .map_err(|e| {
            AppError::new("EXPORT_AUDIT_FILE_FAILED", "Failed to append audit file")
                .with_details(format!("path={}; err={}", path.display(), e))
        })
}
