use std::fs;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::StructuredAnswer;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub id: i64,
    pub created_at: String, // RFC3339
    pub question: Option<String>,
    pub computed_insights: Option<String>,
    #[serde(flatten)]
    pub answer: StructuredAnswer,
    pub answer_source: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub metadata: serde_json::Value,
    pub content_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateDecisionInput {
    pub created_at: String,
    pub question: Option<String>,
    pub computed_insights: Option<String>,
    pub answer: StructuredAnswer,
    pub answer_source: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
struct HashPayload<'a> {
    created_at: &'a str,
    question: Option<&'a str>,
    summary_of_findings: &'a str,
    policy_alignment: &'a str,
    recommended_actions: &'a str,
    limitations_confidence: &'a str,
    answer_source: &'a str,
}

fn compute_content_hash(input: &CreateDecisionInput) -> Result<String, AppError> {
    let payload = HashPayload {
        created_at: input.created_at.as_str(),
        question: input.question.as_deref(),
        summary_of_findings: input.answer.summary_of_findings.as_str(),
        policy_alignment: input.answer.policy_alignment.as_str(),
        recommended_actions: input.answer.recommended_actions.as_str(),
        limitations_confidence: input.answer.limitations_confidence.as_str(),
        answer_source: input.answer_source.as_str(),
    };
    let json = serde_json::to_string(&payload).map_err(|e| {
        AppError::new("DB_DECISION_HASH_FAILED", "Failed to serialize decision hash payload")
            .with_details(e.to_string())
    })?;
    Ok(hex::encode(Sha256::digest(json.as_bytes())))
}

pub fn create_decision(conn: &Connection, input: CreateDecisionInput) -> Result<Decision, AppError> {
    if !input.answer.is_complete() {
        return Err(AppError::new(
            "DB_DECISION_INVALID",
            "All four answer sections are required to store a decision",
        )
        .with_details(format!("missing={:?}", input.answer.missing_sections())));
    }
    if input.created_at.trim().is_empty() {
        return Err(AppError::new("DB_DECISION_INVALID", "created_at is required"));
    }

    let content_hash = compute_content_hash(&input)?;
    let metadata_json = serde_json::to_string(&input.metadata).map_err(|e| {
        AppError::new("DB_DECISION_INVALID", "Failed to encode decision metadata")
            .with_details(e.to_string())
    })?;

    conn.execute(
        r#"
        INSERT INTO decisions(
          created_at, question, computed_insights, summary_of_findings, policy_alignment,
          recommended_actions, limitations_confidence, answer_source, user_id, session_id,
          metadata_json, content_hash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            input.created_at,
            input.question,
            input.computed_insights,
            input.answer.summary_of_findings,
            input.answer.policy_alignment,
            input.answer.recommended_actions,
            input.answer.limitations_confidence,
            input.answer_source,
            input.user_id,
            input.session_id,
            metadata_json,
            content_hash
        ],
    )
    .map_err(|e| {
        AppError::new("DB_DECISION_CREATE_FAILED", "Failed to store decision")
            .with_details(e.to_string())
    })?;

    let id = conn.last_insert_rowid();
    get_decision(conn, id)?.ok_or_else(|| {
        AppError::new(
            "DB_DECISION_CREATE_FAILED",
            "Decision stored but could not be read back",
        )
    })
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, created_at, question, computed_insights, summary_of_findings, policy_alignment,
           recommended_actions, limitations_confidence, answer_source, user_id, session_id,
           metadata_json, content_hash
    FROM decisions
"#;

fn map_decision_row(row: &rusqlite::Row<'_>) -> Result<Decision, rusqlite::Error> {
    let metadata_json: String = row.get(11)?;
    let metadata: serde_json::Value = serde_json::from_str(&metadata_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Decision {
        id: row.get(0)?,
        created_at: row.get(1)?,
        question: row.get(2)?,
        computed_insights: row.get(3)?,
        answer: StructuredAnswer {
            summary_of_findings: row.get(4)?,
            policy_alignment: row.get(5)?,
            recommended_actions: row.get(6)?,
            limitations_confidence: row.get(7)?,
        },
        answer_source: row.get(8)?,
        user_id: row.get(9)?,
        session_id: row.get(10)?,
        metadata,
        content_hash: row.get(12)?,
    })
}

pub fn get_decision(conn: &Connection, id: i64) -> Result<Option<Decision>, AppError> {
    let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
    let mut stmt = conn.prepare(&sql).map_err(|e| {
        AppError::new("DB_DECISION_QUERY_FAILED", "Failed to prepare decision query")
            .with_details(e.to_string())
    })?;
    stmt.query_row([id], map_decision_row).optional().map_err(|e| {
        AppError::new("DB_DECISION_QUERY_FAILED", "Failed to query decision")
            .with_details(e.to_string())
    })
}

/// Most recent first.
pub fn list_decisions(conn: &Connection, limit: u32) -> Result<Vec<Decision>, AppError> {
    let sql = format!("{SELECT_COLUMNS} ORDER BY created_at DESC, id DESC LIMIT ?1");
    let mut stmt = conn.prepare(&sql).map_err(|e| {
        AppError::new("DB_DECISION_QUERY_FAILED", "Failed to query decisions")
            .with_details(e.to_string())
    })?;
    let rows = stmt.query_map([limit.max(1)], map_decision_row).map_err(|e| {
        AppError::new("DB_DECISION_QUERY_FAILED", "Failed to map decisions")
            .with_details(e.to_string())
    })?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(|e| {
            AppError::new("DB_DECISION_QUERY_FAILED", "Failed to read decision row")
                .with_details(e.to_string())
        })?);
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
struct DecisionExport<'a> {
    exported_at: &'a str,
    report: &'a Decision,
}

/// Write a decision as pretty JSON. The write goes through a temp file and a rename.
pub fn export_decision_json(decision: &Decision, path: &Path, exported_at: &str) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::new("EXPORT_FAILED", "Failed to create export directory")
                .with_details(format!("path={}; err={}", parent.display(), e))
        })?;
    }
    let json = serde_json::to_string_pretty(&DecisionExport {
        exported_at,
        report: decision,
    })
    .map_err(|e| {
        AppError::new("EXPORT_FAILED", "Failed to encode decision export").with_details(e.to_string())
    })?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json.as_bytes()).map_err(|e| {
        AppError::new("EXPORT_FAILED", "Failed to write decision export")
            .with_details(format!("path={}; err={}", tmp.display(), e))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        AppError::new("EXPORT_FAILED", "Failed to finalize decision export")
            .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
    })?;
    Ok(())
}
