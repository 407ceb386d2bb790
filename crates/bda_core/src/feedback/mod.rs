use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::decisions::get_decision;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feedback {
    pub id: i64,
    pub decision_id: i64,
    pub user_id: Option<String>,
    pub rating: Option<u8>,
    pub comment: Option<String>,
    pub is_helpful: Option<bool>,
    pub metadata: serde_json::Value,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateFeedbackInput {
    pub decision_id: i64,
    pub user_id: Option<String>,
    pub rating: Option<u8>,
    pub comment: Option<String>,
    pub is_helpful: Option<bool>,
    pub metadata: serde_json::Value,
    pub created_at: String,
}

pub fn create_feedback(conn: &Connection, input: CreateFeedbackInput) -> Result<Feedback, AppError> {
    if let Some(r) = input.rating {
        if !(1..=5).contains(&r) {
            return Err(AppError::new("VALIDATION_FEEDBACK_RATING", "Rating must be between 1 and 5")
                .with_details(format!("rating={r}")));
        }
    }
    let comment = input
        .comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if input.rating.is_none() && comment.is_none() && input.is_helpful.is_none() {
        return Err(AppError::new(
            "VALIDATION_FEEDBACK_EMPTY",
            "Feedback needs a rating, a comment or a helpful flag",
        ));
    }
    if get_decision(conn, input.decision_id)?.is_none() {
        return Err(AppError::new("VALIDATION_FEEDBACK_DECISION", "Decision not found")
            .with_details(format!("decision_id={}", input.decision_id)));
    }

    let metadata_json = serde_json::to_string(&input.metadata).map_err(|e| {
        AppError::new("DB_FEEDBACK_INVALID", "Failed to encode feedback metadata")
            .with_details(e.to_string())
    })?;

    conn.execute(
        r#"
        INSERT INTO feedback(decision_id, user_id, rating, comment, is_helpful, metadata_json, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            input.decision_id,
            input.user_id,
            input.rating,
            comment,
            input.is_helpful,
            metadata_json,
            input.created_at
        ],
    )
    .map_err(|e| {
        AppError::new("DB_FEEDBACK_INSERT_FAILED", "Failed to store feedback")
            .with_details(e.to_string())
    })?;

    Ok(Feedback {
        id: conn.last_insert_rowid(),
        decision_id: input.decision_id,
        user_id: input.user_id,
        rating: input.rating,
        comment,
        is_helpful: input.is_helpful,
        metadata: input.metadata,
        created_at: input.created_at,
    })
}

/// Oldest first.
pub fn list_feedback_for_decision(conn: &Connection, decision_id: i64) -> Result<Vec<Feedback>, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, decision_id, user_id, rating, comment, is_helpful, metadata_json, created_at
            FROM feedback
            WHERE decision_id = ?1
            ORDER BY id ASC
            "#,
        )
        .map_err(|e| {
            AppError::new("DB_FEEDBACK_QUERY_FAILED", "Failed to query feedback")
                .with_details(e.to_string())
        })?;

    let rows = stmt
        .query_map([decision_id], |row| {
            let metadata_json: String = row.get(6)?;
            let metadata = serde_json::from_str(&metadata_json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
            })?;
            Ok(Feedback {
                id: row.get(0)?,
                decision_id: row.get(1)?,
                user_id: row.get(2)?,
                rating: row.get(3)?,
                comment: row.get(4)?,
                is_helpful: row.get(5)?,
                metadata,
                created_at: row.get(7)?,
            })
        })
        .map_err(|e| {
            AppError::new("DB_FEEDBACK_QUERY_FAILED", "Failed to map feedback")
                .with_details(e.to_string())
        })?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(|e| {
            AppError::new("DB_FEEDBACK_QUERY_FAILED", "Failed to read feedback row")
                .with_details(e.to_string())
        })?);
    }
    Ok(out)
}

#[derive(Serialize)]
struct FeedbackLine<'a> {
    rating: Option<u8>,
    is_helpful: Option<bool>,
    comment: Option<&'a str>,
}

/// Render stored feedback as one JSON object per line, for the PAST_FEEDBACK prompt section.
/// Returns `None` when there is nothing to render.
pub fn feedback_context_text(items: &[Feedback]) -> Option<String> {
    let lines: Vec<String> = items
        .iter()
        .filter_map(|f| {
            serde_json::to_string(&FeedbackLine {
                rating: f.rating,
                is_helpful: f.is_helpful,
                comment: f.comment.as_deref(),
            })
            .ok()
        })
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::decisions::{create_decision, CreateDecisionInput};
    use crate::domain::StructuredAnswer;

    fn setup() -> (Connection, i64) {
        let mut conn = db::open_in_memory().expect("open");
        db::migrate(&mut conn).expect("migrate");
        let d = create_decision(
            &conn,
            CreateDecisionInput {
                created_at: "2026-01-01T00:00:00Z".to_string(),
                question: None,
                computed_insights: None,
                answer: StructuredAnswer {
                    summary_of_findings: "s".to_string(),
                    policy_alignment: "p".to_string(),
                    recommended_actions: "r".to_string(),
                    limitations_confidence: "l".to_string(),
                },
                answer_source: "rule_based".to_string(),
                user_id: None,
                session_id: None,
                metadata: serde_json::json!({}),
            },
        )
        .expect("decision");
        (conn, d.id)
    }

    fn input(decision_id: i64, rating: Option<u8>) -> CreateFeedbackInput {
        CreateFeedbackInput {
            decision_id,
            user_id: None,
            rating,
            comment: Some(" useful ".to_string()),
            is_helpful: Some(true),
            metadata: serde_json::json!({}),
            created_at: "2026-01-02T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn stores_and_lists_feedback() {
        let (conn, id) = setup();
        let fb = create_feedback(&conn, input(id, Some(4))).expect("create");
        assert_eq!(fb.comment.as_deref(), Some("useful"));

        let listed = list_feedback_for_decision(&conn, id).expect("list");
        assert_eq!(listed, vec![fb]);
    }

    #[test]
    fn rating_out_of_range_is_rejected() {
        let (conn, id) = setup();
        for bad in [0u8, 6] {
            let err = create_feedback(&conn, input(id, Some(bad))).expect_err("should fail");
            assert_eq!(err.code, "VALIDATION_FEEDBACK_RATING");
        }
    }

    #[test]
    fn unknown_decision_is_rejected() {
        let (conn, id) = setup();
        let err = create_feedback(&conn, input(id + 100, Some(3))).expect_err("should fail");
        assert_eq!(err.code, "VALIDATION_FEEDBACK_DECISION");
    }

    #[test]
    fn context_text_is_json_lines() {
        let (conn, id) = setup();
        create_feedback(&conn, input(id, Some(5))).expect("create");
        create_feedback(&conn, input(id, None)).expect("create");
        let items = list_feedback_for_decision(&conn, id).expect("list");
        let text = feedback_context_text(&items).expect("text");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"rating":5,"is_helpful":true,"comment":"useful"}"#);
        assert_eq!(feedback_context_text(&[]), None);
    }
}
