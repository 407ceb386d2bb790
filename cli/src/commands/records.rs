use std::path::Path;

use anyhow::{anyhow, Result};
use bda_ai::text::snippet;
use bda_core::config::Settings;
use bda_core::decisions::{export_decision_json, get_decision, list_decisions};
use bda_core::domain::now_rfc3339_utc;
use bda_core::feedback::{create_feedback, list_feedback_for_decision, CreateFeedbackInput};

use super::{open_db, FeedbackArgs};

pub fn handle_init_db(settings: &Settings) -> Result<()> {
    let path = settings.paths.db_path();
    open_db(settings)?;
    println!("Database ready: {}", path.display());
    Ok(())
}

pub fn handle_history(settings: &Settings, limit: u32) -> Result<()> {
    let conn = open_db(settings)?;
    let decisions = list_decisions(&conn, limit)?;
    if decisions.is_empty() {
        println!("No decisions recorded.");
    }
    for d in decisions {
        println!(
            "#{} {} [{}] {}",
            d.id,
            d.created_at,
            d.answer_source,
            snippet(d.question.as_deref().unwrap_or("(no question)"), 80)
        );
    }
    Ok(())
}

pub fn handle_feedback_add(settings: &Settings, args: FeedbackArgs) -> Result<()> {
    let conn = open_db(settings)?;
    let fb = create_feedback(
        &conn,
        CreateFeedbackInput {
            decision_id: args.decision_id,
            user_id: args.user_id,
            rating: args.rating,
            comment: args.comment,
            is_helpful: args.helpful,
            metadata: serde_json::json!({ "source": "cli" }),
            created_at: now_rfc3339_utc()?,
        },
    )?;
    println!("Feedback #{} recorded for decision #{}", fb.id, fb.decision_id);
    Ok(())
}

pub fn handle_feedback_list(settings: &Settings, decision_id: i64) -> Result<()> {
    let conn = open_db(settings)?;
    let items = list_feedback_for_decision(&conn, decision_id)?;
    if items.is_empty() {
        println!("No feedback for decision #{decision_id}.");
    }
    for f in items {
        let rating = f.rating.map(|r| format!("{r}/5")).unwrap_or_else(|| "-".to_string());
        let helpful = match f.is_helpful {
            Some(true) => "helpful",
            Some(false) => "not helpful",
            None => "-",
        };
        println!(
            "#{} {} rating={} {} {}",
            f.id,
            f.created_at,
            rating,
            helpful,
            f.comment.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub fn handle_export(settings: &Settings, decision_id: i64, out: &Path) -> Result<()> {
    let conn = open_db(settings)?;
    let decision = get_decision(&conn, decision_id)?
        .ok_or_else(|| anyhow!("decision #{decision_id} not found"))?;
    export_decision_json(&decision, out, &now_rfc3339_utc()?)?;
    println!("Exported decision #{decision_id} to {}", out.display());
    Ok(())
}
