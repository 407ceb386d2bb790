use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bda_ai::answer::AnswerGenerator;
use bda_ai::llm::LlmState;
use bda_ai::policy::{default_extractors, load_document};
use bda_ai::prompt::PromptAssembler;
use bda_ai::retrieve::Retriever;
use bda_ai::service::{AnswerRequest, DecisionService};
use bda_core::cache::ResponseCache;
use bda_core::config::Settings;
use bda_core::domain::now_rfc3339_utc;
use bda_core::feedback::{feedback_context_text, list_feedback_for_decision};
use bda_core::rate_limit::RateLimiter;
use bda_core::validate::{sanitize_input, validate_upload_file};
use rusqlite::Connection;

use super::{open_db, open_index, InputArgs};

fn build_service(settings: &Settings) -> DecisionService {
    let retriever = match open_index(settings) {
        Ok(index) => Some(Retriever::from_settings(index, &settings.retrieval)),
        Err(e) => {
            tracing::warn!(error = %e, "policy index unavailable; answering without retrieval");
            None
        }
    };
    let generator = AnswerGenerator::new(
        LlmState::from_settings(&settings.llm),
        retriever,
        PromptAssembler::new(
            bda_ai::prompt::DEFAULT_SOURCE_TAG,
            settings.retrieval.max_policy_chars,
        ),
    );
    let limiter = if settings.rate_limit.enabled {
        RateLimiter::new(
            settings.rate_limit.requests,
            Duration::from_secs(settings.rate_limit.window_secs),
        )
    } else {
        RateLimiter::disabled(settings.rate_limit.requests)
    };
    let cache = settings.cache.enabled.then(|| {
        Arc::new(ResponseCache::new(
            Duration::from_secs(settings.cache.ttl_secs),
            settings.cache.max_entries,
        ))
    });
    DecisionService::new(generator, Arc::new(limiter), cache)
        .with_audit_file(settings.paths.audit_log_path())
}

fn read_request(settings: &Settings, conn: &Connection, args: InputArgs) -> Result<AnswerRequest> {
    let allowed = settings.uploads.allowed_extensions_list();
    let max_bytes = settings.uploads.max_upload_bytes;

    let insights_text = match (&args.insights, &args.insights_file) {
        (Some(text), _) => sanitize_input(text, None),
        (None, Some(path)) => {
            validate_upload_file(path, max_bytes, &allowed)?;
            sanitize_input(&fs::read_to_string(path)?, None)
        }
        (None, None) => String::new(),
    };

    let extractors = default_extractors();
    let mut policies: Vec<String> = args.policy.iter().map(|p| sanitize_input(p, None)).collect();
    for path in &args.policy_file {
        validate_upload_file(path, max_bytes, &allowed)?;
        policies.push(load_document(path, &extractors)?.text);
    }

    let mut feedback_parts: Vec<String> = args
        .feedback
        .iter()
        .map(|f| sanitize_input(f, None))
        .filter(|f| !f.is_empty())
        .collect();
    for decision_id in &args.feedback_from {
        let items = list_feedback_for_decision(conn, *decision_id)?;
        feedback_parts.extend(feedback_context_text(&items));
    }
    let feedback = (!feedback_parts.is_empty()).then(|| feedback_parts.join("\n"));

    Ok(AnswerRequest {
        question: args.question.map(|q| sanitize_input(&q, None)),
        insights_text,
        policies,
        feedback,
        user_id: args.user_id,
        session_id: args.session_id,
        ip_address: None,
    })
}

pub fn handle_prompt(settings: &Settings, args: InputArgs) -> Result<()> {
    let conn = open_db(settings)?;
    let request = read_request(settings, &conn, args)?;
    let service = build_service(settings);
    println!("{}", service.preview_prompt(&request, &now_rfc3339_utc()?)?);
    Ok(())
}

pub fn handle_ask(settings: &Settings, args: InputArgs, json: bool) -> Result<()> {
    let conn = open_db(settings)?;
    let request = read_request(settings, &conn, args)?;
    let service = build_service(settings);
    let response = service.answer(&conn, request)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let a = &response.answer;
    for (title, body) in [
        ("SUMMARY OF FINDINGS", &a.summary_of_findings),
        ("POLICY ALIGNMENT", &a.policy_alignment),
        ("RECOMMENDED ACTIONS", &a.recommended_actions),
        ("LIMITATIONS / CONFIDENCE", &a.limitations_confidence),
    ] {
        println!("## {title}\n{body}\n");
    }
    match response.decision_id {
        Some(id) => println!("Decision #{id} ({})", response.source.as_str()),
        None => println!("Decision not stored ({})", response.source.as_str()),
    }
    Ok(())
}
