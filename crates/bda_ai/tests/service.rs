use std::sync::{Arc, Mutex};
use std::time::Duration;

use bda_ai::answer::AnswerGenerator;
use bda_ai::embeddings::{Embedder, HashingEmbedder};
use bda_ai::llm::{ChatModel, LlmState};
use bda_ai::policy::VectorIndex;
use bda_ai::prompt::PromptAssembler;
use bda_ai::retrieve::Retriever;
use bda_ai::service::{AnswerRequest, DecisionService};
use bda_core::audit::list_audit_logs;
use bda_core::cache::ResponseCache;
use bda_core::db;
use bda_core::decisions::{get_decision, list_decisions};
use bda_core::domain::AnswerSource;
use bda_core::error::AppError;
use bda_core::rate_limit::RateLimiter;
use pretty_assertions::assert_eq;
use rusqlite::Connection;

const COMPLETE_REPLY: &str = "**Summary of Findings**\nRevenue rose 5%.\n\
**Policy Alignment**\nRefund approvals apply.\n\
**Recommended Actions**\nReview refunds over 500.\n\
**Limitations / Confidence**\nModerate; one quarter of data.\n";

struct RecordingModel {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl RecordingModel {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl ChatModel for RecordingModel {
    fn generate(&self, prompt: &str) -> Result<String, AppError> {
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(prompt.to_string());
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}

/// Fails its first call with a retryable error, then replies normally.
struct FlakyModel {
    calls: Mutex<usize>,
}

impl ChatModel for FlakyModel {
    fn generate(&self, _prompt: &str) -> Result<String, AppError> {
        let mut calls = self.calls.lock().unwrap_or_else(|p| p.into_inner());
        *calls += 1;
        if *calls == 1 {
            return Err(AppError::new("GENERATION_FAILED", "Failed to call chat endpoint")
                .with_retryable(true));
        }
        Ok(COMPLETE_REPLY.to_string())
    }

    fn model_name(&self) -> &str {
        "flaky"
    }
}

/// Indexes fine, fails every query that mentions refunds.
struct QueryFailingEmbedder(HashingEmbedder);

impl Embedder for QueryFailingEmbedder {
    fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        if input.contains("refunds") {
            return Err(AppError::new("GENERATION_OLLAMA_FAILED", "connection refused"));
        }
        self.0.embed(input)
    }

    fn id(&self) -> String {
        "query-failing".to_string()
    }
}

fn conn() -> Connection {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");
    conn
}

fn policy_index(embedder: Arc<dyn Embedder>) -> Arc<VectorIndex> {
    let index = Arc::new(VectorIndex::in_memory(embedder));
    index
        .add(&[
            "Refunds above 500 require manager approval.",
            "Travel must be booked two weeks ahead.",
        ])
        .expect("add");
    index
}

fn service(llm: LlmState, index: Option<Arc<VectorIndex>>) -> DecisionService {
    let retriever = index.map(|i| Retriever::new(i, 1, None));
    DecisionService::new(
        AnswerGenerator::new(llm, retriever, PromptAssembler::default()),
        Arc::new(RateLimiter::new(100, Duration::from_secs(60))),
        Some(Arc::new(ResponseCache::new(Duration::from_secs(60), 100))),
    )
}

fn request() -> AnswerRequest {
    AnswerRequest {
        question: Some("Should we tighten refund approvals?".to_string()),
        insights_text: r#"{"trends": "refunds above 500 doubled", "anomalies": ["refund spike"]}"#
            .to_string(),
        policies: vec!["All refunds are logged.".to_string()],
        feedback: Some("Be specific about thresholds.".to_string()),
        user_id: Some("analyst".to_string()),
        session_id: Some("s-1".to_string()),
        ip_address: Some("127.0.0.1".to_string()),
    }
}

#[test]
fn model_answer_uses_supplied_then_retrieved_policies() {
    let conn = conn();
    let model = RecordingModel::new(COMPLETE_REPLY);
    let svc = service(
        LlmState::Available(model.clone()),
        Some(policy_index(Arc::new(HashingEmbedder::new(256)))),
    );

    let out = svc.answer(&conn, request()).expect("answer");
    assert_eq!(out.source, AnswerSource::Model);
    assert_eq!(out.answer.recommended_actions, "Review refunds over 500.");

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(
        "Policy 1:\nAll refunds are logged.\n\nPolicy 2:\nRefunds above 500 require manager approval."
    ));
    assert!(prompts[0].contains("PAST_FEEDBACK:\n\nBe specific about thresholds."));

    let id = out.decision_id.expect("stored");
    let d = get_decision(&conn, id).expect("get").expect("exists");
    assert_eq!(d.answer_source, "model");
    assert_eq!(d.answer, out.answer);
    assert_eq!(d.metadata["retrieved_policies"], 1);
    assert_eq!(d.metadata["policies_count"], 1);

    let logs = list_audit_logs(&conn, Some(id)).expect("logs");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, "decision_created");
    assert_eq!(logs[0].ip_address.as_deref(), Some("127.0.0.1"));
    assert_eq!(logs[0].details["answer_source"], "model");
    assert_eq!(logs[0].details["inputs"]["past_feedback_present"], true);
    assert_eq!(
        logs[0].details["output_keys"],
        serde_json::json!([
            "summary_of_findings",
            "policy_alignment",
            "recommended_actions",
            "limitations_confidence"
        ])
    );
}

#[test]
fn retrieval_failure_keeps_the_model_path() {
    let conn = conn();
    let model = RecordingModel::new(COMPLETE_REPLY);
    let embedder = Arc::new(QueryFailingEmbedder(HashingEmbedder::new(64)));
    let svc = service(LlmState::Available(model.clone()), Some(policy_index(embedder)));

    let out = svc.answer(&conn, request()).expect("answer");
    assert_eq!(out.source, AnswerSource::Model);
    let prompts = model.prompts();
    assert!(!prompts[0].contains("Policy 2:"));

    let d = get_decision(&conn, out.decision_id.expect("stored"))
        .expect("get")
        .expect("exists");
    assert_eq!(d.metadata["retrieved_policies"], 0);
}

#[test]
fn unavailable_model_answers_with_rule_based_composer() {
    let conn = conn();
    let svc = service(
        LlmState::Unavailable(AppError::new(
            "CONFIG_MISSING_CREDENTIAL",
            "GROQ_API_KEY not set in environment variables",
        )),
        None,
    );

    let out = svc.answer(&conn, request()).expect("answer");
    assert_eq!(out.source.as_str(), "rule_based");
    assert!(out.answer.is_complete());
    assert!(out.answer.summary_of_findings.starts_with("Note: Parsed insights missing expected fields: ['averages', 'comparisons']"));
    assert!(out.answer.limitations_confidence.contains("Confidence: low"));
    assert_eq!(out.audit.answer_source, "rule_based");
    assert_eq!(out.audit.inputs.policies_count, 1);
    assert_eq!(list_decisions(&conn, 10).expect("list").len(), 1);
}

#[test]
fn invalid_input_is_reported_and_nothing_is_stored() {
    let conn = conn();
    let svc = service(LlmState::Available(RecordingModel::new(COMPLETE_REPLY)), None);

    let mut bad_json = request();
    bad_json.insights_text = "{\"trends\": ".to_string();
    let err = svc.answer(&conn, bad_json).expect_err("invalid");
    assert_eq!(err.code, "VALIDATION_INSIGHTS_INVALID_JSON");
    assert!(err.is_user_visible());

    let mut unsafe_q = request();
    unsafe_q.question = Some("<script>alert(1)</script>".to_string());
    assert_eq!(
        svc.answer(&conn, unsafe_q).expect_err("unsafe").code,
        "VALIDATION_QUESTION_UNSAFE"
    );

    assert!(list_decisions(&conn, 10).expect("list").is_empty());
}

#[test]
fn rate_limit_applies_per_user() {
    let conn = conn();
    let svc = DecisionService::new(
        AnswerGenerator::new(
            LlmState::Unavailable(AppError::new("CONFIG_LLM_DISABLED", "off")),
            None,
            PromptAssembler::default(),
        ),
        Arc::new(RateLimiter::new(2, Duration::from_secs(60))),
        None,
    );

    assert_eq!(svc.answer(&conn, request()).expect("1").remaining_requests, 1);
    assert_eq!(svc.answer(&conn, request()).expect("2").remaining_requests, 0);
    let err = svc.answer(&conn, request()).expect_err("3");
    assert_eq!(err.code, "RATE_LIMITED");

    let mut other = request();
    other.user_id = Some("someone_else".to_string());
    assert!(svc.answer(&conn, other).is_ok());
}

#[test]
fn preview_matches_the_prompt_sent_to_the_model() {
    let conn = conn();
    let model = RecordingModel::new(COMPLETE_REPLY);
    let svc = service(
        LlmState::Available(model.clone()),
        Some(policy_index(Arc::new(HashingEmbedder::new(256)))),
    );

    svc.answer(&conn, request()).expect("answer");
    let preview = svc
        .preview_prompt(&request(), "2026-01-01T00:00:00Z")
        .expect("preview");

    let body = |p: &str| p.split_once('\n').map(|(_, rest)| rest.to_string());
    assert!(preview.starts_with("AUDIT: timestamp=2026-01-01T00:00:00Z | source=business_assistant"));
    assert_eq!(body(&preview), body(&model.prompts()[0]));
}

#[test]
fn transient_model_failure_is_retried_on_the_next_request() {
    let conn = conn();
    let model = Arc::new(FlakyModel {
        calls: Mutex::new(0),
    });
    let svc = service(LlmState::Available(model.clone()), None);

    let first = svc.answer(&conn, request()).expect("first");
    assert_eq!(
        first.source,
        AnswerSource::RuleBased {
            reason_code: "GENERATION_FAILED".to_string()
        }
    );
    assert!(!first.cache_hit);

    let second = svc.answer(&conn, request()).expect("second");
    assert_eq!(second.source, AnswerSource::Model);
    assert!(!second.cache_hit);
    assert_eq!(second.answer.summary_of_findings, "Revenue rose 5%.");

    let third = svc.answer(&conn, request()).expect("third");
    assert!(third.cache_hit);
    assert_eq!(*model.calls.lock().unwrap_or_else(|p| p.into_inner()), 2);
}
