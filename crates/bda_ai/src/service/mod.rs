use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use bda_core::audit::{append_audit_jsonl, append_audit_log, AuditInputs, AuditRecord, NewAuditLog, ACTION_DECISION_CREATED};
use bda_core::cache::{cache_key, ResponseCache};
use bda_core::decisions::{create_decision, CreateDecisionInput};
use bda_core::domain::{now_rfc3339_utc, AnswerSource, StructuredAnswer, SECTION_NAMES};
use bda_core::error::AppError;
use bda_core::rate_limit::RateLimiter;
use bda_core::validate::{
    validate_insights_text, validate_policy_text, validate_question, validate_user_id,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::answer::{AnswerGenerator, AnswerInput, GeneratedAnswer};

pub const ANONYMOUS: &str = "anonymous";
const CACHE_PREFIX: &str = "answer";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerRequest {
    pub question: Option<String>,
    pub insights_text: String,
    pub policies: Vec<String>,
    pub feedback: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub ip_address: Option<String>,
}

impl AnswerRequest {
    fn identifier(&self) -> &str {
        self.user_id
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(ANONYMOUS)
    }

    fn answer_input(&self) -> AnswerInput {
        AnswerInput {
            question: self.question.clone(),
            insights_text: self.insights_text.clone(),
            policies: self.policies.clone(),
            feedback: self.feedback.clone(),
        }
    }

    fn audit_inputs(&self) -> AuditInputs {
        AuditInputs {
            computed_insights_present: !self.insights_text.trim().is_empty(),
            computed_insights_length: self.insights_text.chars().count(),
            policies_count: self.policies.len(),
            past_feedback_present: self.feedback.as_deref().is_some_and(|f| !f.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerResponse {
    pub answer: StructuredAnswer,
    pub source: AnswerSource,
    /// `None` when the decision could not be stored.
    pub decision_id: Option<i64>,
    pub audit: AuditRecord,
    pub remaining_requests: usize,
    pub cache_hit: bool,
}

#[derive(Serialize)]
struct CacheArgs<'a> {
    question: Option<&'a str>,
    insights_text: &'a str,
    policies: &'a [String],
    feedback: Option<&'a str>,
}

/// Request orchestration: rate limit, validation, cache, generation, then the decision and audit
/// records.
pub struct DecisionService {
    generator: AnswerGenerator,
    limiter: Arc<RateLimiter>,
    cache: Option<Arc<ResponseCache>>,
    audit_file: Option<PathBuf>,
}

impl DecisionService {
    pub fn new(
        generator: AnswerGenerator,
        limiter: Arc<RateLimiter>,
        cache: Option<Arc<ResponseCache>>,
    ) -> Self {
        Self {
            generator,
            limiter,
            cache,
            audit_file: None,
        }
    }

    /// Also append every audit record to a JSONL file at `path`.
    pub fn with_audit_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_file = Some(path.into());
        self
    }

    pub fn generator(&self) -> &AnswerGenerator {
        &self.generator
    }

    pub fn validate(request: &AnswerRequest) -> Result<(), AppError> {
        validate_question(request.question.as_deref())?;
        validate_insights_text(&request.insights_text)?;
        for policy in &request.policies {
            validate_policy_text(policy)?;
        }
        if let Some(user_id) = request.user_id.as_deref() {
            validate_user_id(user_id)?;
        }
        Ok(())
    }

    /// The exact prompt a model call for `request` would receive at `generated_at`.
    pub fn preview_prompt(&self, request: &AnswerRequest, generated_at: &str) -> Result<String, AppError> {
        Self::validate(request)?;
        let input = request.answer_input();
        let retrieved = self.generator.retrieve_policies(&input.insights_text);
        Ok(self.generator.build_prompt(generated_at, &input, &retrieved))
    }

    pub fn answer(&self, conn: &Connection, request: AnswerRequest) -> Result<AnswerResponse, AppError> {
        let started = Instant::now();

        let rate = self.limiter.check(request.identifier());
        if !rate.allowed {
            tracing::warn!(identifier = request.identifier(), "rate limit exceeded");
            return Err(AppError::new(
                "RATE_LIMITED",
                "Rate limit exceeded. Please try again later.",
            )
            .with_details("remaining=0")
            .with_retryable(true));
        }

        Self::validate(&request)?;
        let timestamp = now_rfc3339_utc()?;

        let key = self.cache.as_ref().and_then(|_| {
            cache_key(
                CACHE_PREFIX,
                &CacheArgs {
                    question: request.question.as_deref(),
                    insights_text: &request.insights_text,
                    policies: &request.policies,
                    feedback: request.feedback.as_deref(),
                },
            )
            .map_err(|e| tracing::warn!(code = %e.code, "cache key unavailable"))
            .ok()
        });

        let cached = match (&self.cache, &key) {
            (Some(cache), Some(k)) => cache
                .get(k)
                .and_then(|v| serde_json::from_value::<GeneratedAnswer>(v).ok()),
            _ => None,
        };
        let cache_hit = cached.is_some();

        let generated = match cached {
            Some(g) => g,
            None => {
                let g = self.generator.generate_at(&timestamp, &request.answer_input());
                // Fallbacks are per-request degradations; the next call retries the model.
                let cacheable = matches!(g.source, AnswerSource::Model);
                if let (Some(cache), Some(k), true) = (&self.cache, key, cacheable) {
                    match serde_json::to_value(&g) {
                        Ok(v) => cache.set(k, v),
                        Err(e) => tracing::warn!(error = %e, "failed to cache answer"),
                    }
                }
                g
            }
        };

        let inputs = request.audit_inputs();
        let decision_id = self.record_decision(conn, &request, &timestamp, &generated, &inputs, cache_hit);

        let audit = AuditRecord {
            timestamp: timestamp.clone(),
            question: request.question.clone(),
            decision_id,
            inputs,
            output_keys: SECTION_NAMES.iter().map(|s| s.to_string()).collect(),
            answer_source: generated.source.as_str().to_string(),
        };
        self.record_audit(conn, &request, &audit);

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            source = generated.source.as_str(),
            cache_hit,
            decision_id = decision_id.unwrap_or_default(),
            insights_present = audit.inputs.computed_insights_present,
            policies = audit.inputs.policies_count,
            retrieved = generated.retrieved_policies,
            "answer produced"
        );

        Ok(AnswerResponse {
            answer: generated.answer,
            source: generated.source,
            decision_id,
            audit,
            remaining_requests: rate.remaining,
            cache_hit,
        })
    }

    fn record_decision(
        &self,
        conn: &Connection,
        request: &AnswerRequest,
        timestamp: &str,
        generated: &GeneratedAnswer,
        inputs: &AuditInputs,
        cache_hit: bool,
    ) -> Option<i64> {
        let metadata = serde_json::json!({
            "computed_insights_present": inputs.computed_insights_present,
            "computed_insights_length": inputs.computed_insights_length,
            "policies_count": inputs.policies_count,
            "past_feedback_present": inputs.past_feedback_present,
            "answer_source": generated.source,
            "retrieved_policies": generated.retrieved_policies,
            "cache_hit": cache_hit,
        });
        let input = CreateDecisionInput {
            created_at: timestamp.to_string(),
            question: request.question.clone(),
            computed_insights: Some(request.insights_text.clone()).filter(|s| !s.trim().is_empty()),
            answer: generated.answer.clone(),
            answer_source: generated.source.as_str().to_string(),
            user_id: request.user_id.clone(),
            session_id: request.session_id.clone(),
            metadata,
        };
        match create_decision(conn, input) {
            Ok(d) => Some(d.id),
            Err(e) => {
                tracing::warn!(code = %e.code, "failed to store decision");
                None
            }
        }
    }

    fn record_audit(&self, conn: &Connection, request: &AnswerRequest, audit: &AuditRecord) {
        let details = match serde_json::to_value(audit) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode audit record");
                return;
            }
        };
        let entry = NewAuditLog {
            decision_id: audit.decision_id,
            action: ACTION_DECISION_CREATED.to_string(),
            user_id: request.user_id.clone(),
            ip_address: request.ip_address.clone(),
            details,
            created_at: audit.timestamp.clone(),
        };
        if let Err(e) = append_audit_log(conn, &entry) {
            tracing::warn!(code = %e.code, "failed to append audit log");
        }
        if let Some(path) = &self.audit_file {
            if let Err(e) = append_audit_jsonl(path, audit) {
                tracing::warn!(code = %e.code, path = %path.display(), "failed to write audit file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatModel, LlmState};
    use crate::prompt::PromptAssembler;
    use bda_core::db;
    use std::time::Duration;

    struct Fixed;

    impl ChatModel for Fixed {
        fn generate(&self, _prompt: &str) -> Result<String, AppError> {
            Ok("Summary of Findings\nSales up.\nPolicy Alignment\nOn target.\n\
                Recommended Actions\nHold prices.\nLimitations / Confidence\nOne quarter."
                .to_string())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn service(limit: usize, cache: bool) -> DecisionService {
        service_with(
            LlmState::Unavailable(AppError::new("CONFIG_LLM_DISABLED", "off")),
            limit,
            cache,
        )
    }

    fn service_with(llm: LlmState, limit: usize, cache: bool) -> DecisionService {
        let generator = AnswerGenerator::new(llm, None, PromptAssembler::default());
        DecisionService::new(
            generator,
            Arc::new(RateLimiter::new(limit, Duration::from_secs(60))),
            cache.then(|| Arc::new(ResponseCache::new(Duration::from_secs(60), 10))),
        )
    }

    fn request() -> AnswerRequest {
        AnswerRequest {
            question: Some("How are sales trending?".to_string()),
            insights_text: r#"{"trends": "Sales up"}"#.to_string(),
            policies: vec!["Sales targets are reviewed quarterly.".to_string()],
            user_id: Some("analyst_1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn rate_limit_short_circuits_before_validation() {
        let mut conn = db::open_in_memory().expect("open");
        db::migrate(&mut conn).expect("migrate");
        let svc = service(1, false);

        svc.answer(&conn, request()).expect("first");
        let mut bad = request();
        bad.question = Some("x".to_string());
        let err = svc.answer(&conn, bad).expect_err("limited");
        assert_eq!(err.code, "RATE_LIMITED");
        assert!(err.is_user_visible());
    }

    #[test]
    fn second_identical_request_is_served_from_cache() {
        let mut conn = db::open_in_memory().expect("open");
        db::migrate(&mut conn).expect("migrate");
        let svc = service_with(LlmState::Available(Arc::new(Fixed)), 10, true);

        let first = svc.answer(&conn, request()).expect("first");
        let second = svc.answer(&conn, request()).expect("second");
        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(second.source, AnswerSource::Model);
        assert_eq!(first.answer, second.answer);
        assert_eq!(second.remaining_requests, 8);
    }

    #[test]
    fn rule_based_answers_are_not_cached() {
        let mut conn = db::open_in_memory().expect("open");
        db::migrate(&mut conn).expect("migrate");
        let svc = service(10, true);

        svc.answer(&conn, request()).expect("first");
        let second = svc.answer(&conn, request()).expect("second");
        assert!(!second.cache_hit);
        assert_eq!(second.source.as_str(), "rule_based");
    }

    #[test]
    fn storage_failure_does_not_fail_the_answer() {
        // No migrations: inserts fail.
        let conn = db::open_in_memory().expect("open");
        let out = service(10, false).answer(&conn, request()).expect("answer");
        assert_eq!(out.decision_id, None);
        assert!(out.answer.is_complete());
    }

    #[test]
    fn audit_records_are_mirrored_to_the_jsonl_file() {
        let mut conn = db::open_in_memory().expect("open");
        db::migrate(&mut conn).expect("migrate");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audit.jsonl");
        let svc = service(10, false).with_audit_file(&path);

        let out = svc.answer(&conn, request()).expect("answer");
        let raw = std::fs::read_to_string(&path).expect("read");
        let v: serde_json::Value = serde_json::from_str(raw.trim_end()).expect("json");
        assert_eq!(v["audit"]["decision_id"], serde_json::json!(out.decision_id));
        assert_eq!(v["audit"]["answer_source"], "rule_based");
    }
}
