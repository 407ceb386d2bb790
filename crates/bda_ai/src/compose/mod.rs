//! Deterministic four-section answer built from the inputs alone.
//!
//! This is the path every request can fall back to, so it has no error channel: whatever the
//! insights text looks like, each section comes back non-empty.

use std::collections::BTreeSet;

use bda_core::domain::StructuredAnswer;
use bda_core::insights::{parse_insights, InsightsBundle, EXPECTED_KEYS};
use serde_json::Value;

use crate::text::word_tokens;

const MAX_SHOWN_TOKENS: usize = 20;

/// Recommendation order differs from summary order on purpose: trends and anomalies first.
const RECOMMENDATION_KEYS: [&str; 4] = ["trends", "anomalies", "averages", "comparisons"];

const NO_RECOMMENDATIONS: &str =
    "Cannot produce detailed recommendations because computed insights are missing or invalid.";
const POLICY_REVIEW_NOTE: &str = "Where policy overlaps are detected, ensure recommended operational changes are reviewed against the full policy text and approved by policy owners before implementation.";
const CONFIDENCE_MODERATE: &str =
    "Confidence: moderate — required insight fields present and at least one policy provided.";
const CONFIDENCE_LOW: &str = "Confidence: low — some expected insight fields or policy documents are missing; recommendations should be validated with full data and policy review.";
const FEEDBACK_NOTE: &str = "Past feedback was provided and considered as contextual notes only.";

pub fn compose(insights_text: &str, policies: &[String], feedback: Option<&str>) -> StructuredAnswer {
    let parsed = parse_insights(insights_text);
    StructuredAnswer {
        summary_of_findings: summary(&parsed.bundle, &parsed.notes),
        policy_alignment: policy_alignment(insights_text, policies),
        recommended_actions: recommendations(&parsed.bundle, policies),
        limitations_confidence: limitations(&parsed.bundle, &parsed.notes, policies, feedback),
    }
}

fn capitalize(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn summary(bundle: &InsightsBundle, notes: &[String]) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !notes.is_empty() {
        parts.push(format!("Note: {}", notes.join("; ")));
    }
    match bundle {
        InsightsBundle::Raw(text) => {
            parts.push("Provided computed insights (raw):".to_string());
            parts.push(text.clone());
        }
        InsightsBundle::Structured(_) => {
            for key in EXPECTED_KEYS {
                match bundle.get(key) {
                    Some(v) => parts.push(format!("{}: {}", capitalize(key), v)),
                    None => parts.push(format!("{}: (not provided)", capitalize(key))),
                }
            }
        }
    }
    parts.join("\n\n")
}

fn overlap_tokens(text: &str) -> BTreeSet<String> {
    word_tokens(text)
        .into_iter()
        .filter(|t| t.chars().count() > 2)
        .collect()
}

fn policy_alignment(insights_text: &str, policies: &[String]) -> String {
    if policies.is_empty() {
        return "No policy documents were provided.".to_string();
    }
    let source = overlap_tokens(insights_text);
    let lines: Vec<String> = policies
        .iter()
        .enumerate()
        .map(|(i, policy)| {
            let n = i + 1;
            if policy.trim().is_empty() {
                return format!("Policy {n}: (empty)");
            }
            let target = overlap_tokens(policy);
            let overlaps: Vec<&String> = source.intersection(&target).collect();
            if overlaps.is_empty() {
                format!("Policy {n}: no explicit token overlap detected with provided insights.")
            } else {
                let shown: Vec<&str> = overlaps
                    .iter()
                    .take(MAX_SHOWN_TOKENS)
                    .map(|t| t.as_str())
                    .collect();
                format!(
                    "Policy {n}: contains {} overlapping token(s) with insights: {}",
                    overlaps.len(),
                    shown.join(", ")
                )
            }
        })
        .collect();
    lines.join("\n")
}

fn recommendation(label: &str, value: &Value) -> String {
    let snippet = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!(
        "From {label}: '{snippet}' — Suggested actions (only if supported by further validation): investigate root cause, validate data sources, and align any corrective action with applicable policies quoted in the Policy Alignment section."
    )
}

fn recommendations(bundle: &InsightsBundle, policies: &[String]) -> String {
    if bundle.is_empty() {
        return NO_RECOMMENDATIONS.to_string();
    }
    let mut recs: Vec<String> = RECOMMENDATION_KEYS
        .iter()
        .filter_map(|key| bundle.get(key).map(|v| recommendation(key, v)))
        .collect();
    // Raw text and objects without any recognised key still get a statement.
    if recs.is_empty() {
        recs.push(NO_RECOMMENDATIONS.to_string());
    }
    if policies.iter().any(|p| !p.trim().is_empty()) {
        recs.push(POLICY_REVIEW_NOTE.to_string());
    }
    recs.join("\n\n")
}

fn limitations(
    bundle: &InsightsBundle,
    notes: &[String],
    policies: &[String],
    feedback: Option<&str>,
) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let issues = (!notes.is_empty()).then(|| format!("Parsing/format issues noted: {}", notes.join("; ")));
    if let Some(issues) = issues.as_deref() {
        parts.push(issues);
    }
    if bundle.has_all_expected_keys() && !policies.is_empty() {
        parts.push(CONFIDENCE_MODERATE);
    } else {
        parts.push(CONFIDENCE_LOW);
    }
    if feedback.is_some_and(|f| !f.trim().is_empty()) {
        parts.push(FEEDBACK_NOTE);
    }
    parts.join("\n")
}
