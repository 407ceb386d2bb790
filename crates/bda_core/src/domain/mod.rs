use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::AppError;

/// The mandatory four-section answer.
///
/// Notes:
/// - Every request produces one, either parsed from a model reply or composed by the rule-based
///   fallback.
/// - A model reply only counts when all four sections are non-empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StructuredAnswer {
    pub summary_of_findings: String,
    pub policy_alignment: String,
    pub recommended_actions: String,
    pub limitations_confidence: String,
}

pub const SECTION_NAMES: [&str; 4] = [
    "summary_of_findings",
    "policy_alignment",
    "recommended_actions",
    "limitations_confidence",
];

impl StructuredAnswer {
    pub fn sections(&self) -> [(&'static str, &str); 4] {
        [
            (SECTION_NAMES[0], self.summary_of_findings.as_str()),
            (SECTION_NAMES[1], self.policy_alignment.as_str()),
            (SECTION_NAMES[2], self.recommended_actions.as_str()),
            (SECTION_NAMES[3], self.limitations_confidence.as_str()),
        ]
    }

    pub fn is_complete(&self) -> bool {
        self.sections().iter().all(|(_, text)| !text.trim().is_empty())
    }

    pub fn missing_sections(&self) -> Vec<&'static str> {
        self.sections()
            .iter()
            .filter(|(_, text)| text.trim().is_empty())
            .map(|(name, _)| *name)
            .collect()
    }
}

/// Which path produced an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerSource {
    Model,
    RuleBased { reason_code: String },
}

impl AnswerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerSource::Model => "model",
            AnswerSource::RuleBased { .. } => "rule_based",
        }
    }
}

pub fn now_rfc3339_utc() -> Result<String, AppError> {
    OffsetDateTime::now_utc().format(&Rfc3339).map_err(|e| {
        AppError::new("TIME_FORMAT_FAILED", "Failed to format time").with_details(e.to_string())
    })
}
