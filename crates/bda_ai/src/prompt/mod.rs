//! Auditable prompt assembly.
//!
//! The prompt is a pure function of its inputs (the timestamp is one of them), so the exact text
//! sent to a model can be previewed and reproduced.

use bda_core::domain::now_rfc3339_utc;
use bda_core::error::AppError;

pub const DEFAULT_SOURCE_TAG: &str = "business_assistant";
pub const DEFAULT_MAX_POLICY_CHARS: usize = 8000;

const TRUNCATION_RESERVE: usize = 200;
pub const TRUNCATION_NOTICE: &str = "\n...[truncated due to length]...";
const TRUNCATION_HINT: &str =
    "\n(Full policies were truncated in the prompt; rely on retrieval to fetch full text when executing.)";

pub const INSTRUCTION_BLOCK: &str = "You are an assistant that must only use the provided information. Do NOT analyze raw files. Produce output with exactly four sections:\n1) Summary of Findings\n2) Policy Alignment\n3) Recommended Actions\n4) Limitations / Confidence\nIf information is missing, explicitly state what is missing. Keep answers concise and auditable.";

const NONE_PROVIDED: &str = "(none provided)";
const NO_QUESTION: &str = "(no question provided)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptAssembler {
    pub source_tag: String,
    pub max_policy_chars: usize,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self {
            source_tag: DEFAULT_SOURCE_TAG.to_string(),
            max_policy_chars: DEFAULT_MAX_POLICY_CHARS,
        }
    }
}

fn or_none<'a>(text: Option<&'a str>, placeholder: &'static str) -> &'a str {
    match text {
        Some(t) if !t.trim().is_empty() => t,
        _ => placeholder,
    }
}

impl PromptAssembler {
    pub fn new(source_tag: impl Into<String>, max_policy_chars: usize) -> Self {
        Self {
            source_tag: source_tag.into(),
            max_policy_chars,
        }
    }

    /// Labelled policy block, cut to `max_policy_chars - 200` characters plus a notice when the
    /// full text would exceed `max_policy_chars`. The result never exceeds `max_policy_chars`
    /// characters. `None` when there are no policies.
    pub fn policy_block(&self, policies: &[String]) -> Option<String> {
        if policies.is_empty() {
            return None;
        }
        let labelled: Vec<String> = policies
            .iter()
            .enumerate()
            .map(|(i, p)| format!("Policy {}:\n{}", i + 1, p))
            .collect();
        let text = labelled.join("\n\n");
        if text.chars().count() <= self.max_policy_chars {
            return Some(text);
        }
        let keep = self.max_policy_chars.saturating_sub(TRUNCATION_RESERVE);
        let cut: String = text
            .chars()
            .take(keep)
            .chain(TRUNCATION_NOTICE.chars())
            .chain(TRUNCATION_HINT.chars())
            .take(self.max_policy_chars)
            .collect();
        Some(cut)
    }

    pub fn build(
        &self,
        generated_at: &str,
        question: Option<&str>,
        insights: Option<&str>,
        policies: &[String],
        feedback: Option<&str>,
    ) -> String {
        let header = format!(
            "AUDIT: timestamp={generated_at} | source={}\n",
            self.source_tag
        );
        let policy_text = self.policy_block(policies);
        let parts: [&str; 11] = [
            &header,
            "QUESTION:",
            or_none(question, NO_QUESTION),
            "\nCOMPUTED_INSIGHTS:",
            or_none(insights, NONE_PROVIDED),
            "\nPOLICIES:",
            policy_text.as_deref().unwrap_or(NONE_PROVIDED),
            "\nPAST_FEEDBACK:",
            or_none(feedback, NONE_PROVIDED),
            "\nINSTRUCTIONS:",
            INSTRUCTION_BLOCK,
        ];
        parts.join("\n\n")
    }

    /// [`PromptAssembler::build`] stamped with the current UTC time.
    pub fn build_now(
        &self,
        question: Option<&str>,
        insights: Option<&str>,
        policies: &[String],
        feedback: Option<&str>,
    ) -> Result<String, AppError> {
        let ts = now_rfc3339_utc()?;
        Ok(self.build(&ts, question, insights, policies, feedback))
    }
}
