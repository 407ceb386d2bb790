use bda_core::domain::{now_rfc3339_utc, AnswerSource, StructuredAnswer};
use bda_core::error::AppError;
use serde::{Deserialize, Serialize};

use crate::compose::compose;
use crate::llm::LlmState;
use crate::prompt::PromptAssembler;
use crate::retrieve::Retriever;

pub mod sections;

pub use sections::parse_sections;

/// Question sent to the model when the caller did not ask one.
pub const DEFAULT_QUESTION: &str = "Generate a structured business analysis report with exactly 4 sections: Summary of Findings, Policy Alignment, Recommended Actions, and Limitations/Confidence based on the provided insights and policies.";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerInput {
    pub question: Option<String>,
    pub insights_text: String,
    pub policies: Vec<String>,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedAnswer {
    pub answer: StructuredAnswer,
    pub source: AnswerSource,
    /// Policy chunks added by retrieval on top of the caller's policies.
    pub retrieved_policies: usize,
    /// Size of the prompt sent to the model, when one was sent.
    pub prompt_chars: Option<usize>,
}

/// Produces a [`StructuredAnswer`] for every request.
///
/// Notes:
/// - A usable model gets one attempt per request. Its reply is accepted only when all four
///   sections parse; otherwise the rule-based composer answers.
/// - Retrieval failures only drop the extra policy context.
/// - The composer always sees the caller's policies, never retrieved chunks.
#[derive(Debug, Clone)]
pub struct AnswerGenerator {
    llm: LlmState,
    retriever: Option<Retriever>,
    prompts: PromptAssembler,
}

impl AnswerGenerator {
    pub fn new(llm: LlmState, retriever: Option<Retriever>, prompts: PromptAssembler) -> Self {
        Self {
            llm,
            retriever,
            prompts,
        }
    }

    pub fn llm_state(&self) -> &LlmState {
        &self.llm
    }

    pub fn retriever(&self) -> Option<&Retriever> {
        self.retriever.as_ref()
    }

    pub fn prompts(&self) -> &PromptAssembler {
        &self.prompts
    }

    /// Policy chunks relevant to the insights text. Empty on a blank query, a missing retriever
    /// or a retrieval error.
    pub fn retrieve_policies(&self, insights_text: &str) -> Vec<String> {
        let Some(retriever) = self.retriever.as_ref() else {
            return Vec::new();
        };
        if insights_text.trim().is_empty() {
            return Vec::new();
        }
        match retriever.retrieve(insights_text) {
            Ok(found) => {
                tracing::debug!(retrieved = found.len(), "retrieved policy chunks");
                found
            }
            Err(e) => {
                tracing::warn!(code = %e.code, "policy retrieval failed; using supplied policies only");
                Vec::new()
            }
        }
    }

    /// Caller policies first, then retrieved chunks.
    pub fn build_prompt(&self, generated_at: &str, input: &AnswerInput, retrieved: &[String]) -> String {
        let mut policies = input.policies.clone();
        policies.extend(retrieved.iter().cloned());
        let question = input
            .question
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or(DEFAULT_QUESTION);
        self.prompts.build(
            generated_at,
            Some(question),
            Some(&input.insights_text),
            &policies,
            input.feedback.as_deref(),
        )
    }

    pub fn generate(&self, input: &AnswerInput) -> GeneratedAnswer {
        match now_rfc3339_utc() {
            Ok(ts) => self.generate_at(&ts, input),
            Err(e) => self.fallback(input, &e, 0, None),
        }
    }

    /// [`AnswerGenerator::generate`] with an explicit prompt timestamp.
    pub fn generate_at(&self, generated_at: &str, input: &AnswerInput) -> GeneratedAnswer {
        let model = match &self.llm {
            LlmState::Available(m) => m,
            LlmState::Unavailable(e) => {
                tracing::warn!(code = %e.code, "language model unavailable; using rule-based answer");
                return self.fallback(input, e, 0, None);
            }
        };

        let retrieved = self.retrieve_policies(&input.insights_text);
        let prompt = self.build_prompt(generated_at, input, &retrieved);
        let prompt_chars = prompt.chars().count();

        let reply = match model.generate(&prompt) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(code = %e.code, model = model.model_name(), "model call failed; using rule-based answer");
                return self.fallback(input, &e, retrieved.len(), Some(prompt_chars));
            }
        };

        match parse_sections(&reply) {
            Ok(answer) => GeneratedAnswer {
                answer,
                source: AnswerSource::Model,
                retrieved_policies: retrieved.len(),
                prompt_chars: Some(prompt_chars),
            },
            Err(e) => {
                tracing::warn!(
                    code = %e.code,
                    details = e.details.as_deref().unwrap_or(""),
                    "model reply incomplete; using rule-based answer"
                );
                self.fallback(input, &e, retrieved.len(), Some(prompt_chars))
            }
        }
    }

    fn fallback(
        &self,
        input: &AnswerInput,
        reason: &AppError,
        retrieved_policies: usize,
        prompt_chars: Option<usize>,
    ) -> GeneratedAnswer {
        GeneratedAnswer {
            answer: compose(&input.insights_text, &input.policies, input.feedback.as_deref()),
            source: AnswerSource::RuleBased {
                reason_code: reason.code.clone(),
            },
            retrieved_policies,
            prompt_chars,
        }
    }
}
