//! `rag/query_pdf_ai`: retrieve relevant chunks, then generate a grounded answer.

use crate::pipeline::prompt::build_messages;
use crate::services::RagServices;
use crate::types::{QueryOutcome, SearchOutcome, UNKNOWN_SOURCE};
use ragstep_core::{AppError, AppResult};
use ragstep_llm::{LlmRequest, LlmResponse};
use ragstep_workflow::{Event, StepContext, WorkflowFunction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const QUERY_EVENT: &str = "rag/query_pdf_ai";
pub const QUERY_FUNCTION_ID: &str = "rag-query-pdf";

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_CAREER_CHOICE: &str = "the career you provided";

/// Payload of a query event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub career_choice: Option<String>,
}

impl QueryRequest {
    /// Validate the payload and apply defaults.
    pub fn into_inputs(self) -> AppResult<(SearchInput, String)> {
        if self.question.trim().is_empty() {
            return Err(AppError::Validation("question must not be blank".to_string()));
        }

        let top_k = self.top_k.unwrap_or(DEFAULT_TOP_K);
        if top_k == 0 {
            return Err(AppError::Validation("top_k must be at least 1".to_string()));
        }

        let career_choice = self
            .career_choice
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CAREER_CHOICE.to_string());

        Ok((
            SearchInput {
                question: self.question,
                top_k,
            },
            career_choice,
        ))
    }
}

/// Input of `embed-and-search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchInput {
    pub question: String,
    pub top_k: usize,
}

/// Input of `llm-answer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerInput {
    pub question: String,
    pub career_choice: String,
    pub contexts: Vec<String>,
}

pub struct QueryPdf {
    services: Arc<RagServices>,
}

impl QueryPdf {
    pub fn new(services: Arc<RagServices>) -> Self {
        Self { services }
    }

    /// Embed the question and keep the non-blank nearest chunks.
    pub async fn embed_and_search(&self, input: SearchInput) -> AppResult<SearchOutcome> {
        let vector = self.services.embedder.embed(&input.question).await?;
        let hits = self.services.index.query(&vector, input.top_k).await?;

        let mut outcome = SearchOutcome::default();
        for hit in hits.into_iter().take(input.top_k) {
            let text = hit.text.as_deref().map(str::trim).unwrap_or_default();
            if text.is_empty() {
                tracing::debug!(id = %hit.id, "Skipping chunk without text");
                continue;
            }

            outcome.contexts.push(text.to_string());
            outcome.sources.push(
                hit.source
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
            );
        }

        tracing::info!(
            top_k = input.top_k,
            contexts = outcome.contexts.len(),
            "Retrieved contexts"
        );

        Ok(outcome)
    }

    /// Ask the generation model for an answer grounded in the contexts.
    pub async fn llm_answer(&self, input: AnswerInput) -> AppResult<LlmResponse> {
        if input.contexts.is_empty() {
            tracing::warn!("No contexts retrieved; the answer has nothing to ground on");
        }

        let messages = build_messages(&input.question, &input.career_choice, &input.contexts)?;
        let settings = &self.services.generation;
        let request = LlmRequest::new(settings.model.clone(), messages)
            .with_max_tokens(settings.max_tokens)
            .with_temperature(settings.temperature);

        let response = self.services.llm.complete(&request).await?;

        tracing::info!(
            provider = self.services.llm.provider_name(),
            model = %response.model,
            completion_tokens = response.usage.completion_tokens,
            "Generated answer"
        );

        Ok(response)
    }
}

#[async_trait::async_trait]
impl WorkflowFunction for QueryPdf {
    fn id(&self) -> &str {
        QUERY_FUNCTION_ID
    }

    fn trigger(&self) -> &str {
        QUERY_EVENT
    }

    async fn run(&self, ctx: &StepContext, event: &Event) -> AppResult<serde_json::Value> {
        let (search, career_choice) = event.payload::<QueryRequest>()?.into_inputs()?;
        let question = search.question.clone();

        let found: SearchOutcome = ctx
            .run("embed-and-search", search, |input| self.embed_and_search(input))
            .await?;

        let answer_input = AnswerInput {
            question,
            career_choice,
            contexts: found.contexts.clone(),
        };
        let completion: LlmResponse = ctx
            .run("llm-answer", answer_input, |input| self.llm_answer(input))
            .await?;

        let outcome = QueryOutcome {
            answer: completion.content.trim().to_string(),
            num_contexts: found.contexts.len(),
            sources: found.sources,
        };

        Ok(serde_json::to_value(outcome)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(top_k: Option<usize>, career_choice: Option<&str>) -> QueryRequest {
        QueryRequest {
            question: "What skills are needed?".to_string(),
            top_k,
            career_choice: career_choice.map(str::to_string),
        }
    }

    #[test]
    fn test_defaults_applied() {
        let (search, career) = request(None, None).into_inputs().unwrap();
        assert_eq!(search.top_k, DEFAULT_TOP_K);
        assert_eq!(career, DEFAULT_CAREER_CHOICE);

        let (search, career) = request(Some(2), Some("backend developer"))
            .into_inputs()
            .unwrap();
        assert_eq!(search.top_k, 2);
        assert_eq!(career, "backend developer");
    }

    #[test]
    fn test_invalid_requests() {
        assert!(matches!(
            request(Some(0), None).into_inputs(),
            Err(AppError::Validation(_))
        ));

        let blank = QueryRequest {
            question: " \n".to_string(),
            top_k: None,
            career_choice: None,
        };
        assert!(matches!(blank.into_inputs(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_payload_decoding() {
        let event = Event::new(QUERY_EVENT, serde_json::json!({"question": "Why?", "top_k": -1}));
        assert!(matches!(
            event.payload::<QueryRequest>(),
            Err(AppError::Validation(_))
        ));
    }
}
