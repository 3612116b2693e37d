//! LLM provider factory.
//!
//! Builds the answer-generation client once from configuration so it can be
//! injected into the query pipeline.

use crate::client::LlmClient;
use crate::providers::{
    ollama::DEFAULT_OLLAMA_URL,
    openai::{GROQ_BASE_URL, OPENAI_BASE_URL},
    OllamaClient, OpenAiCompatClient,
};
use crate::types::ProviderType;
use ragstep_core::{AppError, AppResult};
use std::sync::Arc;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama", "openai", "groq")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - API key (required by hosted providers)
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown or a required key
/// is missing.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn LlmClient>> {
    let provider_type = ProviderType::parse(provider)
        .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;

    if provider_type.requires_api_key() && api_key.is_none() {
        return Err(AppError::Config(format!(
            "{} provider requires API key",
            provider_type.as_str()
        )));
    }

    match provider_type {
        ProviderType::Ollama => Ok(Arc::new(OllamaClient::with_base_url(
            endpoint.unwrap_or(DEFAULT_OLLAMA_URL),
        ))),
        ProviderType::OpenAI => Ok(Arc::new(OpenAiCompatClient::new(
            "openai",
            endpoint.unwrap_or(OPENAI_BASE_URL),
            api_key.unwrap_or_default(),
        )?)),
        ProviderType::Groq => Ok(Arc::new(OpenAiCompatClient::new(
            "groq",
            endpoint.unwrap_or(GROQ_BASE_URL),
            api_key.unwrap_or_default(),
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ollama_client() {
        let client = create_client("ollama", None, None).unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_create_groq_client() {
        let client = create_client("groq", None, Some("gsk_test")).unwrap();
        assert_eq!(client.provider_name(), "groq");
    }

    #[test]
    fn test_groq_requires_api_key() {
        match create_client("groq", None, None) {
            Err(err) => assert!(err.to_string().contains("requires API key")),
            Ok(_) => panic!("Expected error for Groq without API key"),
        }
    }

    #[test]
    fn test_unknown_provider() {
        match create_client("unknown", None, None) {
            Err(err) => assert!(err.to_string().contains("Unknown provider")),
            Ok(_) => panic!("Expected error for unknown provider"),
        }
    }
}
