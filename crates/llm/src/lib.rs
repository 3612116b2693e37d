//! Answer-generation clients for ragstep.
//!
//! A provider-agnostic `LlmClient` trait over chat-style completion APIs.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **OpenAI / Groq**: Hosted OpenAI-compatible chat completions
//!
//! # Example
//! ```no_run
//! use ragstep_llm::{ChatMessage, LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("llama3.2", vec![ChatMessage::user("Hello, world!")]);
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

pub use client::{ChatMessage, ChatRole, LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiCompatClient};
pub use types::ProviderType;
