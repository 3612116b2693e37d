//! Collaborators shared by the ingestion and query workflows.

use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::parser::{DocumentParser, FileParser};
use crate::vector_index::{open_index, VectorIndex};
use ragstep_core::config::{ChunkingSettings, LlmSettings};
use ragstep_core::{AppConfig, AppResult};
use ragstep_llm::{create_client, LlmClient};
use std::sync::Arc;

/// External clients, built once and handed to both pipelines.
///
/// Tests assemble this directly with fakes; the CLI uses `from_config`.
#[derive(Clone)]
pub struct RagServices {
    pub parser: Arc<dyn DocumentParser>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub index: Arc<dyn VectorIndex>,
    pub llm: Arc<dyn LlmClient>,
    pub chunking: ChunkingSettings,
    pub generation: LlmSettings,
}

impl RagServices {
    pub async fn from_config(config: &AppConfig) -> AppResult<Self> {
        let embedder = create_provider(&config.embedding)?;
        let index = open_index(config).await?;

        let api_key = config.resolve_api_key();
        let llm = create_client(
            &config.llm.provider,
            config.llm.endpoint.as_deref(),
            api_key.as_deref(),
        )?;

        tracing::info!(
            embedder = embedder.provider_name(),
            index = index.backend_name(),
            llm = llm.provider_name(),
            "Initialized pipeline services"
        );

        Ok(Self {
            parser: Arc::new(FileParser::new()),
            embedder,
            index,
            llm,
            chunking: config.chunking.clone(),
            generation: config.llm.clone(),
        })
    }
}
