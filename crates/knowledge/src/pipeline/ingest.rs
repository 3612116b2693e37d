//! `rag/ingest_pdf`: parse and chunk a document, then embed and upsert it.

use crate::chunker::{chunk_text, normalize_whitespace};
use crate::services::RagServices;
use crate::types::{derive_chunk_id, ChunkBatch, ChunkPayload, ChunkRecord, UpsertOutcome};
use ragstep_core::{AppError, AppResult};
use ragstep_workflow::{Event, StepContext, WorkflowFunction};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub const INGEST_EVENT: &str = "rag/ingest_pdf";
pub const INGEST_FUNCTION_ID: &str = "rag-ingest-pdf";

/// Payload of an ingestion event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub pdf_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl IngestRequest {
    /// Validate the payload; the source id defaults to the document path.
    pub fn into_load_input(self) -> AppResult<LoadInput> {
        if self.pdf_path.trim().is_empty() {
            return Err(AppError::Validation("pdf_path must not be blank".to_string()));
        }

        let source_id = match self.source_id {
            Some(id) if id.trim().is_empty() => {
                return Err(AppError::Validation("source_id must not be blank".to_string()))
            }
            Some(id) => id,
            None => self.pdf_path.clone(),
        };

        Ok(LoadInput {
            pdf_path: self.pdf_path,
            source_id,
        })
    }
}

/// Input of `load-and-chunk`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadInput {
    pub pdf_path: String,
    pub source_id: String,
}

pub struct IngestPdf {
    services: Arc<RagServices>,
}

impl IngestPdf {
    pub fn new(services: Arc<RagServices>) -> Self {
        Self { services }
    }

    /// Parse the document and split it into overlapping segments.
    ///
    /// Whitespace runs are collapsed before chunking, and a segment that is
    /// still blank is dropped, so every stored chunk carries text.
    pub async fn load_and_chunk(&self, input: LoadInput) -> AppResult<ChunkBatch> {
        let parser = self.services.parser.clone();
        let path = PathBuf::from(&input.pdf_path);

        let raw = tokio::task::spawn_blocking(move || parser.parse(&path))
            .await
            .map_err(|e| AppError::DocumentUnreadable(format!("Parser task failed: {}", e)))??;
        let text = normalize_whitespace(&raw);

        let chunks: Vec<String> = chunk_text(
            &text,
            self.services.chunking.chunk_size,
            self.services.chunking.chunk_overlap,
        )?
        .into_iter()
        .filter(|chunk| !chunk.trim().is_empty())
        .collect();

        if chunks.is_empty() {
            return Err(AppError::DocumentUnreadable(format!(
                "{}: no text to chunk",
                input.pdf_path
            )));
        }

        tracing::info!(
            source_id = %input.source_id,
            raw_chars = raw.chars().count(),
            chars = text.chars().count(),
            chunks = chunks.len(),
            "Loaded and chunked document"
        );

        Ok(ChunkBatch {
            chunks,
            source_id: input.source_id,
        })
    }

    /// Embed every segment in one call and upsert them in one batch.
    pub async fn embed_and_upsert(&self, batch: ChunkBatch) -> AppResult<UpsertOutcome> {
        let vectors = self.services.embedder.embed_batch(&batch.chunks).await?;

        if vectors.len() != batch.chunks.len() {
            return Err(AppError::EmbeddingProvider(format!(
                "Expected {} embeddings, got {}",
                batch.chunks.len(),
                vectors.len()
            )));
        }

        let records: Vec<ChunkRecord> = batch
            .chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(position, (text, vector))| ChunkRecord {
                id: derive_chunk_id(&batch.source_id, position),
                vector,
                payload: ChunkPayload {
                    source: batch.source_id.clone(),
                    text,
                },
            })
            .collect();

        self.services.index.upsert(&records).await?;

        tracing::info!(
            source_id = %batch.source_id,
            ingested = records.len(),
            "Upserted chunks"
        );

        Ok(UpsertOutcome {
            ingested: records.len(),
        })
    }
}

#[async_trait::async_trait]
impl WorkflowFunction for IngestPdf {
    fn id(&self) -> &str {
        INGEST_FUNCTION_ID
    }

    fn trigger(&self) -> &str {
        INGEST_EVENT
    }

    async fn run(&self, ctx: &StepContext, event: &Event) -> AppResult<serde_json::Value> {
        let input = event.payload::<IngestRequest>()?.into_load_input()?;

        let batch: ChunkBatch = ctx
            .run("load-and-chunk", input, |input| self.load_and_chunk(input))
            .await?;

        let outcome: UpsertOutcome = ctx
            .run("embed-and-upsert", batch, |batch| self.embed_and_upsert(batch))
            .await?;

        Ok(serde_json::to_value(outcome)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_defaults_to_path() {
        let input = IngestRequest {
            pdf_path: "docs/cv.pdf".to_string(),
            source_id: None,
        }
        .into_load_input()
        .unwrap();
        assert_eq!(input.source_id, "docs/cv.pdf");

        let input = IngestRequest {
            pdf_path: "docs/cv.pdf".to_string(),
            source_id: Some("doc-A".to_string()),
        }
        .into_load_input()
        .unwrap();
        assert_eq!(input.source_id, "doc-A");
    }

    #[test]
    fn test_blank_fields_are_rejected() {
        let blank_path = IngestRequest {
            pdf_path: "  ".to_string(),
            source_id: None,
        };
        assert!(matches!(
            blank_path.into_load_input(),
            Err(AppError::Validation(_))
        ));

        let blank_source = IngestRequest {
            pdf_path: "cv.pdf".to_string(),
            source_id: Some(String::new()),
        };
        assert!(matches!(
            blank_source.into_load_input(),
            Err(AppError::Validation(_))
        ));
    }
}
