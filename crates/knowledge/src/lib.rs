//! Retrieval-augmented generation over local documents.
//!
//! Two durable workflows run on the `ragstep-workflow` engine:
//! `rag/ingest_pdf` turns a document into embedded chunks in a vector index,
//! and `rag/query_pdf_ai` answers a question from the nearest chunks.

pub mod chunker;
pub mod discover;
pub mod embeddings;
pub mod lancedb_index;
pub mod parser;
pub mod pipeline;
pub mod services;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use chunker::{chunk_text, normalize_whitespace};
pub use discover::discover_documents;
pub use embeddings::{create_provider, EmbeddingProvider, MockProvider, OllamaProvider};
pub use lancedb_index::LanceDbIndex;
pub use parser::{ContentType, DocumentParser, FileParser};
pub use pipeline::{
    register_workflows, IngestRequest, QueryRequest, INGEST_EVENT, INGEST_FUNCTION_ID,
    QUERY_EVENT, QUERY_FUNCTION_ID,
};
pub use services::RagServices;
pub use types::{
    derive_chunk_id, ChunkBatch, ChunkPayload, ChunkRecord, QueryOutcome, ScoredChunk,
    SearchOutcome, UpsertOutcome,
};
pub use vector_index::{open_index, MemoryIndex, VectorIndex};
