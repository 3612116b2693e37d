//! Data passed between pipeline steps and stored in the vector index.

use serde::{Deserialize, Serialize};

/// Source label used when a retrieved chunk carries none.
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// Deterministic id of the chunk at `position` of `source_id`.
///
/// Re-ingesting a source yields the same ids, so the index overwrites its
/// earlier chunks instead of duplicating them.
pub fn derive_chunk_id(source_id: &str, position: usize) -> String {
    uuid::Uuid::new_v5(
        &uuid::Uuid::NAMESPACE_URL,
        format!("{}:{}", source_id, position).as_bytes(),
    )
    .to_string()
}

/// Ordered text segments of one parsed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkBatch {
    pub chunks: Vec<String>,
    pub source_id: String,
}

/// Metadata stored next to each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub source: String,
    pub text: String,
}

/// One unit persisted in the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// A chunk returned by a nearest-neighbour query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub id: String,
    /// Cosine similarity to the query vector
    pub score: f32,
    pub source: Option<String>,
    pub text: Option<String>,
}

/// Result of `embed-and-upsert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub ingested: usize,
}

/// Result of `embed-and-search`.
///
/// `contexts[i]` was retrieved from `sources[i]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub contexts: Vec<String>,
    pub sources: Vec<String>,
}

/// Final result of the query workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub answer: String,
    pub sources: Vec<String>,
    pub num_contexts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ids_are_stable() {
        assert_eq!(derive_chunk_id("doc-A", 0), derive_chunk_id("doc-A", 0));
        assert_ne!(derive_chunk_id("doc-A", 0), derive_chunk_id("doc-A", 1));
        assert_ne!(derive_chunk_id("doc-A", 0), derive_chunk_id("doc-B", 0));
    }

    #[test]
    fn test_chunk_id_is_uuid_v5_of_source_and_position() {
        let expected =
            uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, b"doc-A:2").to_string();
        assert_eq!(derive_chunk_id("doc-A", 2), expected);
    }

    #[test]
    fn test_query_outcome_wire_shape() {
        let outcome = QueryOutcome {
            answer: "Level 1: ...".to_string(),
            sources: vec!["doc-A".to_string()],
            num_contexts: 1,
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"answer": "Level 1: ...", "sources": ["doc-A"], "num_contexts": 1})
        );
    }
}
