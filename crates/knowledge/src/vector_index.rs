//! Vector index abstraction for knowledge chunks.

use crate::lancedb_index::LanceDbIndex;
use crate::types::{ChunkRecord, ScoredChunk};
use ragstep_core::{AppConfig, AppError, AppResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Trait for vector index backends.
///
/// `upsert` is keyed by record id: writing an id that already exists
/// replaces the stored vector and payload.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    fn backend_name(&self) -> &str;

    /// Insert or replace all records in one batch.
    async fn upsert(&self, records: &[ChunkRecord]) -> AppResult<()>;

    /// The `limit` nearest records to `vector`, most similar first.
    async fn query(&self, vector: &[f32], limit: usize) -> AppResult<Vec<ScoredChunk>>;

    /// Number of stored records.
    async fn count(&self) -> AppResult<usize>;
}

/// Open the backend named in the configuration.
pub async fn open_index(config: &AppConfig) -> AppResult<Arc<dyn VectorIndex>> {
    match config.index.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryIndex::new())),
        "lancedb" => Ok(Arc::new(
            LanceDbIndex::open(
                &config.index_path(),
                &config.index.table,
                config.embedding.dimensions,
            )
            .await?,
        )),
        other => Err(AppError::Config(format!(
            "Unknown index backend: '{}'. Supported backends: lancedb, memory",
            other
        ))),
    }
}

/// Cosine similarity; 0.0 when either vector is zero or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Index held in memory, for tests and throwaway runs.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    records: RwLock<HashMap<String, ChunkRecord>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<ChunkRecord> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait::async_trait]
impl VectorIndex for MemoryIndex {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, records: &[ChunkRecord]) -> AppResult<()> {
        let mut stored = self.records.write().await;
        for record in records {
            stored.insert(record.id.clone(), record.clone());
        }
        tracing::debug!("Upserted {} records into memory index", records.len());
        Ok(())
    }

    async fn query(&self, vector: &[f32], limit: usize) -> AppResult<Vec<ScoredChunk>> {
        let stored = self.records.read().await;

        let mut scored: Vec<ScoredChunk> = stored
            .values()
            .map(|record| ScoredChunk {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.vector),
                source: Some(record.payload.source.clone()),
                text: Some(record.payload.text.clone()),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self.records.read().await.len())
    }
}
