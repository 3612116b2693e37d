//! LanceDB-backed vector index.

use crate::types::{ChunkRecord, ScoredChunk};
use crate::vector_index::VectorIndex;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use ragstep_core::{AppError, AppResult};
use std::path::Path;
use std::sync::Arc;

/// On-disk vector index; upserts merge on the `id` column.
pub struct LanceDbIndex {
    table: Table,
    dimensions: usize,
}

impl LanceDbIndex {
    /// Open the table `table_name` under `db_path`, creating it if missing.
    pub async fn open(db_path: &Path, table_name: &str, dimensions: usize) -> AppResult<Self> {
        std::fs::create_dir_all(db_path).map_err(|e| {
            AppError::Config(format!("Failed to create index directory {:?}: {}", db_path, e))
        })?;

        let uri = db_path.to_string_lossy().to_string();
        let conn = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| AppError::IndexWrite(format!("Failed to connect to LanceDB: {}", e)))?;

        let table_names = conn
            .table_names()
            .execute()
            .await
            .map_err(|e| AppError::IndexQuery(format!("Failed to list tables: {}", e)))?;

        let table = if table_names.iter().any(|name| name == table_name) {
            conn.open_table(table_name)
                .execute()
                .await
                .map_err(|e| AppError::IndexQuery(format!("Failed to open table: {}", e)))?
        } else {
            let schema = Self::schema(dimensions);
            let empty = RecordBatch::new_empty(schema.clone());

            conn.create_table(
                table_name,
                RecordBatchIterator::new(vec![Ok(empty)], schema),
            )
            .execute()
            .await
            .map_err(|e| AppError::IndexWrite(format!("Failed to create table: {}", e)))?
        };

        tracing::debug!("Opened LanceDB table '{}' at {:?}", table_name, db_path);

        Ok(Self { table, dimensions })
    }

    fn schema(dimensions: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, true),
            Field::new("text", DataType::Utf8, true),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimensions as i32,
                ),
                false,
            ),
        ]))
    }

    fn to_batch(&self, records: &[ChunkRecord]) -> AppResult<RecordBatch> {
        let mut values = Vec::with_capacity(records.len() * self.dimensions);
        for record in records {
            if record.vector.len() != self.dimensions {
                return Err(AppError::IndexWrite(format!(
                    "Vector for {} has {} dimensions, index expects {}",
                    record.id,
                    record.vector.len(),
                    self.dimensions
                )));
            }
            values.extend_from_slice(&record.vector);
        }

        let ids = StringArray::from(records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>());
        let sources = StringArray::from(
            records
                .iter()
                .map(|r| Some(r.payload.source.as_str()))
                .collect::<Vec<_>>(),
        );
        let texts = StringArray::from(
            records
                .iter()
                .map(|r| Some(r.payload.text.as_str()))
                .collect::<Vec<_>>(),
        );
        let vectors = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            self.dimensions as i32,
            Arc::new(Float32Array::from(values)),
            None,
        )
        .map_err(|e| AppError::IndexWrite(format!("Failed to build vector column: {}", e)))?;

        RecordBatch::try_new(
            Self::schema(self.dimensions),
            vec![
                Arc::new(ids),
                Arc::new(sources),
                Arc::new(texts),
                Arc::new(vectors),
            ],
        )
        .map_err(|e| AppError::IndexWrite(format!("Failed to create RecordBatch: {}", e)))
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| AppError::IndexQuery(format!("Invalid {} column", name)))
}

fn optional_string(column: &StringArray, row: usize) -> Option<String> {
    if column.is_null(row) {
        None
    } else {
        Some(column.value(row).to_string())
    }
}

#[async_trait::async_trait]
impl VectorIndex for LanceDbIndex {
    fn backend_name(&self) -> &str {
        "lancedb"
    }

    async fn upsert(&self, records: &[ChunkRecord]) -> AppResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let batch = self.to_batch(records)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let mut merge = self.table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| AppError::IndexWrite(format!("Failed to upsert chunks: {}", e)))?;

        tracing::debug!("Upserted {} chunks into LanceDB", records.len());
        Ok(())
    }

    async fn query(&self, vector: &[f32], limit: usize) -> AppResult<Vec<ScoredChunk>> {
        if vector.len() != self.dimensions {
            return Err(AppError::IndexQuery(format!(
                "Query vector has {} dimensions, index expects {}",
                vector.len(),
                self.dimensions
            )));
        }

        let batches: Vec<RecordBatch> = self
            .table
            .query()
            .nearest_to(vector.to_vec())
            .map_err(|e| AppError::IndexQuery(format!("Failed to create query: {}", e)))?
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| AppError::IndexQuery(format!("Failed to execute search: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| AppError::IndexQuery(format!("Failed to collect results: {}", e)))?;

        let mut hits = Vec::new();
        for batch in &batches {
            let ids = string_column(batch, "id")?;
            let sources = string_column(batch, "source")?;
            let texts = string_column(batch, "text")?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

            for row in 0..batch.num_rows() {
                let score = distances.map(|d| 1.0 - d.value(row)).unwrap_or(0.0);
                hits.push(ScoredChunk {
                    id: ids.value(row).to_string(),
                    score,
                    source: optional_string(sources, row),
                    text: optional_string(texts, row),
                });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);

        tracing::debug!("Retrieved {} chunks (requested top-{})", hits.len(), limit);
        Ok(hits)
    }

    async fn count(&self) -> AppResult<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| AppError::IndexQuery(format!("Failed to count rows: {}", e)))
    }
}
