//! The ingestion and query workflows.

pub mod ingest;
pub mod prompt;
pub mod query;

pub use ingest::{IngestPdf, IngestRequest, LoadInput, INGEST_EVENT, INGEST_FUNCTION_ID};
pub use query::{
    AnswerInput, QueryPdf, QueryRequest, SearchInput, DEFAULT_CAREER_CHOICE, DEFAULT_TOP_K,
    QUERY_EVENT, QUERY_FUNCTION_ID,
};

use crate::services::RagServices;
use ragstep_workflow::WorkflowEngine;
use std::sync::Arc;

/// Register both workflows on `engine`.
pub fn register_workflows(engine: &mut WorkflowEngine, services: Arc<RagServices>) {
    engine.register(Arc::new(IngestPdf::new(services.clone())));
    engine.register(Arc::new(QueryPdf::new(services)));
}
