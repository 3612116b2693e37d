//! End-to-end runs of both workflows against offline collaborators.

use crate::embeddings::{EmbeddingProvider, MockProvider};
use crate::parser::DocumentParser;
use crate::pipeline::{register_workflows, INGEST_EVENT, INGEST_FUNCTION_ID, QUERY_EVENT};
use crate::services::RagServices;
use crate::types::{derive_chunk_id, ChunkPayload, ChunkRecord};
use crate::vector_index::{MemoryIndex, VectorIndex};
use chrono::Utc;
use ragstep_core::config::{ChunkingSettings, LlmSettings};
use ragstep_core::{AppError, AppResult};
use ragstep_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use ragstep_workflow::{
    fingerprint, instance_id_for, Event, MemoryStepStore, RetryPolicy, RunRecord, RunStatus,
    SqliteStepStore, StepRecord, StepStore, WorkflowEngine,
};
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// 24 characters: three chunks with size 10 and overlap 2.
const THREE_CHUNK_TEXT: &str = "abcdefghijklmnopqrstuvwx";

/// Returns fixed text; fails while `failures` is positive.
#[derive(Default)]
struct FixedParser {
    text: String,
    calls: AtomicU32,
    failures: AtomicU32,
}

impl FixedParser {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }
}

impl DocumentParser for FixedParser {
    fn parse(&self, path: &Path) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(AppError::DocumentUnreadable(format!(
                "{}: corrupt xref table",
                path.display()
            )));
        }
        Ok(self.text.clone())
    }
}

/// Replies with a fixed answer and keeps every request.
#[derive(Default)]
struct ScriptedLlm {
    answer: String,
    failures: AtomicU32,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(AppError::GenerationProvider("503 Service Unavailable".to_string()));
        }
        Ok(LlmResponse {
            content: self.answer.clone(),
            model: request.model.clone(),
            usage: LlmUsage::new(100, 20),
        })
    }
}

struct Harness {
    parser: Arc<FixedParser>,
    llm: Arc<ScriptedLlm>,
    index: Arc<MemoryIndex>,
    embedder: Arc<MockProvider>,
    engine: WorkflowEngine,
}

fn harness_with_store(parser: FixedParser, store: Arc<dyn StepStore>) -> Harness {
    let parser = Arc::new(parser);
    let llm = Arc::new(ScriptedLlm::new("  Level 1: learn SQL.\n"));
    let index = Arc::new(MemoryIndex::new());
    let embedder = Arc::new(MockProvider::new(64));

    let services = Arc::new(RagServices {
        parser: parser.clone(),
        embedder: embedder.clone(),
        index: index.clone(),
        llm: llm.clone(),
        chunking: ChunkingSettings {
            chunk_size: 10,
            chunk_overlap: 2,
        },
        generation: LlmSettings::default(),
    });

    let mut engine = WorkflowEngine::new(store, RetryPolicy::immediate(3));
    register_workflows(&mut engine, services);

    Harness {
        parser,
        llm,
        index,
        embedder,
        engine,
    }
}

fn harness(parser: FixedParser) -> Harness {
    harness_with_store(parser, Arc::new(MemoryStepStore::new()))
}

fn ingest_event(source_id: &str) -> Event {
    Event::new(INGEST_EVENT, json!({"pdf_path": "cv.pdf", "source_id": source_id}))
}

async fn run_one(engine: &WorkflowEngine, event: Event) -> RunStatus {
    let mut statuses = engine.send_and_wait(event).await.unwrap();
    assert_eq!(statuses.len(), 1);
    statuses.remove(0)
}

#[tokio::test]
async fn test_ingest_three_chunk_document() {
    let h = harness(FixedParser::new(THREE_CHUNK_TEXT));

    let output = run_one(&h.engine, ingest_event("doc-A"))
        .await
        .into_output()
        .unwrap();
    assert_eq!(output, json!({"ingested": 3}));

    let mut expected: Vec<String> = (0..3).map(|i| derive_chunk_id("doc-A", i)).collect();
    expected.sort();
    assert_eq!(h.index.ids().await, expected);

    let first = h.index.get(&derive_chunk_id("doc-A", 0)).await.unwrap();
    assert_eq!(first.payload.text, "abcdefghij");
    assert_eq!(first.payload.source, "doc-A");
}

#[tokio::test]
async fn test_reingesting_a_source_overwrites() {
    let h = harness(FixedParser::new(THREE_CHUNK_TEXT));

    for _ in 0..2 {
        let output = run_one(&h.engine, ingest_event("doc-A"))
            .await
            .into_output()
            .unwrap();
        assert_eq!(output, json!({"ingested": 3}));
    }

    assert_eq!(h.parser.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.index.count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_blank_runs_are_not_stored_as_chunks() {
    let text = format!(
        "Skills: SQL.{}Rust, Go.{}",
        " ".repeat(30),
        " \n".repeat(20)
    );
    let h = harness(FixedParser::new(&text));

    let output = run_one(&h.engine, ingest_event("doc-A"))
        .await
        .into_output()
        .unwrap();

    // "Skills: SQL. Rust, Go." is 22 characters: windows 0..10, 8..18, 16..22.
    assert_eq!(output, json!({"ingested": 3}));
    assert_eq!(h.index.count().await.unwrap(), 3);

    for id in h.index.ids().await {
        let record = h.index.get(&id).await.unwrap();
        assert!(!record.payload.text.trim().is_empty());
    }
    let last = h.index.get(&derive_chunk_id("doc-A", 2)).await.unwrap();
    assert_eq!(last.payload.text, "t, Go.");
}

#[tokio::test]
async fn test_source_id_defaults_to_document_path() {
    let h = harness(FixedParser::new(THREE_CHUNK_TEXT));

    run_one(&h.engine, Event::new(INGEST_EVENT, json!({"pdf_path": "cv.pdf"})))
        .await
        .into_output()
        .unwrap();

    let record = h.index.get(&derive_chunk_id("cv.pdf", 2)).await.unwrap();
    assert_eq!(record.payload.source, "cv.pdf");
}

#[tokio::test]
async fn test_query_skips_chunks_without_text() {
    let h = harness(FixedParser::new(THREE_CHUNK_TEXT));
    let question = "What skills are needed?";
    let near = h.embedder.embed(question).await.unwrap();

    h.index
        .upsert(&[
            ChunkRecord {
                id: "matching".to_string(),
                vector: near.clone(),
                payload: ChunkPayload {
                    source: "doc-A".to_string(),
                    text: "  Skills needed: SQL, Rust and systems design.  ".to_string(),
                },
            },
            ChunkRecord {
                id: "blank".to_string(),
                vector: near,
                payload: ChunkPayload {
                    source: "doc-A".to_string(),
                    text: "   ".to_string(),
                },
            },
        ])
        .await
        .unwrap();

    let event = Event::new(
        QUERY_EVENT,
        json!({"question": question, "top_k": 2, "career_choice": "data engineer"}),
    );
    let handles = h.engine.send(event).await.unwrap();
    let instance = handles[0].instance_id().to_string();
    let output = handles
        .into_iter()
        .next()
        .unwrap()
        .wait()
        .await
        .into_output()
        .unwrap();

    assert_eq!(
        output,
        json!({
            "answer": "Level 1: learn SQL.",
            "sources": ["doc-A"],
            "num_contexts": 1
        })
    );

    let search = h
        .engine
        .steps(&instance)
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.step == "embed-and-search")
        .unwrap();
    assert_eq!(
        search.output["contexts"],
        json!(["Skills needed: SQL, Rust and systems design."])
    );

    let requests = h.llm.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].max_tokens, Some(1024));
    assert_eq!(requests[0].temperature, Some(0.2));
    let user = &requests[0].messages[1].content;
    assert!(user.contains("Career choice: data engineer"));
    assert!(user.contains("- Skills needed: SQL, Rust and systems design."));
}

#[tokio::test]
async fn test_missing_source_reported_as_unknown() {
    let h = harness(FixedParser::new(THREE_CHUNK_TEXT));
    let vector = h.embedder.embed("roadmap").await.unwrap();

    h.index
        .upsert(&[ChunkRecord {
            id: "orphan".to_string(),
            vector,
            payload: ChunkPayload {
                source: String::new(),
                text: "Roadmap: junior to principal.".to_string(),
            },
        }])
        .await
        .unwrap();

    let output = run_one(
        &h.engine,
        Event::new(QUERY_EVENT, json!({"question": "roadmap"})),
    )
    .await
    .into_output()
    .unwrap();

    assert_eq!(output["sources"], json!(["Unknown"]));
    assert_eq!(output["num_contexts"], 1);
}

#[tokio::test]
async fn test_ingest_then_query() {
    let h = harness(FixedParser::new(
        "Backend engineers need SQL. Senior engineers need systems design and mentoring.",
    ));

    run_one(&h.engine, ingest_event("resume"))
        .await
        .into_output()
        .unwrap();

    let output = run_one(
        &h.engine,
        Event::new(QUERY_EVENT, json!({"question": "What do senior engineers need?", "top_k": 3})),
    )
    .await
    .into_output()
    .unwrap();

    let sources = output["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 3);
    assert_eq!(output["num_contexts"], 3);
    assert!(sources.iter().all(|s| s == "resume"));
}

#[tokio::test]
async fn test_redelivered_query_does_not_call_model_again() {
    let h = harness(FixedParser::new(THREE_CHUNK_TEXT));
    let event = Event::new(QUERY_EVENT, json!({"question": "What skills are needed?"}))
        .with_id("evt-query-1");

    let first = run_one(&h.engine, event.clone()).await;
    let second = run_one(&h.engine, event).await;

    assert_eq!(first, second);
    assert_eq!(h.llm.calls(), 1);
}

#[tokio::test]
async fn test_flaky_model_recovers_within_retry_bound() {
    let h = harness(FixedParser::new(THREE_CHUNK_TEXT));
    h.llm.failures.store(2, Ordering::SeqCst);

    let handles = h
        .engine
        .send(Event::new(QUERY_EVENT, json!({"question": "What skills are needed?"})))
        .await
        .unwrap();
    let instance = handles[0].instance_id().to_string();
    let status = handles.into_iter().next().unwrap().wait().await;

    assert!(matches!(status, RunStatus::Completed { .. }));
    assert_eq!(h.llm.calls(), 3);

    let steps = h.engine.steps(&instance).await.unwrap();
    let answer = steps.iter().find(|s| s.step == "llm-answer").unwrap();
    assert_eq!(answer.attempts, 3);
}

#[tokio::test]
async fn test_unreadable_document_fails_the_run() {
    let parser = FixedParser::new(THREE_CHUNK_TEXT);
    parser.failures.store(100, Ordering::SeqCst);
    let h = harness(parser);

    let handles = h.engine.send(ingest_event("doc-A")).await.unwrap();
    let instance = handles[0].instance_id().to_string();
    let status = handles.into_iter().next().unwrap().wait().await;

    match status {
        RunStatus::Failed { error } => {
            assert!(error.contains("load-and-chunk"));
            assert!(error.contains("Document unreadable"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(h.parser.calls.load(Ordering::SeqCst), 3);
    assert!(h.engine.steps(&instance).await.unwrap().is_empty());
    assert_eq!(h.index.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_query_payload_fails_without_steps() {
    let h = harness(FixedParser::new(THREE_CHUNK_TEXT));

    let handles = h
        .engine
        .send(Event::new(QUERY_EVENT, json!({"question": "Why?", "top_k": 0})))
        .await
        .unwrap();
    let instance = handles[0].instance_id().to_string();
    let status = handles.into_iter().next().unwrap().wait().await;

    assert!(matches!(status, RunStatus::Failed { .. }));
    assert!(h.engine.steps(&instance).await.unwrap().is_empty());
    assert_eq!(h.llm.calls(), 0);
}

#[tokio::test]
async fn test_crashed_ingestion_resumes_without_parsing_again() {
    let store = Arc::new(MemoryStepStore::new());
    let h = harness_with_store(FixedParser::new(THREE_CHUNK_TEXT), store.clone());

    // A previous process recorded load-and-chunk, then died.
    let event = ingest_event("doc-A").with_id("evt-crash");
    let instance = instance_id_for(INGEST_FUNCTION_ID, &event.id);
    store
        .save_run(&RunRecord::started(&instance, INGEST_FUNCTION_ID, &event))
        .await
        .unwrap();
    store
        .save_step(&StepRecord {
            instance_id: instance.clone(),
            step: "load-and-chunk".to_string(),
            output: json!({"chunks": ["recorded one", "recorded two"], "source_id": "doc-A"}),
            input_hash: fingerprint(&json!({"pdf_path": "cv.pdf", "source_id": "doc-A"}))
                .unwrap(),
            attempts: 1,
            recorded_at: Utc::now(),
        })
        .await
        .unwrap();

    let output = run_one(&h.engine, event).await.into_output().unwrap();

    assert_eq!(output, json!({"ingested": 2}));
    assert_eq!(h.parser.calls.load(Ordering::SeqCst), 0);
    let second = h.index.get(&derive_chunk_id("doc-A", 1)).await.unwrap();
    assert_eq!(second.payload.text, "recorded two");
}

#[tokio::test]
async fn test_completed_ingestion_survives_restart() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("steps.sqlite");
    let event = ingest_event("doc-A").with_id("evt-durable");

    let first = {
        let store = Arc::new(SqliteStepStore::open(&db).unwrap());
        let h = harness_with_store(FixedParser::new(THREE_CHUNK_TEXT), store);
        let status = run_one(&h.engine, event.clone()).await;
        assert_eq!(h.parser.calls.load(Ordering::SeqCst), 1);
        status
    };

    let store = Arc::new(SqliteStepStore::open(&db).unwrap());
    let h = harness_with_store(FixedParser::new(THREE_CHUNK_TEXT), store);
    let second = run_one(&h.engine, event).await;

    assert_eq!(first, second);
    assert_eq!(h.parser.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.engine.runs().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_ingestion_of_distinct_sources() {
    let h = harness(FixedParser::new(THREE_CHUNK_TEXT));

    let (a, b) = tokio::join!(
        h.engine.send_and_wait(ingest_event("doc-A")),
        h.engine.send_and_wait(ingest_event("doc-B")),
    );
    assert!(matches!(a.unwrap()[0], RunStatus::Completed { .. }));
    assert!(matches!(b.unwrap()[0], RunStatus::Completed { .. }));

    let mut expected: Vec<String> = ["doc-A", "doc-B"]
        .iter()
        .flat_map(|s| (0..3).map(move |i| derive_chunk_id(s, i)))
        .collect();
    expected.sort();
    assert_eq!(h.index.ids().await, expected);
}
