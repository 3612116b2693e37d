//! Command handlers for the ragstep CLI.
//!
//! Every command talks to the same durable step store under `.ragstep/`,
//! so runs started by one invocation are visible to the next.

pub mod ingest;
pub mod query;
pub mod resume;
pub mod runs;
pub mod send;

// Re-export command types for convenience
pub use ingest::IngestCommand;
pub use query::QueryCommand;
pub use resume::ResumeCommand;
pub use runs::RunsCommand;
pub use send::SendCommand;

use ragstep_core::{AppConfig, AppResult};
use ragstep_knowledge::{register_workflows, RagServices};
use ragstep_workflow::{RetryPolicy, RunHandle, RunStatus, SqliteStepStore, WorkflowEngine};
use std::sync::Arc;

/// Engine over the workspace step store, with no workflows registered.
///
/// Enough for inspecting runs; nothing is dispatched through it.
pub fn open_store_engine(config: &AppConfig) -> AppResult<WorkflowEngine> {
    let store = Arc::new(SqliteStepStore::open(&config.step_store_path())?);
    Ok(WorkflowEngine::new(
        store,
        RetryPolicy::from_settings(&config.workflow),
    ))
}

/// Engine with both RAG workflows registered against the configured clients.
pub async fn open_engine(config: &AppConfig) -> AppResult<WorkflowEngine> {
    let mut engine = open_store_engine(config)?;
    let services = Arc::new(RagServices::from_config(config).await?);
    register_workflows(&mut engine, services);
    Ok(engine)
}

/// Wait for every handle, keeping the ids next to each status.
pub async fn wait_all(handles: Vec<RunHandle>) -> Vec<(String, String, RunStatus)> {
    futures::future::join_all(handles.into_iter().map(|handle| async move {
        let instance_id = handle.instance_id().to_string();
        let function_id = handle.function_id().to_string();
        (instance_id, function_id, handle.wait().await)
    }))
    .await
}

/// JSON summary of one finished instance.
pub fn run_summary(instance_id: &str, function_id: &str, status: &RunStatus) -> serde_json::Value {
    let mut summary = serde_json::json!({
        "instanceId": instance_id,
        "functionId": function_id,
        "status": status.label(),
    });

    match status {
        RunStatus::Completed { output } => summary["output"] = output.clone(),
        RunStatus::Failed { error } => summary["error"] = serde_json::json!(error),
        RunStatus::Running => {}
    }

    summary
}

/// One human-readable line per instance.
pub fn status_line(instance_id: &str, function_id: &str, status: &RunStatus) -> String {
    match status {
        RunStatus::Completed { output } => {
            format!("{}  {}  completed  {}", instance_id, function_id, output)
        }
        RunStatus::Failed { error } => format!("{}  {}  failed  {}", instance_id, function_id, error),
        RunStatus::Running => format!("{}  {}  running", instance_id, function_id),
    }
}
