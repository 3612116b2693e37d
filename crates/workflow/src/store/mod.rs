//! Durable state of workflow runs and their memoized steps.

mod memory;
mod sqlite;

pub use memory::MemoryStepStore;
pub use sqlite::SqliteStepStore;

use crate::event::Event;
use chrono::{DateTime, Utc};
use ragstep_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Lifecycle of one workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed { output: serde_json::Value },
    Failed { error: String },
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed { .. } => "completed",
            RunStatus::Failed { .. } => "failed",
        }
    }

    /// The run output, or the failure as an error.
    ///
    /// A failed run means "result unavailable"; it never maps to an empty
    /// output.
    pub fn into_output(self) -> AppResult<serde_json::Value> {
        match self {
            RunStatus::Completed { output } => Ok(output),
            RunStatus::Failed { error } => Err(AppError::Workflow(error)),
            RunStatus::Running => Err(AppError::Workflow("Run is still in progress".to_string())),
        }
    }
}

/// Persisted status of one workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub instance_id: String,
    pub function_id: String,
    pub event: Event,
    #[serde(flatten)]
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn started(instance_id: &str, function_id: &str, event: &Event) -> Self {
        let now = Utc::now();
        Self {
            instance_id: instance_id.to_string(),
            function_id: function_id.to_string(),
            event: event.clone(),
            status: RunStatus::Running,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// A memoized step result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub instance_id: String,
    pub step: String,
    pub output: serde_json::Value,
    /// Fingerprint of the input the producer ran with
    pub input_hash: String,
    /// Attempts it took to produce `output`
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

/// Storage backend for run and step state.
///
/// `save_step` must keep the first record written for a given
/// `(instance_id, step)`: a memoized result is never replaced.
#[async_trait::async_trait]
pub trait StepStore: Send + Sync {
    async fn load_step(&self, instance_id: &str, step: &str) -> AppResult<Option<StepRecord>>;

    async fn save_step(&self, record: &StepRecord) -> AppResult<()>;

    /// Steps recorded for an instance, oldest first.
    async fn list_steps(&self, instance_id: &str) -> AppResult<Vec<StepRecord>>;

    async fn load_run(&self, instance_id: &str) -> AppResult<Option<RunRecord>>;

    async fn save_run(&self, record: &RunRecord) -> AppResult<()>;

    /// All runs, most recently created first.
    async fn list_runs(&self) -> AppResult<Vec<RunRecord>>;
}
