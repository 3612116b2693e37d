//! Error types for the ragstep workspace.
//!
//! One enum covers the external-call failures raised by the pipeline
//! collaborators (parser, embedder, vector index, generation model) and the
//! failures of the orchestration layer itself.

use thiserror::Error;

/// Unified error type for ragstep.
///
/// All fallible functions return `Result<T, AppError>`. External-call
/// wrappers map their transport errors onto the matching variant; the step
/// retry loop treats every variant except `Validation` as retryable.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The document could not be read or parsed into text
    #[error("Document unreadable: {0}")]
    DocumentUnreadable(String),

    /// Embedding provider failures
    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    /// Vector index upsert failures
    #[error("Index write error: {0}")]
    IndexWrite(String),

    /// Vector index search failures
    #[error("Index query error: {0}")]
    IndexQuery(String),

    /// Answer-generation provider failures
    #[error("Generation provider error: {0}")]
    GenerationProvider(String),

    /// Malformed event payloads and other input that retrying cannot fix
    #[error("Validation error: {0}")]
    Validation(String),

    /// Orchestration errors (unknown event, step store failures, ...)
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// A step exhausted its retry budget
    #[error("Step '{step}' failed after {attempts} attempt(s): {message}")]
    StepFailed {
        step: String,
        attempts: u32,
        message: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether the step retry loop should attempt the producer again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AppError::Validation(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
