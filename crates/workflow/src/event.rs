//! Trigger events.

use chrono::{DateTime, Utc};
use ragstep_core::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A named event carrying a JSON payload.
///
/// The `id` identifies one delivery intent: redelivering an event with the
/// same id addresses the same workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub ts: DateTime<Utc>,
}

impl Event {
    /// Create an event with a fresh id.
    pub fn new(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            data,
            ts: Utc::now(),
        }
    }

    /// Replace the generated id with a caller-supplied one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Decode the payload into a typed struct.
    ///
    /// A payload that does not match is a `Validation` error: redelivering
    /// the same event cannot fix it.
    pub fn payload<T: DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            AppError::Validation(format!("Invalid payload for event '{}': {}", self.name, e))
        })
    }
}
