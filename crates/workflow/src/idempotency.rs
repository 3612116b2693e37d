//! Deterministic keys for instances and steps.

use ragstep_core::AppResult;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Instance identity for `function_id` handling the event `event_id`.
///
/// Redelivery of the same event therefore lands on the same instance and
/// replays its memoized steps.
pub fn instance_id_for(function_id: &str, event_id: &str) -> String {
    uuid::Uuid::new_v5(
        &uuid::Uuid::NAMESPACE_URL,
        format!("{}:{}", function_id, event_id).as_bytes(),
    )
    .to_string()
}

/// Idempotency key of one step inside one instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepKey(String);

impl StepKey {
    pub fn derive(instance_id: &str, step: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(instance_id.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(step.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 of a step input's JSON encoding.
pub fn fingerprint<T: Serialize>(input: &T) -> AppResult<String> {
    let bytes = serde_json::to_vec(input)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}
