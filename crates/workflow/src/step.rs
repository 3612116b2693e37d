//! Memoized, retried steps inside one workflow instance.

use crate::idempotency::{fingerprint, StepKey};
use crate::policy::RetryPolicy;
use crate::store::{StepRecord, StepStore};
use chrono::Utc;
use ragstep_core::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::Instrument;

/// Execution context handed to a workflow function for one instance.
pub struct StepContext {
    instance_id: String,
    store: Arc<dyn StepStore>,
    policy: RetryPolicy,
    seen: Mutex<HashSet<String>>,
}

impl StepContext {
    pub fn new(instance_id: impl Into<String>, store: Arc<dyn StepStore>, policy: RetryPolicy) -> Self {
        Self {
            instance_id: instance_id.into(),
            store,
            policy,
            seen: Mutex::new(HashSet::new()),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the step `name`, or replay its recorded result.
    ///
    /// When a result is already recorded for `(instance, name)` it is
    /// decoded and returned without calling `producer`. Otherwise `producer`
    /// is invoked with a clone of `input` until it succeeds, returns a
    /// non-retryable error, or the retry policy is exhausted. Only a
    /// successful result is recorded.
    pub async fn run<I, O, F, Fut>(&self, name: &str, input: I, producer: F) -> AppResult<O>
    where
        I: Serialize + Clone,
        O: Serialize + DeserializeOwned,
        F: Fn(I) -> Fut,
        Fut: Future<Output = AppResult<O>>,
    {
        self.claim(name)?;

        let key = StepKey::derive(&self.instance_id, name);
        let span = tracing::info_span!("step", step = name, key = %key);

        self.execute(name, input, producer).instrument(span).await
    }

    fn claim(&self, name: &str) -> AppResult<()> {
        let mut seen = self
            .seen
            .lock()
            .map_err(|_| AppError::Workflow("Step context lock poisoned".to_string()))?;

        if !seen.insert(name.to_string()) {
            return Err(AppError::Workflow(format!(
                "Step '{}' is declared more than once in instance {}",
                name, self.instance_id
            )));
        }
        Ok(())
    }

    async fn execute<I, O, F, Fut>(&self, name: &str, input: I, producer: F) -> AppResult<O>
    where
        I: Serialize + Clone,
        O: Serialize + DeserializeOwned,
        F: Fn(I) -> Fut,
        Fut: Future<Output = AppResult<O>>,
    {
        let input_hash = fingerprint(&input)?;

        if let Some(record) = self.store.load_step(&self.instance_id, name).await? {
            if record.input_hash != input_hash {
                tracing::warn!(
                    recorded = %record.input_hash,
                    current = %input_hash,
                    "Step input changed since it was recorded; replaying recorded result"
                );
            }
            tracing::info!("Replaying recorded step result");
            return decode(name, record.output);
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            tracing::debug!(attempt, "Running step producer");

            match producer(input.clone()).await {
                Ok(output) => {
                    let record = StepRecord {
                        instance_id: self.instance_id.clone(),
                        step: name.to_string(),
                        output: serde_json::to_value(&output)?,
                        input_hash,
                        attempts: attempt,
                        recorded_at: Utc::now(),
                    };
                    self.store.save_step(&record).await?;
                    tracing::info!(attempts = attempt, "Step completed");

                    // A concurrent writer may have recorded first; its
                    // result is the one every replay will see.
                    return match self.store.load_step(&self.instance_id, name).await? {
                        Some(stored) if stored.output != record.output => {
                            tracing::warn!("Step was recorded concurrently; using recorded result");
                            decode(name, stored.output)
                        }
                        _ => Ok(output),
                    };
                }
                Err(err) if !err.is_retryable() || !self.policy.should_retry(attempt) => {
                    tracing::warn!(attempts = attempt, error = %err, "Step failed");
                    return Err(AppError::StepFailed {
                        step: name.to_string(),
                        attempts: attempt,
                        message: err.to_string(),
                    });
                }
                Err(err) => {
                    let delay = self.policy.backoff_for(attempt);
                    tracing::warn!(
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "Step attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn decode<O: DeserializeOwned>(name: &str, output: serde_json::Value) -> AppResult<O> {
    serde_json::from_value(output).map_err(|e| {
        AppError::Serialization(format!("Recorded result of step '{}' is unreadable: {}", name, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStepStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn context(store: Arc<MemoryStepStore>, attempts: u32) -> StepContext {
        StepContext::new("inst-1", store, RetryPolicy::immediate(attempts))
    }

    #[tokio::test]
    async fn test_recorded_step_is_replayed() {
        let store = Arc::new(MemoryStepStore::new());
        let calls = Arc::new(AtomicU32::new(0));

        let producer = |n: u64| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AppError>(n * 2)
            }
        };

        let first: u64 = context(store.clone(), 3)
            .run("double", 21u64, producer)
            .await
            .unwrap();
        let second: u64 = context(store.clone(), 3)
            .run("double", 21u64, producer)
            .await
            .unwrap();

        assert_eq!(first, 42);
        assert_eq!(second, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_changed_input_still_replays() {
        let store = Arc::new(MemoryStepStore::new());

        let first: u64 = context(store.clone(), 1)
            .run("double", 1u64, |n| async move { Ok(n * 2) })
            .await
            .unwrap();
        let second: u64 = context(store.clone(), 1)
            .run("double", 50u64, |n| async move { Ok(n * 2) })
            .await
            .unwrap();

        assert_eq!(first, 2);
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn test_concurrently_recorded_result_wins() {
        let store = Arc::new(MemoryStepStore::new());

        // Another worker records its result while this producer is running.
        let output: u64 = context(store.clone(), 1)
            .run("double", 21u64, |n| {
                let store = store.clone();
                async move {
                    store
                        .save_step(&StepRecord {
                            instance_id: "inst-1".to_string(),
                            step: "double".to_string(),
                            output: serde_json::json!(999),
                            input_hash: fingerprint(&n)?,
                            attempts: 1,
                            recorded_at: Utc::now(),
                        })
                        .await?;
                    Ok::<u64, AppError>(n * 2)
                }
            })
            .await
            .unwrap();

        assert_eq!(output, 999);

        let replayed: u64 = context(store.clone(), 1)
            .run("double", 21u64, |n| async move { Ok(n * 2) })
            .await
            .unwrap();
        assert_eq!(replayed, output);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let store = Arc::new(MemoryStepStore::new());
        let calls = Arc::new(AtomicU32::new(0));

        let output: String = context(store.clone(), 3)
            .run("flaky", "x".to_string(), |input| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        return Err(AppError::EmbeddingProvider("connection reset".to_string()));
                    }
                    Ok(input.to_uppercase())
                }
            })
            .await
            .unwrap();

        assert_eq!(output, "X");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let record = store.load_step("inst-1", "flaky").await.unwrap().unwrap();
        assert_eq!(record.attempts, 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_record_nothing() {
        let store = Arc::new(MemoryStepStore::new());
        let calls = Arc::new(AtomicU32::new(0));

        let err = context(store.clone(), 3)
            .run("always-fails", (), |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>(AppError::IndexWrite("disk full".to_string()))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            AppError::StepFailed { step, attempts, message } => {
                assert_eq!(step, "always-fails");
                assert_eq!(attempts, 3);
                assert!(message.contains("disk full"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.list_steps("inst-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_errors_fail_immediately() {
        let store = Arc::new(MemoryStepStore::new());
        let calls = Arc::new(AtomicU32::new(0));

        let err = context(store, 5)
            .run("validate", (), |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>(AppError::Validation("top_k must be positive".to_string()))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, AppError::StepFailed { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_duplicate_step_names_rejected() {
        let ctx = context(Arc::new(MemoryStepStore::new()), 1);

        let _: u32 = ctx.run("same", 1u32, |n| async move { Ok(n) }).await.unwrap();
        let err = ctx
            .run("same", 2u32, |n| async move { Ok::<u32, AppError>(n) })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Workflow(_)));
    }
}
