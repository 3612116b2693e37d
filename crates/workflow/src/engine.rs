//! In-process workflow engine.
//!
//! Events are routed to the functions registered for their name. Each
//! matching function runs as one instance on its own tokio task; the
//! instance id is derived from the function id and the event id, so a
//! redelivered event lands on the instance it created the first time.

use crate::event::Event;
use crate::idempotency::instance_id_for;
use crate::policy::RetryPolicy;
use crate::step::StepContext;
use crate::store::{RunRecord, RunStatus, StepRecord, StepStore};
use futures::FutureExt;
use ragstep_core::{AppError, AppResult};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::Instrument;

/// A workflow triggered by a named event.
#[async_trait::async_trait]
pub trait WorkflowFunction: Send + Sync {
    /// Stable identifier; part of every instance id.
    fn id(&self) -> &str;

    /// Name of the event that triggers this function.
    fn trigger(&self) -> &str;

    async fn run(&self, ctx: &StepContext, event: &Event) -> AppResult<serde_json::Value>;
}

/// Handle on one dispatched instance.
#[derive(Debug, Clone)]
pub struct RunHandle {
    instance_id: String,
    function_id: String,
    rx: watch::Receiver<RunStatus>,
}

impl RunHandle {
    /// Handle for an instance whose status is already terminal.
    fn finished(instance_id: String, function_id: String, status: RunStatus) -> Self {
        let (_tx, rx) = watch::channel(status);
        Self {
            instance_id,
            function_id,
            rx,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn function_id(&self) -> &str {
        &self.function_id
    }

    /// Wait until the instance reaches a terminal status.
    pub async fn wait(mut self) -> RunStatus {
        loop {
            let status = self.rx.borrow_and_update().clone();
            if status.is_terminal() {
                return status;
            }

            if self.rx.changed().await.is_err() {
                let status = self.rx.borrow().clone();
                if status.is_terminal() {
                    return status;
                }
                return RunStatus::Failed {
                    error: format!("Instance {} stopped without a result", self.instance_id),
                };
            }
        }
    }
}

type ActiveRuns = Arc<Mutex<HashMap<String, watch::Receiver<RunStatus>>>>;

pub struct WorkflowEngine {
    store: Arc<dyn StepStore>,
    policy: RetryPolicy,
    functions: HashMap<String, Vec<Arc<dyn WorkflowFunction>>>,
    active: ActiveRuns,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn StepStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            functions: HashMap::new(),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn register(&mut self, function: Arc<dyn WorkflowFunction>) {
        tracing::debug!(
            function = function.id(),
            trigger = function.trigger(),
            "Registered workflow function"
        );
        self.functions
            .entry(function.trigger().to_string())
            .or_default()
            .push(function);
    }

    pub fn store(&self) -> Arc<dyn StepStore> {
        self.store.clone()
    }

    /// Dispatch an event to every function registered for its name.
    pub async fn send(&self, event: Event) -> AppResult<Vec<RunHandle>> {
        let functions = self
            .functions
            .get(&event.name)
            .filter(|functions| !functions.is_empty())
            .ok_or_else(|| {
                AppError::Workflow(format!("No workflow registered for event '{}'", event.name))
            })?;

        tracing::info!(
            event = %event.name,
            event_id = %event.id,
            functions = functions.len(),
            "Received event"
        );

        let mut handles = Vec::with_capacity(functions.len());
        for function in functions {
            handles.push(self.dispatch(function.clone(), &event).await?);
        }
        Ok(handles)
    }

    /// Dispatch an event and wait for every instance it started.
    pub async fn send_and_wait(&self, event: Event) -> AppResult<Vec<RunStatus>> {
        let handles = self.send(event).await?;
        Ok(futures::future::join_all(handles.into_iter().map(RunHandle::wait)).await)
    }

    /// Restart instances left `running` by a previous process.
    pub async fn resume_incomplete(&self) -> AppResult<Vec<RunHandle>> {
        let mut handles = Vec::new();

        for run in self.store.list_runs().await? {
            if run.status.is_terminal() {
                continue;
            }

            let function = self
                .functions
                .values()
                .flatten()
                .find(|f| f.id() == run.function_id);

            match function {
                Some(function) => handles.push(self.dispatch(function.clone(), &run.event).await?),
                None => tracing::warn!(
                    instance = %run.instance_id,
                    function = %run.function_id,
                    "No registered function for interrupted run"
                ),
            }
        }

        Ok(handles)
    }

    pub async fn status(&self, instance_id: &str) -> AppResult<Option<RunStatus>> {
        Ok(self.store.load_run(instance_id).await?.map(|run| run.status))
    }

    pub async fn runs(&self) -> AppResult<Vec<RunRecord>> {
        self.store.list_runs().await
    }

    pub async fn steps(&self, instance_id: &str) -> AppResult<Vec<StepRecord>> {
        self.store.list_steps(instance_id).await
    }

    async fn dispatch(&self, function: Arc<dyn WorkflowFunction>, event: &Event) -> AppResult<RunHandle> {
        let instance_id = instance_id_for(function.id(), &event.id);
        let function_id = function.id().to_string();

        // Claim the instance before touching the store, so two deliveries of
        // one event cannot both start it. The map is released before any
        // store I/O; later deliveries share the claimed handle.
        let (tx, rx) = {
            let mut active = self.active.lock().await;

            if let Some(rx) = active.get(&instance_id) {
                tracing::debug!(instance = %instance_id, "Instance already running, sharing handle");
                return Ok(RunHandle {
                    instance_id,
                    function_id,
                    rx: rx.clone(),
                });
            }

            let (tx, rx) = watch::channel(RunStatus::Running);
            active.insert(instance_id.clone(), rx.clone());
            (tx, rx)
        };

        let record = match self.prepare(&instance_id, &function_id, event).await {
            Ok(Prepared::Start(record)) => record,
            Ok(Prepared::Finished(status)) => {
                tracing::info!(
                    instance = %instance_id,
                    status = status.label(),
                    "Instance already finished, returning recorded status"
                );
                release(&self.active, &instance_id, tx, status.clone()).await;
                return Ok(RunHandle::finished(instance_id, function_id, status));
            }
            Err(err) => {
                let status = RunStatus::Failed {
                    error: err.to_string(),
                };
                release(&self.active, &instance_id, tx, status).await;
                return Err(err);
            }
        };

        let span = tracing::info_span!("run", function = %function_id, instance = %instance_id);
        tokio::spawn(
            execute(
                function,
                record,
                self.store.clone(),
                self.policy.clone(),
                self.active.clone(),
                tx,
            )
            .instrument(span),
        );

        Ok(RunHandle {
            instance_id,
            function_id,
            rx,
        })
    }

    /// Load the stored run for a claimed instance, or record a new one.
    async fn prepare(&self, instance_id: &str, function_id: &str, event: &Event) -> AppResult<Prepared> {
        match self.store.load_run(instance_id).await? {
            Some(existing) if existing.status.is_terminal() => Ok(Prepared::Finished(existing.status)),
            Some(existing) => {
                tracing::warn!(instance = %instance_id, "Resuming interrupted instance");
                Ok(Prepared::Start(existing))
            }
            None => {
                let record = RunRecord::started(instance_id, function_id, event);
                self.store.save_run(&record).await?;
                Ok(Prepared::Start(record))
            }
        }
    }
}

enum Prepared {
    Start(RunRecord),
    Finished(RunStatus),
}

/// Drop the claim on an instance and publish its final status.
async fn release(
    active: &ActiveRuns,
    instance_id: &str,
    tx: watch::Sender<RunStatus>,
    status: RunStatus,
) {
    active.lock().await.remove(instance_id);
    tx.send_replace(status);
}

async fn execute(
    function: Arc<dyn WorkflowFunction>,
    mut record: RunRecord,
    store: Arc<dyn StepStore>,
    policy: RetryPolicy,
    active: ActiveRuns,
    tx: watch::Sender<RunStatus>,
) {
    tracing::info!(event = %record.event.name, "Instance started");

    let ctx = StepContext::new(record.instance_id.clone(), store.clone(), policy);
    let outcome = AssertUnwindSafe(function.run(&ctx, &record.event))
        .catch_unwind()
        .await;

    let status = match outcome {
        Ok(Ok(output)) => {
            tracing::info!("Instance completed");
            RunStatus::Completed { output }
        }
        Ok(Err(err)) => {
            tracing::error!(error = %err, "Instance failed");
            RunStatus::Failed {
                error: err.to_string(),
            }
        }
        Err(_) => {
            tracing::error!("Instance panicked");
            RunStatus::Failed {
                error: format!("Workflow function '{}' panicked", record.function_id),
            }
        }
    };

    record.finish(status.clone());

    // Recorded before the claim is dropped: a delivery arriving after
    // `release` finds the terminal status in the store.
    if let Err(e) = store.save_run(&record).await {
        tracing::error!(error = %e, "Failed to record instance status");
    }
    release(&active, &record.instance_id, tx, status).await;
}
