//! Durable step orchestration.
//!
//! A workflow function is a sequence of named steps. Each step result is
//! recorded once computed and replayed whenever the instance runs again,
//! which makes redelivered events and resumed crashes idempotent.

pub mod engine;
pub mod event;
pub mod idempotency;
pub mod policy;
pub mod step;
pub mod store;

pub use engine::{RunHandle, WorkflowEngine, WorkflowFunction};
pub use event::Event;
pub use idempotency::{fingerprint, instance_id_for, StepKey};
pub use policy::RetryPolicy;
pub use step::StepContext;
pub use store::{MemoryStepStore, RunRecord, RunStatus, SqliteStepStore, StepRecord, StepStore};
