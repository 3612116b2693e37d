//! Send command handler: trigger any registered workflow by event name.

use super::{open_engine, run_summary, wait_all};
use clap::Args;
use ragstep_core::{AppConfig, AppError, AppResult};
use ragstep_workflow::Event;

/// Send an arbitrary event to the workflow engine
#[derive(Args, Debug)]
pub struct SendCommand {
    /// Event name (e.g. rag/ingest_pdf)
    pub event: String,

    /// Event payload as JSON
    #[arg(long, default_value = "{}")]
    pub data: String,

    /// Event id; reuse one to redeliver the same event
    #[arg(long)]
    pub event_id: Option<String>,
}

impl SendCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing send command for event '{}'", self.event);

        let event = self.build_event()?;
        tracing::debug!(event_id = %event.id, "Built event");

        let engine = open_engine(config).await?;
        let handles = engine.send(event).await?;
        let finished = wait_all(handles).await;

        let output: Vec<_> = finished
            .iter()
            .map(|(instance_id, function_id, status)| run_summary(instance_id, function_id, status))
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);

        Ok(())
    }

    fn build_event(&self) -> AppResult<Event> {
        let data: serde_json::Value = serde_json::from_str(&self.data)
            .map_err(|e| AppError::Validation(format!("--data is not valid JSON: {}", e)))?;

        let event = Event::new(self.event.clone(), data);
        Ok(match &self.event_id {
            Some(id) => event.with_id(id.clone()),
            None => event,
        })
    }
}
