//! Resume command handler.

use super::{open_engine, run_summary, status_line, wait_all};
use clap::Args;
use ragstep_core::{AppConfig, AppResult};

/// Re-drive runs left unfinished by a previous process
#[derive(Args, Debug)]
pub struct ResumeCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ResumeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing resume command");

        let engine = open_engine(config).await?;
        let handles = engine.resume_incomplete().await?;
        tracing::info!(instances = handles.len(), "Resuming interrupted runs");

        let finished = wait_all(handles).await;

        if self.json {
            let output: Vec<_> = finished
                .iter()
                .map(|(instance_id, function_id, status)| run_summary(instance_id, function_id, status))
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else if finished.is_empty() {
            println!("No interrupted runs");
        } else {
            for (instance_id, function_id, status) in &finished {
                println!("{}", status_line(instance_id, function_id, status));
            }
        }

        Ok(())
    }
}
