//! Runs command handler.
//!
//! Reads the step store only; no clients are built.

use super::{open_store_engine, status_line};
use clap::Args;
use ragstep_core::{AppConfig, AppError, AppResult};
use ragstep_workflow::StepStore;

/// List workflow runs, or inspect one instance
#[derive(Args, Debug)]
pub struct RunsCommand {
    /// Show one instance with its recorded steps
    #[arg(long)]
    pub instance: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing runs command");

        let engine = open_store_engine(config)?;

        let Some(instance_id) = &self.instance else {
            let runs = engine.runs().await?;

            if self.json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else if runs.is_empty() {
                println!("No runs recorded");
            } else {
                for run in &runs {
                    println!(
                        "{}  {}",
                        run.updated_at.to_rfc3339(),
                        status_line(&run.instance_id, &run.function_id, &run.status)
                    );
                }
            }
            return Ok(());
        };

        let run = engine
            .store()
            .load_run(instance_id)
            .await?
            .ok_or_else(|| AppError::Workflow(format!("Unknown instance: {}", instance_id)))?;
        let steps = engine.steps(instance_id).await?;

        if self.json {
            let output = serde_json::json!({
                "run": run,
                "steps": steps,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        println!("Instance: {}", run.instance_id);
        println!("  Function: {}", run.function_id);
        println!("  Event: {} ({})", run.event.name, run.event.id);
        println!("  Status: {}", run.status.label());
        println!("  Started: {}", run.created_at.to_rfc3339());
        println!("  Updated: {}", run.updated_at.to_rfc3339());
        println!("Steps:");
        if steps.is_empty() {
            println!("  (none recorded)");
        }
        for step in &steps {
            println!(
                "  {}  {} attempt(s)  {}",
                step.step,
                step.attempts,
                step.recorded_at.to_rfc3339()
            );
        }

        Ok(())
    }
}
