//! Query command handler.

use super::open_engine;
use clap::Args;
use ragstep_core::{AppConfig, AppError, AppResult};
use ragstep_knowledge::{QueryOutcome, QueryRequest, QUERY_EVENT};
use ragstep_workflow::Event;

/// Ask a question answered from the ingested documents
#[derive(Args, Debug)]
pub struct QueryCommand {
    /// Question text
    pub question: String,

    /// Number of chunks to retrieve
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Career the roadmap should target
    #[arg(long)]
    pub career_choice: Option<String>,

    /// Event id; reuse one to get the recorded answer back
    #[arg(long)]
    pub event_id: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl QueryCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing query command");

        let request = QueryRequest {
            question: self.question.clone(),
            top_k: self.top_k,
            career_choice: self.career_choice.clone(),
        };
        let mut event = Event::new(QUERY_EVENT, serde_json::to_value(request)?);
        if let Some(id) = &self.event_id {
            event = event.with_id(id.clone());
        }

        let engine = open_engine(config).await?;
        let status = engine
            .send_and_wait(event)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Workflow("Query event started no run".to_string()))?;

        let output = status.into_output()?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        let outcome: QueryOutcome = serde_json::from_value(output)?;
        println!("Answer:");
        println!("{}", outcome.answer);
        println!();

        if outcome.sources.is_empty() {
            println!("Sources: (no contexts retrieved)");
        } else {
            println!("Sources ({} contexts):", outcome.num_contexts);
            for source in &outcome.sources {
                println!("- {}", source);
            }
        }

        Ok(())
    }
}
