//! ragstep CLI
//!
//! Main entry point for the ragstep command-line tool.
//! Sends ingestion and query events to the durable RAG workflows and
//! reports the status of their runs.

mod commands;

use clap::{Parser, Subcommand};
use commands::{IngestCommand, QueryCommand, ResumeCommand, RunsCommand, SendCommand};
use ragstep_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;
use tracing::Instrument;

/// ragstep - durable retrieval-augmented generation over local documents
#[derive(Parser, Debug)]
#[command(name = "ragstep")]
#[command(about = "Durable retrieval-augmented generation over local documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "RAGSTEP_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "RAGSTEP_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest a document, or every document under a directory
    Ingest(IngestCommand),

    /// Ask a question answered from the ingested documents
    Query(QueryCommand),

    /// Send an arbitrary event to the workflow engine
    Send(SendCommand),

    /// List workflow runs, or inspect one instance
    Runs(RunsCommand),

    /// Re-drive runs left unfinished by a previous process
    Resume(ResumeCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Load base configuration from file and environment
    let config = AppConfig::load()?;

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    )?;

    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    config.validate()?;

    tracing::info!("ragstep starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Generation: {}/{}", config.llm.provider, config.llm.model);
    tracing::debug!(
        "Embeddings: {}/{} ({} dims)",
        config.embedding.provider,
        config.embedding.model,
        config.embedding.dimensions
    );

    config.ensure_ragstep_dir()?;

    let command_name = match &cli.command {
        Commands::Ingest(_) => "ingest",
        Commands::Query(_) => "query",
        Commands::Send(_) => "send",
        Commands::Runs(_) => "runs",
        Commands::Resume(_) => "resume",
    };
    let span = tracing::info_span!("command", name = command_name);

    let result = async {
        match cli.command {
            Commands::Ingest(cmd) => cmd.execute(&config).await,
            Commands::Query(cmd) => cmd.execute(&config).await,
            Commands::Send(cmd) => cmd.execute(&config).await,
            Commands::Runs(cmd) => cmd.execute(&config).await,
            Commands::Resume(cmd) => cmd.execute(&config).await,
        }
    }
    .instrument(span)
    .await;

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
