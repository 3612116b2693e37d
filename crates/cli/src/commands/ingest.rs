//! Ingest command handler.
//!
//! Sends one `rag/ingest_pdf` event per discovered document. All events are
//! dispatched before any is awaited, so documents ingest concurrently.

use super::{open_engine, run_summary, status_line, wait_all};
use clap::Args;
use ragstep_core::{AppConfig, AppError, AppResult};
use ragstep_knowledge::{discover_documents, IngestRequest, INGEST_EVENT};
use ragstep_workflow::{Event, RunStatus};
use std::path::{Path, PathBuf};

/// Ingest a document, or every document under a directory
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// File or directory to ingest
    pub path: PathBuf,

    /// Source identifier stored with every chunk (single file only)
    #[arg(long)]
    pub source_id: Option<String>,

    /// Event id; reuse one to redeliver the same ingestion (single file only)
    #[arg(long)]
    pub event_id: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ingest command for {}", self.path.display());

        let documents = discover_documents(&self.path)?;
        if documents.is_empty() {
            return Err(AppError::Validation(format!(
                "No ingestible documents under {}",
                self.path.display()
            )));
        }

        let events = self.build_events(&documents)?;
        let engine = open_engine(config).await?;

        let mut handles = Vec::with_capacity(events.len());
        for event in events {
            handles.extend(engine.send(event).await?);
        }

        let finished = wait_all(handles).await;
        let failures = finished
            .iter()
            .filter(|(_, _, status)| matches!(status, RunStatus::Failed { .. }))
            .count();

        if self.json {
            let output: Vec<_> = documents
                .iter()
                .zip(&finished)
                .map(|(path, (instance_id, function_id, status))| {
                    let mut summary = run_summary(instance_id, function_id, status);
                    summary["path"] = serde_json::json!(path.display().to_string());
                    summary
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            for (path, (instance_id, function_id, status)) in documents.iter().zip(&finished) {
                println!("{}", path.display());
                println!("  {}", status_line(instance_id, function_id, status));
            }
            println!(
                "Ingested {} of {} document(s)",
                finished.len() - failures,
                finished.len()
            );
        }

        if failures > 0 {
            return Err(AppError::Workflow(format!(
                "{} of {} ingestion(s) failed",
                failures,
                finished.len()
            )));
        }

        Ok(())
    }

    /// One event per document, in discovery order.
    fn build_events(&self, documents: &[PathBuf]) -> AppResult<Vec<Event>> {
        if documents.len() > 1 && (self.source_id.is_some() || self.event_id.is_some()) {
            return Err(AppError::Validation(
                "--source-id and --event-id apply to a single document".to_string(),
            ));
        }

        documents
            .iter()
            .map(|path| {
                let request = IngestRequest {
                    pdf_path: path_string(path),
                    source_id: self.source_id.clone(),
                };
                let event = Event::new(INGEST_EVENT, serde_json::to_value(request)?);
                Ok(match &self.event_id {
                    Some(id) => event.with_id(id.clone()),
                    None => event,
                })
            })
            .collect()
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(source_id: Option<&str>, event_id: Option<&str>) -> IngestCommand {
        IngestCommand {
            path: PathBuf::from("docs"),
            source_id: source_id.map(str::to_string),
            event_id: event_id.map(str::to_string),
            json: false,
        }
    }

    #[test]
    fn test_single_document_event() {
        let events = command(Some("doc-A"), Some("evt-1"))
            .build_events(&[PathBuf::from("docs/cv.pdf")])
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "evt-1");
        assert_eq!(events[0].name, INGEST_EVENT);
        assert_eq!(
            events[0].data,
            serde_json::json!({"pdf_path": "docs/cv.pdf", "source_id": "doc-A"})
        );
    }

    #[test]
    fn test_directory_events_get_distinct_ids() {
        let documents = [PathBuf::from("docs/a.pdf"), PathBuf::from("docs/b.md")];
        let events = command(None, None).build_events(&documents).unwrap();

        assert_eq!(events.len(), 2);
        assert_ne!(events[0].id, events[1].id);
        assert_eq!(events[1].data, serde_json::json!({"pdf_path": "docs/b.md"}));
    }

    #[test]
    fn test_discovered_events_carry_absolute_paths() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("docs")).unwrap();
        std::fs::write(temp.path().join("docs/cv.pdf"), "%PDF-1.4").unwrap();

        let documents = discover_documents(&temp.path().join("docs/./cv.pdf")).unwrap();
        let events = command(None, None).build_events(&documents).unwrap();

        let request: IngestRequest = events[0].payload().unwrap();
        assert!(Path::new(&request.pdf_path).is_absolute());
        assert_eq!(
            PathBuf::from(&request.pdf_path),
            std::fs::canonicalize(temp.path().join("docs/cv.pdf")).unwrap()
        );
        assert!(request.source_id.is_none());
    }

    #[test]
    fn test_overrides_rejected_for_many_documents() {
        let documents = [PathBuf::from("docs/a.pdf"), PathBuf::from("docs/b.md")];
        let result = command(Some("doc-A"), None).build_events(&documents);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
