//! Locating documents to ingest.

use crate::parser::ContentType;
use ragstep_core::{AppError, AppResult};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Expand `path` into the documents it names, as canonical absolute paths.
///
/// A file is returned whatever its extension. A directory is walked
/// recursively and only files of an ingestible content type are kept.
/// Recorded events carry these paths, so a run resumed from another working
/// directory reads the same file and spelling variants of one path share a
/// source id.
pub fn discover_documents(path: &Path) -> AppResult<Vec<PathBuf>> {
    let root = std::fs::canonicalize(path).map_err(|e| {
        AppError::Validation(format!("Cannot resolve path {}: {}", path.display(), e))
    })?;

    if root.is_file() {
        return Ok(vec![root]);
    }

    if !root.is_dir() {
        return Err(AppError::Validation(format!(
            "Not a file or directory: {}",
            root.display()
        )));
    }

    let mut documents: Vec<PathBuf> = WalkDir::new(&root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| ContentType::from_path(p).is_ingestible())
        .collect();

    documents.sort();

    tracing::debug!(
        root = %root.display(),
        documents = documents.len(),
        "Discovered documents"
    );

    Ok(documents)
}
