//! Fixed-size, overlapping text chunking.

use ragstep_core::{AppError, AppResult};

/// Collapse every whitespace run to one character and trim both ends.
///
/// A run containing a line break becomes `\n`, any other run a single
/// space. Adjacent characters of the result are never both whitespace, so
/// no window of two or more characters is blank.
pub fn normalize_whitespace(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    let mut pending: Option<char> = None;

    for c in text.trim().chars() {
        if c.is_whitespace() {
            let collapsed = if c == '\n' || c == '\r' { '\n' } else { ' ' };
            pending = match pending {
                Some('\n') => Some('\n'),
                _ => Some(collapsed),
            };
            continue;
        }
        if let Some(ws) = pending.take() {
            normalized.push(ws);
        }
        normalized.push(c);
    }

    normalized
}

/// Split `text` into windows of `chunk_size` characters.
///
/// Consecutive windows share `overlap` characters. Every window except the
/// last is full; the last holds the remainder. Segments are not trimmed, so
/// the first chunk followed by every later chunk minus its first `overlap`
/// characters reconstructs `text` exactly.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> AppResult<Vec<String>> {
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(AppError::Validation(format!(
            "Chunk size {} must be positive and larger than overlap {}",
            chunk_size, overlap
        )));
    }

    // Byte offset of every char, plus the end of the text.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let char_count = bounds.len();
    bounds.push(text.len());

    let stride = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < char_count {
        let end = (start + chunk_size).min(char_count);
        chunks.push(text[bounds[start]..bounds[end]].to_string());

        if end == char_count {
            break;
        }
        start += stride;
    }

    tracing::debug!(
        "Chunked {} chars into {} chunks (size: {}, overlap: {})",
        char_count,
        chunks.len(),
        chunk_size,
        overlap
    );

    Ok(chunks)
}
