//! Local text-layer extraction.

mod extractor;

#[cfg(test)]
pub(crate) use extractor::fixtures;
pub use extractor::{extract_text, extract_text_from_bytes, ExtractedDocument};

use std::path::PathBuf;

use crate::pipeline::TextOutcome;

/// Local Extractor stage.
///
/// Parses the PDF on the blocking pool. Never fails: parse errors and panics
/// in the parser are logged and reported as [`TextOutcome::Failed`].
pub async fn extract_local(path: PathBuf) -> TextOutcome {
    let shown = path.display().to_string();
    match tokio::task::spawn_blocking(move || extract_text(&path)).await {
        Ok(Ok(doc)) if doc.text.is_empty() => {
            tracing::debug!(path = %shown, pages = doc.page_count, "No text layer");
            TextOutcome::Empty
        }
        Ok(Ok(doc)) => TextOutcome::Extracted(doc.text),
        Ok(Err(e)) => {
            tracing::warn!(path = %shown, "Error extracting text locally: {:#}", e);
            TextOutcome::Failed(format!("{:#}", e))
        }
        Err(e) => {
            tracing::warn!(path = %shown, "Local extraction task panicked: {}", e);
            TextOutcome::Failed(e.to_string())
        }
    }
}
