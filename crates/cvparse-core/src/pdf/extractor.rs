use std::path::Path;

use anyhow::{Context, Result};

/// Text layer of a PDF
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// Page texts joined with newlines, trimmed
    pub text: String,
    /// Number of pages in the PDF
    pub page_count: usize,
}

/// Extract the text layer from a PDF file
pub fn extract_text(path: &Path) -> Result<ExtractedDocument> {
    let pdf_bytes = std::fs::read(path).context("Failed to read PDF file")?;
    extract_text_from_bytes(&pdf_bytes)
}

/// Extract the text layer from PDF bytes already in memory
pub fn extract_text_from_bytes(pdf_bytes: &[u8]) -> Result<ExtractedDocument> {
    let doc = lopdf::Document::load_mem(pdf_bytes).context("Failed to parse PDF")?;

    let mut pages: Vec<u32> = doc.get_pages().keys().cloned().collect();
    pages.sort();
    let page_count = pages.len();

    // A page whose content cannot be decoded contributes nothing
    let page_texts: Vec<String> = pages
        .iter()
        .map(|page_num| match doc.extract_text(&[*page_num]) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(page = page_num, error = %e, "No text extracted from page");
                String::new()
            }
        })
        .collect();

    let text = page_texts.join("\n").trim().to_string();

    tracing::debug!("Extracted {} chars from {} pages", text.len(), page_count);

    Ok(ExtractedDocument { text, page_count })
}
