//! Pipeline types: stage outcomes, per-document results and batch reports.

use serde::{Deserialize, Serialize};

/// Result of a text extraction stage.
///
/// Stages never return errors; the orchestrator matches on this tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextOutcome {
    /// Non-empty text.
    Extracted(String),
    /// The stage ran but found no text.
    Empty,
    /// The stage could not run to completion (diagnostic already logged).
    Failed(String),
}

impl TextOutcome {
    /// Wrap assembled text, mapping whitespace-only text to `Empty`.
    pub fn from_text(text: String) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            TextOutcome::Empty
        } else if trimmed.len() == text.len() {
            TextOutcome::Extracted(text)
        } else {
            TextOutcome::Extracted(trimmed.to_string())
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            TextOutcome::Extracted(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            TextOutcome::Extracted(text) => Some(text),
            _ => None,
        }
    }
}

/// Which stage produced the raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// PDF text layer, parsed in process
    Local,
    /// Remote OCR job
    Ocr,
}

impl ExtractionMethod {
    /// Tag embedded in output keys. Downstream auditing joins on these.
    pub fn output_tag(&self) -> &'static str {
        match self {
            ExtractionMethod::Local => "pypdf",
            ExtractionMethod::Ocr => "textract",
        }
    }

    /// Suffix that replaces the document extension (`_pypdf.json`).
    pub fn output_suffix(&self) -> String {
        format!("_{}.json", self.output_tag())
    }

    /// Recover the method from an output key, if it carries a known suffix.
    pub fn from_output_key(key: &str) -> Option<Self> {
        [ExtractionMethod::Local, ExtractionMethod::Ocr]
            .into_iter()
            .find(|method| key.ends_with(&method.output_suffix()))
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionMethod::Local => write!(f, "local"),
            ExtractionMethod::Ocr => write!(f, "ocr"),
        }
    }
}

/// Raw text plus the method that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub raw_text: String,
    pub method: ExtractionMethod,
}

/// Step of the per-document state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Ocr,
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Fetch => write!(f, "fetch"),
            Stage::Ocr => write!(f, "ocr"),
            Stage::Persist => write!(f, "persist"),
        }
    }
}

/// What happened to one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum DocumentOutcome {
    /// An artifact was written.
    Persisted {
        key: String,
        output_key: String,
        method: ExtractionMethod,
        /// False when the artifact is the generation error sentinel.
        structured: bool,
    },
    /// Neither extraction stage produced text; nothing was written.
    Skipped { key: String },
    /// A transport fault at fetch or persist, or an OCR wait that did not finish.
    Failed {
        key: String,
        stage: Stage,
        error: String,
    },
    /// The ingress record could not be parsed into a document location.
    Rejected { error: String },
}

impl DocumentOutcome {
    /// Faults worth redelivering; a skipped document would fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DocumentOutcome::Failed { .. } | DocumentOutcome::Rejected { .. }
        )
    }
}

/// One document outcome, tagged with the ingress message it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub message_id: Option<String>,
    #[serde(flatten)]
    pub outcome: DocumentOutcome,
}

/// Per-document outcomes of one batch, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn push(&mut self, message_id: Option<String>, outcome: DocumentOutcome) {
        self.entries.push(BatchEntry {
            message_id,
            outcome,
        });
    }

    pub fn persisted(&self) -> usize {
        self.count(|o| matches!(o, DocumentOutcome::Persisted { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DocumentOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(DocumentOutcome::is_retryable)
    }

    fn count(&self, pred: impl Fn(&DocumentOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }

    /// Message ids with at least one retryable outcome, first occurrence order.
    pub fn item_failures(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for entry in &self.entries {
            if let (true, Some(id)) = (entry.outcome.is_retryable(), &entry.message_id) {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }

    /// Handler response for the ingress mechanism.
    ///
    /// Status is always `ok`; item failures are only reported when enabled.
    pub fn response(&self, report_item_failures: bool) -> HandlerResponse {
        HandlerResponse {
            status: "ok".to_string(),
            batch_item_failures: report_item_failures.then(|| {
                self.item_failures()
                    .into_iter()
                    .map(|item_identifier| ItemFailure { item_identifier })
                    .collect()
            }),
        }
    }
}

/// `{"status": "ok"}`, optionally with SQS-style partial batch failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerResponse {
    pub status: String,
    #[serde(
        rename = "batchItemFailures",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub batch_item_failures: Option<Vec<ItemFailure>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    #[serde(rename = "itemIdentifier")]
    pub item_identifier: String,
}
