//! Error types for the service seams of the pipeline.
//!
//! These never cross a stage boundary: each stage logs them and maps them to a
//! tagged outcome (see [`crate::pipeline::TextOutcome`]). They exist so that the
//! clients behind the seams stay testable and so diagnostics carry a cause.

use std::time::Duration;

use thiserror::Error;

/// Errors from an [`crate::storage::ObjectStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from an [`crate::ocr::OcrService`].
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("OCR service error ({status}): {message}")]
    Service { status: u16, message: String },

    #[error("Unexpected OCR response: {0}")]
    InvalidResponse(String),

    #[error("OCR job {job_id} still in progress after {waited:?}")]
    TimedOut { job_id: String, waited: Duration },

    #[error("OCR job {job_id} cancelled")]
    Cancelled { job_id: String },
}

/// Errors from a [`crate::generate::TextGenerator`].
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("Unexpected generation response: {0}")]
    InvalidResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Errors from parsing ingress notifications.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Malformed event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Notification record is missing {0}")]
    MissingField(&'static str),
}
