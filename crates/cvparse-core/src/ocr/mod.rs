//! OCR fallback extraction via an asynchronous job service.
//!
//! A job is submitted for the document's storage location and polled at a
//! fixed interval until it leaves `IN_PROGRESS`. By default the wait is
//! unbounded; [`OcrSettings::timeout`] and the cancellation token bound it.

mod textract;

pub use textract::TextractClient;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::OcrError;
use crate::pipeline::TextOutcome;
use crate::storage::SourceLocation;

/// Default delay between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Status of a remote OCR job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InProgress,
    Succeeded,
    Failed,
}

/// Snapshot of a job as returned by a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrJob {
    pub job_id: String,
    pub status: JobStatus,
    /// Text of LINE units in service order. Only meaningful once succeeded.
    pub lines: Vec<String>,
}

/// Remote OCR job service.
#[async_trait]
pub trait OcrService: Send + Sync {
    /// Start a text detection job, returning its id.
    async fn submit(&self, location: &SourceLocation) -> Result<String, OcrError>;

    /// Fetch the current state of a job.
    async fn poll(&self, job_id: &str) -> Result<OcrJob, OcrError>;
}

/// Polling behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrSettings {
    pub poll_interval: Duration,
    /// Total wait bound. `None` waits for as long as the job runs.
    pub timeout: Option<Duration>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

/// Join LINE texts, each followed by a newline, then trim.
pub fn assemble_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let mut text = String::new();
    for line in lines {
        text.push_str(line.as_ref());
        text.push('\n');
    }
    text.trim().to_string()
}

/// OCR Fallback Extractor stage.
pub struct OcrExtractor {
    service: Arc<dyn OcrService>,
    settings: OcrSettings,
    cancel: CancellationToken,
}

impl OcrExtractor {
    pub fn new(service: Arc<dyn OcrService>, settings: OcrSettings) -> Self {
        Self {
            service,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort in-flight waits when `cancel` fires. The remote job keeps running.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run OCR for a document. Never fails: errors are logged and reported
    /// as [`TextOutcome::Failed`].
    pub async fn extract(&self, location: &SourceLocation) -> TextOutcome {
        match self.run_job(location).await {
            Ok(job) if job.status == JobStatus::Succeeded => {
                let text = assemble_lines(&job.lines);
                tracing::info!(
                    job_id = %job.job_id,
                    lines = job.lines.len(),
                    "OCR completed successfully"
                );
                tracing::debug!(
                    "OCR text preview: {}...",
                    text.chars().take(150).collect::<String>()
                );
                TextOutcome::from_text(text)
            }
            Ok(job) => {
                tracing::warn!(job_id = %job.job_id, key = %location.key, "OCR job failed");
                TextOutcome::Empty
            }
            Err(e) => {
                tracing::warn!(key = %location.key, "Error in OCR: {}", e);
                TextOutcome::Failed(e.to_string())
            }
        }
    }

    /// Submit a job and wait until it leaves `IN_PROGRESS`.
    pub async fn run_job(&self, location: &SourceLocation) -> Result<OcrJob, OcrError> {
        let job_id = self.service.submit(location).await?;
        tracing::info!(job_id = %job_id, key = %location.key, "Waiting for OCR job");

        let started = Instant::now();
        loop {
            let job = self.service.poll(&job_id).await?;
            if job.status != JobStatus::InProgress {
                return Ok(job);
            }

            let delay = match self.settings.timeout {
                Some(timeout) => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(OcrError::TimedOut { job_id, waited });
                    }
                    self.settings.poll_interval.min(timeout - waited)
                }
                None => self.settings.poll_interval,
            };

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    return Err(OcrError::Cancelled { job_id });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
