//! Per-document pipeline orchestration.
//!
//! # Flow
//!
//! ```text
//! notification ──► fetch ──► local extract ──┬──────────────► structure ──► persist
//!                                            │ (no text)          ▲
//!                                            └──► OCR fallback ───┘
//!                                                     │ (no text)   │ (aborted)
//!                                                     ▼             ▼
//!                                                  skipped    failed (retryable)
//! ```
//!
//! Documents of a batch run one after another. A document that fails at any
//! step is reported in the [`BatchReport`] and the batch moves on; the handler
//! response stays `ok`.

mod keys;
mod types;

pub use keys::{base_name, output_key};
pub use types::*;

use std::path::{Path, PathBuf};

use anyhow::Context;
use bytes::Bytes;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

use crate::events::QueueBatch;
use crate::generate::StructuredExtractor;
use crate::ocr::{OcrExtractor, OcrSettings};
use crate::pdf;
use crate::storage::{ObjectStore, SourceLocation};
use crate::ServiceClients;

/// Non-client pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Bucket receiving the JSON artifacts
    pub output_bucket: String,
    /// Where transient document copies are staged
    pub work_dir: PathBuf,
    pub ocr: OcrSettings,
    /// Add `batchItemFailures` to handler responses
    pub report_item_failures: bool,
}

/// The Pipeline Orchestrator.
pub struct Pipeline {
    store: std::sync::Arc<dyn ObjectStore>,
    ocr: OcrExtractor,
    structured: StructuredExtractor,
    output_bucket: String,
    work_dir: PathBuf,
    report_item_failures: bool,
}

impl Pipeline {
    pub fn new(clients: ServiceClients, settings: PipelineSettings) -> Self {
        Self {
            store: clients.store,
            ocr: OcrExtractor::new(clients.ocr, settings.ocr),
            structured: StructuredExtractor::new(clients.generator),
            output_bucket: settings.output_bucket,
            work_dir: settings.work_dir,
            report_item_failures: settings.report_item_failures,
        }
    }

    /// Stop waiting on OCR jobs when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.ocr = self.ocr.with_cancellation(cancel);
        self
    }

    /// Process a batch and build the handler response.
    pub async fn handle(&self, batch: &QueueBatch) -> HandlerResponse {
        self.process_batch(batch)
            .await
            .response(self.report_item_failures)
    }

    /// Process every document of a batch, sequentially.
    pub async fn process_batch(&self, batch: &QueueBatch) -> BatchReport {
        let mut report = BatchReport::default();

        for message in &batch.records {
            let locations = match message.locations() {
                Ok(locations) => locations,
                Err(e) => {
                    tracing::warn!(message_id = ?message.message_id, "Rejected message: {}", e);
                    report.push(
                        message.message_id.clone(),
                        DocumentOutcome::Rejected {
                            error: e.to_string(),
                        },
                    );
                    continue;
                }
            };

            for location in locations {
                let outcome = self.process_document(&location).await;
                report.push(message.message_id.clone(), outcome);
            }
        }

        tracing::info!(
            messages = batch.len(),
            persisted = report.persisted(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Batch processed"
        );
        report
    }

    /// Run one document through fetch, extraction, structuring and persist.
    pub async fn process_document(&self, location: &SourceLocation) -> DocumentOutcome {
        tracing::info!(bucket = %location.bucket, key = %location.key, "Processing file");

        // Removed when dropped, on every path out of this function
        let staged = match self.stage(location).await {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(key = %location.key, "Error fetching document: {:#}", e);
                return DocumentOutcome::Failed {
                    key: location.key.clone(),
                    stage: Stage::Fetch,
                    error: format!("{:#}", e),
                };
            }
        };

        let extraction = match self.extract_text(location, staged.path()).await {
            Ok(Some(extraction)) => extraction,
            Ok(None) => {
                tracing::warn!(key = %location.key, "Could not extract text from document");
                return DocumentOutcome::Skipped {
                    key: location.key.clone(),
                };
            }
            Err(error) => {
                tracing::warn!(key = %location.key, "OCR did not finish, document left for retry");
                return DocumentOutcome::Failed {
                    key: location.key.clone(),
                    stage: Stage::Ocr,
                    error,
                };
            }
        };
        drop(staged);

        let record = self.structured.extract(&extraction.raw_text).await;
        let structured = record.is_structured();
        let output_key = keys::output_key(&location.key, extraction.method);

        let persisted = match record.to_json_bytes() {
            Ok(body) => self
                .store
                .put(&self.output_bucket, &output_key, Bytes::from(body))
                .await
                .map_err(anyhow::Error::from),
            Err(e) => Err(anyhow::Error::from(e).context("Failed to serialize record")),
        };

        match persisted {
            Ok(()) => {
                tracing::info!(
                    key = %location.key,
                    method = %extraction.method,
                    structured,
                    "JSON saved to {}/{}",
                    self.output_bucket,
                    output_key
                );
                DocumentOutcome::Persisted {
                    key: location.key.clone(),
                    output_key,
                    method: extraction.method,
                    structured,
                }
            }
            Err(e) => {
                tracing::warn!(key = %location.key, output_key = %output_key, "Error saving JSON: {:#}", e);
                DocumentOutcome::Failed {
                    key: location.key.clone(),
                    stage: Stage::Persist,
                    error: format!("{:#}", e),
                }
            }
        }
    }

    /// Local text layer first; OCR only when that yields nothing.
    ///
    /// `Ok(None)` means neither stage found text. `Err` carries an OCR run that
    /// never reached a verdict (transport fault, timeout, cancellation).
    async fn extract_text(
        &self,
        location: &SourceLocation,
        path: &Path,
    ) -> Result<Option<ExtractionResult>, String> {
        match pdf::extract_local(path.to_path_buf()).await {
            TextOutcome::Extracted(raw_text) => {
                tracing::debug!(key = %location.key, chars = raw_text.len(), "Text extracted locally");
                return Ok(Some(ExtractionResult {
                    raw_text,
                    method: ExtractionMethod::Local,
                }));
            }
            TextOutcome::Empty | TextOutcome::Failed(_) => {
                tracing::info!(key = %location.key, "Local extraction found no text, switching to OCR");
            }
        }

        match self.ocr.extract(location).await {
            TextOutcome::Extracted(raw_text) => Ok(Some(ExtractionResult {
                raw_text,
                method: ExtractionMethod::Ocr,
            })),
            TextOutcome::Empty => Ok(None),
            TextOutcome::Failed(error) => Err(error),
        }
    }

    /// Copy the document into a temporary file in the work directory.
    async fn stage(&self, location: &SourceLocation) -> anyhow::Result<NamedTempFile> {
        let body = self
            .store
            .fetch(&location.bucket, &location.key)
            .await
            .with_context(|| format!("Failed to fetch {}", location))?;

        let file = tempfile::Builder::new()
            .prefix("cvparse-")
            .suffix(&format!("-{}", location.file_name()))
            .tempfile_in(&self.work_dir)
            .with_context(|| format!("Failed to create temp file in {:?}", self.work_dir))?;
        tokio::fs::write(file.path(), &body)
            .await
            .context("Failed to write temp file")?;

        tracing::debug!(key = %location.key, bytes = body.len(), path = ?file.path(), "Document staged");
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::Value;

    use super::*;
    use crate::events::{notification_body, QueueMessage};
    use crate::generate::{GENERATION_ERROR, RECORD_FIELDS};
    use crate::pdf::fixtures::build_pdf;
    use crate::storage::MemoryObjectStore;
    use crate::testing::{ReadOnlyStore, ScriptedGenerator, ScriptedOcr};

    const INPUT: &str = "cv-input-bucket-poc";
    const OUTPUT: &str = "cv-output-bucket-poc";

    const RECORD: &str = r#"{"name": "Candidato 7", "email": "candidato7@correo.com", "work experience": "5 años", "education": "Ingeniería", "technical skills": ["Python", "AWS"]}"#;

    struct Harness {
        store: Arc<MemoryObjectStore>,
        ocr: Arc<ScriptedOcr>,
        generator: Arc<ScriptedGenerator>,
        work_dir: tempfile::TempDir,
        pipeline: Pipeline,
    }

    fn harness(ocr: ScriptedOcr, generator: ScriptedGenerator) -> Harness {
        let store = Arc::new(MemoryObjectStore::new());
        harness_with_store(store.clone(), store, ocr, generator)
    }

    fn harness_with_store(
        memory: Arc<MemoryObjectStore>,
        store: Arc<dyn ObjectStore>,
        ocr: ScriptedOcr,
        generator: ScriptedGenerator,
    ) -> Harness {
        let ocr = Arc::new(ocr);
        let generator = Arc::new(generator);
        let work_dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            ServiceClients {
                store,
                ocr: ocr.clone(),
                generator: generator.clone(),
            },
            PipelineSettings {
                output_bucket: OUTPUT.to_string(),
                work_dir: work_dir.path().to_path_buf(),
                ocr: OcrSettings {
                    poll_interval: Duration::from_millis(1),
                    timeout: None,
                },
                report_item_failures: false,
            },
        );
        Harness {
            store: memory,
            ocr,
            generator,
            work_dir,
            pipeline,
        }
    }

    impl Harness {
        async fn upload(&self, key: &str, body: Vec<u8>) {
            self.store.put(INPUT, key, Bytes::from(body)).await.unwrap();
        }

        async fn artifact(&self, key: &str) -> Option<Value> {
            let body = self.store.get(OUTPUT, key).await?;
            Some(serde_json::from_slice(&body).unwrap())
        }

        async fn artifact_count(&self) -> usize {
            self.store.list(OUTPUT, "").await.unwrap().len()
        }

        fn staged_files(&self) -> usize {
            std::fs::read_dir(self.work_dir.path()).unwrap().count()
        }
    }

    fn message(id: &str, key: &str) -> QueueMessage {
        QueueMessage {
            message_id: Some(id.to_string()),
            body: notification_body(&SourceLocation::new(INPUT, key)),
        }
    }

    #[tokio::test]
    async fn test_text_pdf_uses_local_extraction() {
        let h = harness(
            ScriptedOcr::succeeding_after(0, &["unused"]),
            ScriptedGenerator::replying(RECORD),
        );
        h.upload("cvs/valid/cv_7.pdf", build_pdf(&[Some("Candidato 7 Python AWS")]))
            .await;

        let outcome = h
            .pipeline
            .process_document(&SourceLocation::new(INPUT, "cvs/valid/cv_7.pdf"))
            .await;

        assert_eq!(
            outcome,
            DocumentOutcome::Persisted {
                key: "cvs/valid/cv_7.pdf".into(),
                output_key: "cvs/valid/cv_7_pypdf.json".into(),
                method: ExtractionMethod::Local,
                structured: true,
            }
        );
        assert_eq!(h.ocr.submissions(), 0);

        let artifact = h.artifact("cvs/valid/cv_7_pypdf.json").await.unwrap();
        for field in RECORD_FIELDS {
            assert!(artifact.get(field).is_some(), "missing {}", field);
        }
        assert!(h.generator.prompts()[0].contains("Candidato"));
        assert_eq!(h.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_scanned_pdf_falls_back_to_ocr() {
        let h = harness(
            ScriptedOcr::succeeding_after(2, &["Jane Doe", "jane@example.com"]),
            ScriptedGenerator::replying(RECORD),
        );
        h.upload("scans/cv_3.pdf", build_pdf(&[None])).await;

        let outcome = h
            .pipeline
            .process_document(&SourceLocation::new(INPUT, "scans/cv_3.pdf"))
            .await;

        assert!(matches!(
            outcome,
            DocumentOutcome::Persisted { method: ExtractionMethod::Ocr, ref output_key, .. }
                if output_key == "scans/cv_3_textract.json"
        ));
        assert_eq!(h.ocr.submissions(), 1);
        assert_eq!(
            h.ocr.submitted_locations(),
            vec![SourceLocation::new(INPUT, "scans/cv_3.pdf")]
        );
        assert!(h.generator.prompts()[0].contains("Jane Doe\njane@example.com\n\n"));
        assert_eq!(h.artifact_count().await, 1);
    }

    #[tokio::test]
    async fn test_corrupt_pdf_falls_back_to_ocr() {
        let h = harness(
            ScriptedOcr::succeeding_after(0, &["Recovered text"]),
            ScriptedGenerator::replying(RECORD),
        );
        h.upload("broken.pdf", b"this is not a valid pdf file".to_vec())
            .await;

        let outcome = h
            .pipeline
            .process_document(&SourceLocation::new(INPUT, "broken.pdf"))
            .await;

        assert!(matches!(
            outcome,
            DocumentOutcome::Persisted { method: ExtractionMethod::Ocr, .. }
        ));
        assert!(h.artifact("broken_textract.json").await.is_some());
    }

    #[tokio::test]
    async fn test_no_text_anywhere_skips_and_batch_continues() {
        let h = harness(
            ScriptedOcr::succeeding_after(0, &[]),
            ScriptedGenerator::replying(RECORD),
        );
        h.upload("cvs/invalid/cv_invalid_3.pdf", build_pdf(&[None]))
            .await;
        h.upload("cvs/valid/cv_7.pdf", build_pdf(&[Some("Candidato 7")]))
            .await;

        let batch = QueueBatch {
            records: vec![
                message("m-1", "cvs/invalid/cv_invalid_3.pdf"),
                message("m-2", "cvs/valid/cv_7.pdf"),
            ],
        };
        let report = h.pipeline.process_batch(&batch).await;

        assert_eq!(report.entries.len(), 2);
        let invalid: Vec<_> = report
            .entries
            .iter()
            .filter(|e| e.message_id.as_deref() == Some("m-1"))
            .collect();
        assert_eq!(invalid.len(), 1);
        assert_eq!(h.ocr.submissions(), 1);
        assert_eq!(
            report.entries[0].outcome,
            DocumentOutcome::Skipped {
                key: "cvs/invalid/cv_invalid_3.pdf".into()
            }
        );
        assert_eq!(report.persisted(), 1);
        assert_eq!(h.artifact_count().await, 1);
        assert!(h.artifact("cvs/valid/cv_7_pypdf.json").await.is_some());
        // Skipped documents are not redelivered
        assert!(report.item_failures().is_empty());
        assert_eq!(h.staged_files(), 0);

        let response = serde_json::to_value(report.response(false)).unwrap();
        assert_eq!(response, serde_json::json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_generation_error_still_persists_sentinel() {
        let h = harness(
            ScriptedOcr::succeeding_after(0, &[]),
            ScriptedGenerator::failing(),
        );
        h.upload("cv_1.pdf", build_pdf(&[Some("Some resume text")]))
            .await;

        let outcome = h
            .pipeline
            .process_document(&SourceLocation::new(INPUT, "cv_1.pdf"))
            .await;

        assert!(matches!(
            outcome,
            DocumentOutcome::Persisted { structured: false, .. }
        ));
        assert_eq!(
            h.artifact("cv_1_pypdf.json").await.unwrap(),
            serde_json::json!({"error": GENERATION_ERROR})
        );
    }

    #[tokio::test]
    async fn test_reprocessing_overwrites_artifact() {
        let h = harness(
            ScriptedOcr::succeeding_after(0, &[]),
            ScriptedGenerator::replying(RECORD),
        );
        h.upload("cv_7.pdf", build_pdf(&[Some("Candidato 7")])).await;
        let location = SourceLocation::new(INPUT, "cv_7.pdf");

        let first = h.pipeline.process_document(&location).await;
        let second = h.pipeline.process_document(&location).await;

        assert_eq!(first, second);
        assert_eq!(h.artifact_count().await, 1);
        assert_eq!(h.generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_isolated() {
        let h = harness(
            ScriptedOcr::succeeding_after(0, &[]),
            ScriptedGenerator::replying(RECORD),
        );
        h.upload("present.pdf", build_pdf(&[Some("Present")])).await;

        let batch = QueueBatch {
            records: vec![message("m-1", "missing.pdf"), message("m-2", "present.pdf")],
        };
        let report = h.pipeline.process_batch(&batch).await;

        assert!(matches!(
            report.entries[0].outcome,
            DocumentOutcome::Failed { stage: Stage::Fetch, .. }
        ));
        assert_eq!(report.persisted(), 1);
        assert_eq!(h.ocr.submissions(), 0);
        assert_eq!(report.item_failures(), vec!["m-1".to_string()]);
    }

    #[tokio::test]
    async fn test_persist_failure_is_reported() {
        let memory = Arc::new(MemoryObjectStore::new());
        let h = harness_with_store(
            memory.clone(),
            Arc::new(ReadOnlyStore::new(memory)),
            ScriptedOcr::succeeding_after(0, &[]),
            ScriptedGenerator::replying(RECORD),
        );
        h.upload("cv_7.pdf", build_pdf(&[Some("Candidato 7")])).await;

        let outcome = h
            .pipeline
            .process_document(&SourceLocation::new(INPUT, "cv_7.pdf"))
            .await;

        assert!(matches!(
            outcome,
            DocumentOutcome::Failed { stage: Stage::Persist, .. }
        ));
        assert_eq!(h.artifact_count().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_message_is_rejected() {
        let h = harness(
            ScriptedOcr::succeeding_after(0, &[]),
            ScriptedGenerator::replying(RECORD),
        );
        h.upload("cv_7.pdf", build_pdf(&[Some("Candidato 7")])).await;

        let batch = QueueBatch {
            records: vec![
                QueueMessage {
                    message_id: Some("bad".into()),
                    body: "not json".into(),
                },
                message("good", "cv_7.pdf"),
            ],
        };
        let report = h.pipeline.process_batch(&batch).await;

        assert!(matches!(
            report.entries[0].outcome,
            DocumentOutcome::Rejected { .. }
        ));
        assert_eq!(report.persisted(), 1);

        let response = serde_json::to_value(report.response(true)).unwrap();
        assert_eq!(
            response,
            serde_json::json!({
                "status": "ok",
                "batchItemFailures": [{"itemIdentifier": "bad"}]
            })
        );
    }

    #[tokio::test]
    async fn test_handle_returns_ok() {
        let h = harness(
            ScriptedOcr::failing_after(0),
            ScriptedGenerator::replying(RECORD),
        );
        h.upload("scan.pdf", build_pdf(&[None])).await;

        let batch = QueueBatch {
            records: vec![message("m-1", "scan.pdf")],
        };
        let response = h.pipeline.handle(&batch).await;

        assert_eq!(response.status, "ok");
        assert!(response.batch_item_failures.is_none());
        assert_eq!(h.artifact_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancelled_ocr_is_retryable() {
        let mut h = harness(
            ScriptedOcr::succeeding_after(1, &["Jane Doe"]),
            ScriptedGenerator::replying(RECORD),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        h.pipeline = h.pipeline.with_cancellation(cancel);
        h.upload("scan.pdf", build_pdf(&[None])).await;

        let batch = QueueBatch {
            records: vec![message("m-1", "scan.pdf")],
        };
        let report = h.pipeline.process_batch(&batch).await;

        assert!(matches!(
            report.entries[0].outcome,
            DocumentOutcome::Failed { stage: Stage::Ocr, .. }
        ));
        assert_eq!(report.item_failures(), vec!["m-1".to_string()]);
        assert_eq!(h.artifact_count().await, 0);
        assert_eq!(h.generator.calls(), 0);
        assert_eq!(h.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_ocr_submit_error_is_retryable() {
        let h = harness(
            ScriptedOcr::rejecting_submit(),
            ScriptedGenerator::replying(RECORD),
        );
        h.upload("scan.pdf", build_pdf(&[None])).await;

        let outcome = h
            .pipeline
            .process_document(&SourceLocation::new(INPUT, "scan.pdf"))
            .await;

        match outcome {
            DocumentOutcome::Failed { stage, error, .. } => {
                assert_eq!(stage, Stage::Ocr);
                assert!(error.contains("InvalidS3ObjectException"), "got: {}", error);
            }
            other => panic!("expected OCR failure, got {:?}", other),
        }
    }
}
