//! Scripted fakes for the remote services, shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{GenerationError, OcrError, StoreError};
use crate::generate::TextGenerator;
use crate::ocr::{JobStatus, OcrJob, OcrService};
use crate::storage::{MemoryObjectStore, ObjectStore, SourceLocation};

#[derive(Debug, Clone, Copy)]
enum Ending {
    Succeed,
    Fail,
    Never,
}

/// OCR service whose jobs report `IN_PROGRESS` a fixed number of times.
pub struct ScriptedOcr {
    ending: Ending,
    reject_submit: bool,
    in_progress_polls: usize,
    lines: Vec<String>,
    submissions: AtomicUsize,
    polls: AtomicUsize,
    polls_by_job: Mutex<HashMap<String, usize>>,
    locations: Mutex<Vec<SourceLocation>>,
}

impl ScriptedOcr {
    fn new(ending: Ending, in_progress_polls: usize, lines: &[&str]) -> Self {
        Self {
            ending,
            reject_submit: false,
            in_progress_polls,
            lines: lines.iter().map(|l| l.to_string()).collect(),
            submissions: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            polls_by_job: Mutex::new(HashMap::new()),
            locations: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding_after(in_progress_polls: usize, lines: &[&str]) -> Self {
        Self::new(Ending::Succeed, in_progress_polls, lines)
    }

    pub fn failing_after(in_progress_polls: usize) -> Self {
        Self::new(Ending::Fail, in_progress_polls, &[])
    }

    pub fn never_finishing() -> Self {
        Self::new(Ending::Never, 0, &[])
    }

    pub fn rejecting_submit() -> Self {
        let mut ocr = Self::new(Ending::Succeed, 0, &[]);
        ocr.reject_submit = true;
        ocr
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn submitted_locations(&self) -> Vec<SourceLocation> {
        self.locations.lock().unwrap().clone()
    }
}

#[async_trait]
impl OcrService for ScriptedOcr {
    async fn submit(&self, location: &SourceLocation) -> Result<String, OcrError> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        self.locations.lock().unwrap().push(location.clone());
        if self.reject_submit {
            return Err(OcrError::Service {
                status: 400,
                message: "InvalidS3ObjectException: Unable to get object metadata".into(),
            });
        }
        Ok(format!("job-{}", n))
    }

    async fn poll(&self, job_id: &str) -> Result<OcrJob, OcrError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let seen = {
            let mut by_job = self.polls_by_job.lock().unwrap();
            let count = by_job.entry(job_id.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let status = match self.ending {
            _ if seen <= self.in_progress_polls => JobStatus::InProgress,
            Ending::Never => JobStatus::InProgress,
            Ending::Succeed => JobStatus::Succeeded,
            Ending::Fail => JobStatus::Failed,
        };
        let lines = if status == JobStatus::Succeeded {
            self.lines.clone()
        } else {
            Vec::new()
        };

        Ok(OcrJob {
            job_id: job_id.to_string(),
            status,
            lines,
        })
    }
}

/// Generator that returns a fixed reply (or always fails) and records prompts.
pub struct ScriptedGenerator {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().ok_or_else(|| GenerationError::Api {
            provider: "scripted",
            status: 503,
            message: "ServiceUnavailableException".into(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }
}

/// Store that serves reads from memory and refuses every write.
pub struct ReadOnlyStore {
    inner: Arc<MemoryObjectStore>,
}

impl ReadOnlyStore {
    pub fn new(inner: Arc<MemoryObjectStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ObjectStore for ReadOnlyStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        self.inner.fetch(bucket, key).await
    }

    async fn put(&self, _bucket: &str, _key: &str, _body: Bytes) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only store",
        )))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list(bucket, prefix).await
    }
}
