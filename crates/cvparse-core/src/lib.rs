//! cvparse core - resume extraction pipeline
//!
//! Turns uploaded resume PDFs into structured JSON records:
//! - Text layer extraction (lopdf), with an asynchronous OCR job as fallback
//! - Structured extraction through a text-generation service
//! - Per-document orchestration over queue batches of storage notifications
//! - A batch worker and a completeness audit for operating the pipeline

pub mod audit;
pub mod config;
pub mod error;
pub mod events;
pub mod generate;
pub mod jobs;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod storage;

#[cfg(test)]
mod testing;

use std::sync::Arc;

pub use config::Config;
pub use events::{QueueBatch, QueueMessage};
pub use generate::TextGenerator;
pub use jobs::{spawn_batch_worker, BatchConfig, BatchWorkerHandle, ProcessingEvent};
pub use ocr::OcrService;
pub use pipeline::{BatchReport, DocumentOutcome, HandlerResponse, Pipeline};
pub use storage::{LocalObjectStore, MemoryObjectStore, ObjectStore, SourceLocation};

/// Remote service clients, built once per process and shared read-only.
#[derive(Clone)]
pub struct ServiceClients {
    pub store: Arc<dyn ObjectStore>,
    pub ocr: Arc<dyn OcrService>,
    pub generator: Arc<dyn TextGenerator>,
}

impl ServiceClients {
    pub fn from_config(config: &Config) -> Self {
        tracing::debug!(
            store_root = ?config.store_root,
            ocr_endpoint = %config.ocr_endpoint,
            provider = config.provider.provider_type(),
            "Building service clients"
        );
        Self {
            store: Arc::new(LocalObjectStore::new(&config.store_root)),
            ocr: Arc::new(ocr::TextractClient::new(
                &config.ocr_endpoint,
                config.ocr_api_key.as_deref(),
            )),
            generator: config.provider.build(),
        }
    }
}

/// Build the pipeline described by `config`.
pub fn build_pipeline(config: &Config) -> Pipeline {
    Pipeline::new(
        ServiceClients::from_config(config),
        config.pipeline_settings(),
    )
}
