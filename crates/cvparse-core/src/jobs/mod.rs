//! Long-lived batch worker.
//!
//! ```text
//! queue(message) ──► Batcher (10 msgs / 1 s) ──► Pipeline::process_batch ──► events
//! ```
//!
//! Messages are handed over one at a time, grouped into batches the same way a
//! queue trigger would group them, and each batch runs through the pipeline
//! sequentially. One [`ProcessingEvent`] is emitted per document, plus one per
//! finished batch.

mod worker;

pub use worker::{BatchConfig, Batcher};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::events::{QueueBatch, QueueMessage};
use crate::pipeline::{BatchEntry, Pipeline};

/// Event emitted by the batch worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ProcessingEvent {
    /// One document finished (persisted, skipped, failed or rejected).
    Document(BatchEntry),
    /// A batch finished.
    BatchFinished {
        documents: usize,
        persisted: usize,
        skipped: usize,
        failed: usize,
    },
}

/// Handle to queue messages for processing.
///
/// The worker stops once all handles are dropped and the last batch is done.
#[derive(Clone)]
pub struct BatchWorkerHandle {
    tx: mpsc::Sender<QueueMessage>,
}

impl BatchWorkerHandle {
    /// Queue a message. Waits only when the channel is full.
    pub async fn queue(&self, message: QueueMessage) -> anyhow::Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| anyhow::anyhow!("Batch worker channel closed"))
    }
}

/// Spawn the batch worker.
///
/// Returns a handle to queue messages and a receiver for processing events.
/// The event receiver closes after the worker has stopped.
pub fn spawn_batch_worker(
    pipeline: Arc<Pipeline>,
    config: BatchConfig,
) -> (BatchWorkerHandle, mpsc::Receiver<ProcessingEvent>) {
    let (message_tx, message_rx) = mpsc::channel::<QueueMessage>(64);
    let (event_tx, event_rx) = mpsc::channel::<ProcessingEvent>(64);

    tokio::spawn(async move {
        tracing::info!(
            max_size = config.max_size,
            max_wait_ms = config.max_wait.as_millis() as u64,
            "Batch worker started"
        );
        let mut batcher = Batcher::new(message_rx, config);

        while let Some(records) = batcher.next_batch().await {
            let batch = QueueBatch { records };
            tracing::debug!(messages = batch.len(), "Processing batch");

            let report = pipeline.process_batch(&batch).await;
            let finished = ProcessingEvent::BatchFinished {
                documents: report.entries.len(),
                persisted: report.persisted(),
                skipped: report.skipped(),
                failed: report.failed(),
            };

            for entry in report.entries {
                let _ = event_tx.send(ProcessingEvent::Document(entry)).await;
            }
            let _ = event_tx.send(finished).await;
        }

        tracing::info!("Batch worker stopped");
    });

    (BatchWorkerHandle { tx: message_tx }, event_rx)
}
