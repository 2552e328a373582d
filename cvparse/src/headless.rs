use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use cvparse_core::events::notification_body;
use cvparse_core::pipeline::DocumentOutcome;
use cvparse_core::{
    build_pipeline, spawn_batch_worker, BatchConfig, Config, ProcessingEvent, QueueMessage,
    SourceLocation,
};

/// Run the batch worker until stdin closes or Ctrl+C.
pub fn run(batch: BatchConfig) -> anyhow::Result<()> {
    tracing::info!("Starting cvparse worker");
    crate::runtime()?.block_on(run_worker(Config::load_or_default(), batch))
}

async fn run_worker(config: Config, batch: BatchConfig) -> anyhow::Result<()> {
    config
        .ensure_dirs()
        .context("Failed to create data directories")?;
    tracing::info!("Store root: {:?}", config.store_root);

    let cancel = CancellationToken::new();
    let pipeline = Arc::new(build_pipeline(&config).with_cancellation(cancel.clone()));
    let (handle, mut events) = spawn_batch_worker(pipeline, batch);

    let logger = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    tracing::info!("Worker running. Reading notifications from stdin, Ctrl+C to stop.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Shutting down...");
                cancel.cancel();
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    tracing::info!("Input closed, finishing queued work");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_line(&line) {
                    Ok(message) => handle.queue(message).await?,
                    Err(e) => tracing::warn!("Ignoring input line: {:#}", e),
                }
            }
        }
    }

    // Closing the last handle lets the worker drain and stop
    drop(handle);
    logger.await.context("Event logger panicked")?;
    Ok(())
}

/// Parse one stdin line into a queue message.
///
/// Accepted forms:
/// - a queue message: `{"messageId": "...", "body": "..."}`
/// - a bare storage notification: `{"Records": [{"s3": ...}]}`
/// - a location: `bucket/key`
pub fn parse_line(line: &str) -> anyhow::Result<QueueMessage> {
    let line = line.trim();
    if line.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(line).context("Invalid JSON")?;
        if value.get("body").is_some() {
            return serde_json::from_value(value).context("Invalid queue message");
        }
        return Ok(QueueMessage {
            message_id: None,
            body: line.to_string(),
        });
    }

    let (bucket, key) = line
        .split_once('/')
        .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
        .with_context(|| format!("Expected bucket/key, got '{}'", line))?;
    Ok(QueueMessage {
        message_id: None,
        body: notification_body(&SourceLocation::new(bucket, key)),
    })
}

fn log_event(event: &ProcessingEvent) {
    match event {
        ProcessingEvent::Document(entry) => match &entry.outcome {
            DocumentOutcome::Persisted {
                key,
                output_key,
                method,
                structured,
            } => tracing::info!(
                output_key = %output_key,
                structured,
                "Completed {} with method {}",
                key,
                method
            ),
            DocumentOutcome::Skipped { key } => tracing::warn!("Skipped {}: no text", key),
            DocumentOutcome::Failed { key, stage, error } => {
                tracing::error!(stage = %stage, "Failed {}: {}", key, error)
            }
            DocumentOutcome::Rejected { error } => {
                tracing::error!(message_id = ?entry.message_id, "Rejected message: {}", error)
            }
        },
        ProcessingEvent::BatchFinished {
            documents,
            persisted,
            skipped,
            failed,
        } => tracing::info!(
            documents,
            persisted,
            skipped,
            failed,
            "Batch finished"
        ),
    }
}
