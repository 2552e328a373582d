use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;

use cvparse_core::audit::{check_completeness, CompletenessReport};
use cvparse_core::{build_pipeline, BatchReport, Config, HandlerResponse, LocalObjectStore, QueueBatch};

/// Process one batch event file and print the result as JSON.
pub fn process(event_file: &Path, full_report: bool) -> anyhow::Result<ExitCode> {
    let config = Config::load_or_default();
    let (report, response) = crate::runtime()?.block_on(process_event_file(event_file, &config))?;

    let output = if full_report {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{}", output);
    Ok(ExitCode::SUCCESS)
}

pub async fn process_event_file(
    event_file: &Path,
    config: &Config,
) -> anyhow::Result<(BatchReport, HandlerResponse)> {
    let json = tokio::fs::read_to_string(event_file)
        .await
        .with_context(|| format!("Failed to read event file {:?}", event_file))?;
    let batch = QueueBatch::from_json(&json).context("Failed to parse batch event")?;

    config
        .ensure_dirs()
        .context("Failed to create data directories")?;
    let pipeline = build_pipeline(config);

    tracing::info!(messages = batch.len(), "Processing batch event");
    let report = pipeline.process_batch(&batch).await;
    let response = report.response(config.report_batch_item_failures);
    Ok((report, response))
}

/// Buckets and prefixes for the completeness audit. Unset buckets come from config.
#[derive(Debug, Clone, Default)]
pub struct AuditOptions {
    pub input_bucket: Option<String>,
    pub output_bucket: Option<String>,
    pub input_prefix: String,
    pub output_prefix: String,
}

/// Print the completeness report; exit code 1 when documents lack artifacts.
pub fn audit(options: AuditOptions) -> anyhow::Result<ExitCode> {
    let config = Config::load_or_default();
    let report = crate::runtime()?.block_on(audit_buckets(&config, &options))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.is_complete() {
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::warn!("{} documents have no output", report.missing.len());
        Ok(ExitCode::from(1))
    }
}

pub async fn audit_buckets(
    config: &Config,
    options: &AuditOptions,
) -> anyhow::Result<CompletenessReport> {
    let store = LocalObjectStore::new(&config.store_root);
    let input_bucket = options
        .input_bucket
        .as_deref()
        .unwrap_or(&config.input_bucket);
    let output_bucket = options
        .output_bucket
        .as_deref()
        .unwrap_or(&config.output_bucket);

    let report = check_completeness(
        &store,
        input_bucket,
        output_bucket,
        &options.input_prefix,
        &options.output_prefix,
    )
    .await
    .with_context(|| format!("Failed to list {} / {}", input_bucket, output_bucket))?;
    Ok(report)
}
