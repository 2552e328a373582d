//! Completeness audit: which uploaded documents have an artifact.
//!
//! Inputs (`*.pdf`) and outputs (`*.json`) are joined on their base name,
//! so `cvs/cv_7.pdf` matches `cv_7_pypdf.json` or `cv_7_textract.json`
//! regardless of the prefixes the two buckets use.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::StoreError;
use crate::pipeline::{base_name, ExtractionMethod};
use crate::storage::ObjectStore;

/// An input with a matching artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedEntry {
    pub base_name: String,
    pub input_key: String,
    pub output_key: String,
    /// `None` when the artifact name carries no method suffix.
    pub method: Option<ExtractionMethod>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletenessReport {
    pub input_count: usize,
    pub output_count: usize,
    pub processed: Vec<ProcessedEntry>,
    /// Input keys without an artifact
    pub missing: Vec<String>,
    /// Artifact keys without an input
    pub orphaned: Vec<String>,
}

impl CompletenessReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn processed_with(&self, method: ExtractionMethod) -> usize {
        self.processed
            .iter()
            .filter(|p| p.method == Some(method))
            .count()
    }
}

/// Join already-listed keys. Keys of the wrong type are ignored.
pub fn compare(input_keys: &[String], output_keys: &[String]) -> CompletenessReport {
    let inputs: BTreeMap<&str, &String> = input_keys
        .iter()
        .filter(|k| k.ends_with(".pdf"))
        .map(|k| (base_name(k), k))
        .collect();
    let outputs: BTreeMap<&str, &String> = output_keys
        .iter()
        .filter(|k| k.ends_with(".json"))
        .map(|k| (base_name(k), k))
        .collect();

    let mut report = CompletenessReport {
        input_count: inputs.len(),
        output_count: outputs.len(),
        ..Default::default()
    };

    for (name, input_key) in &inputs {
        match outputs.get(name) {
            Some(output_key) => report.processed.push(ProcessedEntry {
                base_name: name.to_string(),
                input_key: input_key.to_string(),
                output_key: output_key.to_string(),
                method: ExtractionMethod::from_output_key(output_key),
            }),
            None => report.missing.push(input_key.to_string()),
        }
    }
    report.orphaned = outputs
        .iter()
        .filter(|(name, _)| !inputs.contains_key(*name))
        .map(|(_, key)| key.to_string())
        .collect();

    report
}

/// List both buckets and join them.
pub async fn check_completeness(
    store: &dyn ObjectStore,
    input_bucket: &str,
    output_bucket: &str,
    input_prefix: &str,
    output_prefix: &str,
) -> Result<CompletenessReport, StoreError> {
    let input_keys = store.list(input_bucket, input_prefix).await?;
    let output_keys = store.list(output_bucket, output_prefix).await?;

    let report = compare(&input_keys, &output_keys);
    tracing::info!(
        inputs = report.input_count,
        outputs = report.output_count,
        processed = report.processed.len(),
        missing = report.missing.len(),
        orphaned = report.orphaned.len(),
        "Completeness check finished"
    );
    Ok(report)
}
