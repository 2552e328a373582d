use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::generate::{anthropic, bedrock, ProviderConfig};
use crate::ocr::{OcrSettings, DEFAULT_POLL_INTERVAL};
use crate::pipeline::PipelineSettings;

pub const DEFAULT_INPUT_BUCKET: &str = "cv-input-bucket-poc";
pub const DEFAULT_OUTPUT_BUCKET: &str = "cv-output-bucket-poc";
pub const DEFAULT_OCR_ENDPOINT: &str = "https://textract.us-east-1.amazonaws.com";
pub const DEFAULT_REGION: &str = "us-east-1";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the directory-backed object store, one sub-directory per bucket
    pub store_root: PathBuf,
    /// Transient document copies
    pub work_dir: PathBuf,
    /// Bucket the audit treats as the document source
    pub input_bucket: String,
    /// Bucket receiving artifacts
    pub output_bucket: String,
    pub ocr_endpoint: String,
    pub ocr_api_key: Option<String>,
    pub ocr: OcrSettings,
    pub provider: ProviderConfig,
    pub report_batch_item_failures: bool,
}

impl Config {
    /// Load configuration from the environment or use defaults
    pub fn load_or_default() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// Empty values count as unset. Unparseable numbers are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let store_root = var("CVPARSE_STORE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("cvparse")
                    .join("buckets")
            });
        let work_dir = var("CVPARSE_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);

        let ocr = OcrSettings {
            poll_interval: parse_var::<u64>(&var, "OCR_POLL_INTERVAL_SECS")
                .filter(|secs| {
                    if *secs == 0 {
                        tracing::warn!("Ignoring invalid OCR_POLL_INTERVAL_SECS='0'");
                    }
                    *secs > 0
                })
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            timeout: parse_var::<u64>(&var, "OCR_TIMEOUT_SECS").map(Duration::from_secs),
        };

        let provider = match var("GENERATION_PROVIDER").as_deref() {
            Some("anthropic") => ProviderConfig::Anthropic {
                api_key: var("ANTHROPIC_API_KEY"),
                model: var("ANTHROPIC_MODEL")
                    .unwrap_or_else(|| anthropic::DEFAULT_MODEL.to_string()),
            },
            other => {
                if let Some(name) = other.filter(|name| *name != "bedrock") {
                    tracing::warn!("Unknown GENERATION_PROVIDER '{}', using bedrock", name);
                }
                let region = var("BEDROCK_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string());
                ProviderConfig::Bedrock {
                    endpoint: var("BEDROCK_ENDPOINT")
                        .unwrap_or_else(|| bedrock::regional_endpoint(&region)),
                    model_id: var("BEDROCK_MODEL_ID")
                        .unwrap_or_else(|| bedrock::DEFAULT_MODEL_ID.to_string()),
                    api_key: var("AWS_BEARER_TOKEN_BEDROCK"),
                }
            }
        };

        Self {
            store_root,
            work_dir,
            input_bucket: var("INPUT_BUCKET").unwrap_or_else(|| DEFAULT_INPUT_BUCKET.to_string()),
            output_bucket: var("OUTPUT_BUCKET")
                .unwrap_or_else(|| DEFAULT_OUTPUT_BUCKET.to_string()),
            ocr_endpoint: var("OCR_ENDPOINT").unwrap_or_else(|| DEFAULT_OCR_ENDPOINT.to_string()),
            ocr_api_key: var("OCR_API_KEY"),
            ocr,
            provider,
            report_batch_item_failures: parse_var::<bool>(&var, "REPORT_BATCH_ITEM_FAILURES")
                .unwrap_or(false),
        }
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.store_root)?;
        std::fs::create_dir_all(&self.work_dir)?;
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            output_bucket: self.output_bucket.clone(),
            work_dir: self.work_dir.clone(),
            ocr: self.ocr.clone(),
            report_item_failures: self.report_batch_item_failures,
        }
    }
}

fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = var(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}='{}'", name, raw);
            None
        }
    }
}
