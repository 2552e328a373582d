//! Structured extraction via a text-generation service.
//!
//! Raw resume text goes into a fixed prompt that asks for a JSON object with
//! five fields. Any failure along the way produces the error sentinel rather
//! than an error, so every document with text still yields an artifact.
//!
//! Providers:
//! - Bedrock (Nova message format)
//! - Anthropic Messages API

pub mod anthropic;
pub mod bedrock;

pub use anthropic::AnthropicProvider;
pub use bedrock::BedrockProvider;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GenerationError;

/// Characters of raw text sent to the model.
pub const MAX_PROMPT_CHARS: usize = 4000;

/// Fields every structured record must contain.
pub const RECORD_FIELDS: [&str; 5] = [
    "name",
    "email",
    "work experience",
    "education",
    "technical skills",
];

/// Message stored in the sentinel record.
pub const GENERATION_ERROR: &str = "Could not process with Bedrock";

/// Single-shot text generation
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for a single user prompt
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Get the provider name (e.g., "bedrock", "anthropic")
    fn provider_name(&self) -> &'static str;

    /// Get the model identifier
    fn model_id(&self) -> &str;
}

/// Generation provider selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    Bedrock {
        endpoint: String,
        model_id: String,
        api_key: Option<String>,
    },
    Anthropic {
        api_key: Option<String>,
        model: String,
    },
}

impl ProviderConfig {
    pub fn provider_type(&self) -> &'static str {
        match self {
            ProviderConfig::Bedrock { .. } => "bedrock",
            ProviderConfig::Anthropic { .. } => "anthropic",
        }
    }

    /// Build the configured provider.
    pub fn build(&self) -> Arc<dyn TextGenerator> {
        match self {
            ProviderConfig::Bedrock {
                endpoint,
                model_id,
                api_key,
            } => Arc::new(BedrockProvider::new(endpoint, model_id, api_key.as_deref())),
            ProviderConfig::Anthropic { api_key, model } => {
                Arc::new(AnthropicProvider::new(api_key.as_deref(), model))
            }
        }
    }
}

/// Result of structured extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StructuredRecord {
    /// The model's JSON object, in the model's field order.
    Fields(Map<String, Value>),
    /// `{"error": "Could not process with Bedrock"}`
    Unavailable { error: String },
}

impl StructuredRecord {
    pub fn unavailable() -> Self {
        StructuredRecord::Unavailable {
            error: GENERATION_ERROR.to_string(),
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, StructuredRecord::Fields(_))
    }

    /// Artifact body: JSON with two-space indentation.
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}

/// First `MAX_PROMPT_CHARS` characters of the text.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Build the fixed extraction prompt.
pub fn build_prompt(raw_text: &str) -> String {
    let fields: String = RECORD_FIELDS
        .iter()
        .map(|f| format!("- {}\n", f))
        .collect();
    format!(
        "Below is the text from a resume (CV):\n\n{}\n\n\
         Extract and return in JSON format the following fields:\n{}\n\
         Respond only with valid JSON.\n",
        truncate_chars(raw_text, MAX_PROMPT_CHARS),
        fields
    )
}

/// Strip a surrounding Markdown code fence (```json ... ```), if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening fence line
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}

/// Parse model output into record fields.
pub fn parse_record(text: &str) -> Result<Map<String, Value>, String> {
    let value: Value =
        serde_json::from_str(strip_code_fence(text)).map_err(|e| format!("invalid JSON: {}", e))?;
    let Value::Object(fields) = value else {
        return Err("response is not a JSON object".to_string());
    };
    if let Some(missing) = RECORD_FIELDS.iter().find(|f| !fields.contains_key(**f)) {
        return Err(format!("missing field '{}'", missing));
    }
    Ok(fields)
}

/// Structured Extractor stage.
pub struct StructuredExtractor {
    generator: Arc<dyn TextGenerator>,
}

impl StructuredExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Map raw text to a record. Never fails: falls back to the sentinel.
    pub async fn extract(&self, raw_text: &str) -> StructuredRecord {
        let prompt = build_prompt(raw_text);

        let response = match self.generator.generate(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    provider = self.generator.provider_name(),
                    model = self.generator.model_id(),
                    "Error in generation: {}",
                    e
                );
                return StructuredRecord::unavailable();
            }
        };

        match parse_record(&response) {
            Ok(fields) => StructuredRecord::Fields(fields),
            Err(reason) => {
                tracing::warn!(
                    provider = self.generator.provider_name(),
                    "Unusable generation output: {}",
                    reason
                );
                StructuredRecord::unavailable()
            }
        }
    }
}
