//! Bedrock runtime provider
//!
//! Calls `InvokeModel` with the Nova message format. Authentication uses a
//! Bedrock API key sent as a bearer token.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::TextGenerator;
use crate::error::GenerationError;

pub const DEFAULT_MODEL_ID: &str = "us.amazon.nova-micro-v1:0";

/// Runtime endpoint for a region.
pub fn regional_endpoint(region: &str) -> String {
    format!("https://bedrock-runtime.{}.amazonaws.com", region)
}

/// Bedrock InvokeModel provider
pub struct BedrockProvider {
    client: reqwest::Client,
    endpoint: String,
    model_id: String,
    api_key: Option<String>,
}

impl BedrockProvider {
    pub fn new(endpoint: &str, model_id: &str, api_key: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model_id: model_id.to_string(),
            api_key: api_key.map(str::to_string),
        }
    }

    fn invoke_url(&self) -> String {
        format!("{}/model/{}/invoke", self.endpoint, self.model_id)
    }
}

/// Nova request body for a single user prompt
fn build_request(prompt: &str) -> NovaRequest {
    NovaRequest {
        messages: vec![NovaMessage {
            role: "user".to_string(),
            content: vec![NovaContent {
                text: prompt.to_string(),
            }],
        }],
    }
}

/// Text of the first content block of the output message
fn response_text(response: NovaResponse) -> Result<String, GenerationError> {
    response
        .output
        .message
        .content
        .into_iter()
        .next()
        .and_then(|c| c.text)
        .ok_or_else(|| GenerationError::InvalidResponse("no text content in output".to_string()))
}

#[async_trait]
impl TextGenerator for BedrockProvider {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(ref key) = self.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key))
                    .map_err(|_| GenerationError::NotConfigured("invalid Bedrock API key".into()))?,
            );
        }

        let response = self
            .client
            .post(self.invoke_url())
            .headers(headers)
            .json(&build_request(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<BedrockError>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(GenerationError::Api {
                provider: "bedrock",
                status: status.as_u16(),
                message,
            });
        }

        let body: NovaResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        response_text(body)
    }

    fn provider_name(&self) -> &'static str {
        "bedrock"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct NovaRequest {
    messages: Vec<NovaMessage>,
}

#[derive(Debug, Serialize)]
struct NovaMessage {
    role: String,
    content: Vec<NovaContent>,
}

#[derive(Debug, Serialize)]
struct NovaContent {
    text: String,
}

#[derive(Debug, Deserialize)]
struct NovaResponse {
    output: NovaOutput,
}

#[derive(Debug, Deserialize)]
struct NovaOutput {
    message: NovaOutputMessage,
}

#[derive(Debug, Deserialize)]
struct NovaOutputMessage {
    #[serde(default)]
    content: Vec<NovaOutputContent>,
}

#[derive(Debug, Deserialize)]
struct NovaOutputContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BedrockError {
    #[serde(alias = "Message")]
    message: String,
}
