//! HTTP client for a Textract-compatible text detection service.
//!
//! Speaks the JSON 1.1 protocol (`X-Amz-Target` dispatch). Requests are
//! authenticated with an optional bearer token, which suits a signing proxy
//! or a compatible self-hosted service in front of the real endpoint.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{JobStatus, OcrJob, OcrService};
use crate::error::OcrError;
use crate::storage::SourceLocation;

const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const START_TARGET: &str = "Textract.StartDocumentTextDetection";
const GET_TARGET: &str = "Textract.GetDocumentTextDetection";

/// Textract-compatible OCR job client
pub struct TextractClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl TextractClient {
    pub fn new(endpoint: &str, api_key: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<Req, Resp>(&self, target: &'static str, body: &Req) -> Result<Resp, OcrError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        headers.insert("x-amz-target", HeaderValue::from_static(target));
        if let Some(ref key) = self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|_| OcrError::InvalidResponse("Invalid OCR API key".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .body(serde_json::to_vec(body).map_err(|e| OcrError::InvalidResponse(e.to_string()))?)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(OcrError::Service {
                status: status.as_u16(),
                message: service_error_message(&text),
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| OcrError::InvalidResponse(format!("{} ({})", e, target)))
    }
}

#[async_trait]
impl OcrService for TextractClient {
    async fn submit(&self, location: &SourceLocation) -> Result<String, OcrError> {
        let request = StartRequest {
            document_location: DocumentLocation {
                s3_object: S3Object {
                    bucket: location.bucket.clone(),
                    name: location.key.clone(),
                },
            },
        };
        let response: StartResponse = self.call(START_TARGET, &request).await?;
        Ok(response.job_id)
    }

    async fn poll(&self, job_id: &str) -> Result<OcrJob, OcrError> {
        let mut request = GetRequest {
            job_id: job_id.to_string(),
            next_token: None,
        };
        let first: GetResponse = self.call(GET_TARGET, &request).await?;
        let status = first.job_status()?;
        if status != JobStatus::Succeeded {
            return Ok(OcrJob {
                job_id: job_id.to_string(),
                status,
                lines: Vec::new(),
            });
        }

        let mut lines = first.lines();
        let mut next_token = first.next_token;
        while let Some(token) = next_token {
            request.next_token = Some(token);
            let page: GetResponse = self.call(GET_TARGET, &request).await?;
            lines.extend(page.lines());
            next_token = page.next_token;
        }

        Ok(OcrJob {
            job_id: job_id.to_string(),
            status,
            lines,
        })
    }
}

/// Pull a readable message out of a JSON error body, falling back to the raw text.
fn service_error_message(body: &str) -> String {
    match serde_json::from_str::<ServiceError>(body) {
        Ok(err) => match (err.error_type, err.message) {
            (Some(t), Some(m)) => format!("{}: {}", t, m),
            (None, Some(m)) => m,
            (Some(t), None) => t,
            (None, None) => body.to_string(),
        },
        Err(_) => body.to_string(),
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StartRequest {
    document_location: DocumentLocation,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DocumentLocation {
    s3_object: S3Object,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct S3Object {
    bucket: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StartResponse {
    job_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetRequest {
    job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetResponse {
    job_status: String,
    #[serde(default)]
    status_message: Option<String>,
    #[serde(default)]
    blocks: Vec<Block>,
    #[serde(default)]
    next_token: Option<String>,
}

impl GetResponse {
    fn job_status(&self) -> Result<JobStatus, OcrError> {
        match self.job_status.as_str() {
            "IN_PROGRESS" => Ok(JobStatus::InProgress),
            "SUCCEEDED" => Ok(JobStatus::Succeeded),
            "PARTIAL_SUCCESS" => {
                tracing::warn!(
                    message = self.status_message.as_deref().unwrap_or(""),
                    "OCR job partially succeeded, using available lines"
                );
                Ok(JobStatus::Succeeded)
            }
            "FAILED" => {
                if let Some(ref message) = self.status_message {
                    tracing::debug!(message = %message, "OCR job failure reason");
                }
                Ok(JobStatus::Failed)
            }
            other => Err(OcrError::InvalidResponse(format!(
                "unknown job status '{}'",
                other
            ))),
        }
    }

    fn lines(&self) -> Vec<String> {
        self.blocks
            .iter()
            .filter(|b| b.block_type == "LINE")
            .filter_map(|b| b.text.clone())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Block {
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(rename = "__type", default)]
    error_type: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_request_shape() {
        let request = StartRequest {
            document_location: DocumentLocation {
                s3_object: S3Object {
                    bucket: "cv-input-bucket-poc".into(),
                    name: "cvs/invalid/cv_invalid_3.pdf".into(),
                },
            },
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "DocumentLocation": {
                    "S3Object": {
                        "Bucket": "cv-input-bucket-poc",
                        "Name": "cvs/invalid/cv_invalid_3.pdf"
                    }
                }
            })
        );
    }

    #[test]
    fn test_get_request_omits_missing_token() {
        let request = GetRequest {
            job_id: "abc".into(),
            next_token: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({"JobId": "abc"})
        );
    }

    #[test]
    fn test_lines_keep_order_and_skip_other_blocks() {
        let response: GetResponse = serde_json::from_value(serde_json::json!({
            "JobStatus": "SUCCEEDED",
            "Blocks": [
                {"BlockType": "PAGE"},
                {"BlockType": "LINE", "Text": "Curriculum Vitae"},
                {"BlockType": "WORD", "Text": "Curriculum"},
                {"BlockType": "LINE", "Text": "Nombre: Candidato 3"}
            ],
            "NextToken": "page-2"
        }))
        .unwrap();

        assert_eq!(response.job_status().unwrap(), JobStatus::Succeeded);
        assert_eq!(
            response.lines(),
            vec!["Curriculum Vitae".to_string(), "Nombre: Candidato 3".to_string()]
        );
        assert_eq!(response.next_token.as_deref(), Some("page-2"));
    }

    #[test]
    fn test_job_status_mapping() {
        let parse = |status: &str| {
            let response: GetResponse =
                serde_json::from_value(serde_json::json!({ "JobStatus": status })).unwrap();
            response.job_status()
        };

        assert_eq!(parse("IN_PROGRESS").unwrap(), JobStatus::InProgress);
        assert_eq!(parse("FAILED").unwrap(), JobStatus::Failed);
        assert_eq!(parse("PARTIAL_SUCCESS").unwrap(), JobStatus::Succeeded);
        assert!(matches!(parse("EXPLODED"), Err(OcrError::InvalidResponse(_))));
    }

    #[test]
    fn test_service_error_message() {
        assert_eq!(
            service_error_message(
                r#"{"__type":"InvalidS3ObjectException","Message":"Unable to get object"}"#
            ),
            "InvalidS3ObjectException: Unable to get object"
        );
        assert_eq!(service_error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_endpoint_is_normalized() {
        let client = TextractClient::new("http://localhost:4566/", None);
        assert_eq!(client.endpoint(), "http://localhost:4566");
    }
}
