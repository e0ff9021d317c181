//! Google Generative Language (Gemini) REST client.

use crate::fallback::{GenerateBackend, GenerateError, Payload};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini client for content generation and model listing.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
        }
    }

    /// List models available to this API key.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{API_BASE_URL}/models");
        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .context("Failed to reach the model listing endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Model listing error ({}): {}", status, body);
        }

        let listing: ModelsResponse = response
            .json()
            .await
            .context("Failed to parse model listing")?;
        Ok(listing.models)
    }

    async fn generate_content(&self, model: &str, payload: &Payload) -> Result<String, GenerateError> {
        let request = GenerateContentRequest::from_payload(payload);
        let url = format!("{API_BASE_URL}/{model}:generateContent");
        debug!(model, attachments = payload.attachments.len(), "sending generateContent request");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|source| GenerateError::Transport {
                model: model.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_error(model, status, &body));
        }

        let response: GenerateContentResponse =
            response
                .json()
                .await
                .map_err(|source| GenerateError::Transport {
                    model: model.to_string(),
                    source,
                })?;

        let text = response.text();
        if text.is_empty() {
            return Err(GenerateError::BadResponse {
                model: model.to_string(),
                message: "response contained no text parts".to_string(),
            });
        }

        info!(model, chars = text.len(), "generateContent succeeded");
        Ok(text)
    }
}

#[async_trait::async_trait]
impl GenerateBackend for GeminiClient {
    async fn generate(&self, model: &str, payload: &Payload) -> Result<String, GenerateError> {
        self.generate_content(model, payload).await
    }
}

/// Map an HTTP error response to the tagged per-candidate taxonomy.
///
/// HTTP 429 / RESOURCE_EXHAUSTED means quota; HTTP 404 / NOT_FOUND means the
/// model is not exposed to this key; everything else is a plain API fault.
fn classify_api_error(model: &str, status: StatusCode, body: &str) -> GenerateError {
    let detail = serde_json::from_str::<ApiErrorResponse>(body)
        .ok()
        .and_then(|r| r.error);
    let api_status = detail.as_ref().and_then(|e| e.status.clone());
    let message = detail
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.chars().take(500).collect());

    if status == StatusCode::TOO_MANY_REQUESTS || api_status.as_deref() == Some("RESOURCE_EXHAUSTED")
    {
        GenerateError::QuotaExhausted {
            model: model.to_string(),
            message,
        }
    } else if status == StatusCode::NOT_FOUND || api_status.as_deref() == Some("NOT_FOUND") {
        GenerateError::ModelUnavailable {
            model: model.to_string(),
            message,
        }
    } else {
        GenerateError::Api {
            model: model.to_string(),
            status: status.as_u16(),
            message,
        }
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

impl GenerateContentRequest {
    fn from_payload(payload: &Payload) -> Self {
        let mut parts = vec![Part::Text {
            text: payload.prompt.clone(),
        }];
        for attachment in &payload.attachments {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: attachment.mime_type.clone(),
                    data: BASE64.encode(&attachment.data),
                },
            });
        }
        Self {
            contents: vec![Content { parts }],
        }
    }
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    /// Concatenate the text parts of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

/// Structured error body returned by the API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
    status: Option<String>,
}

/// One entry from the model listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(
        default,
        rename = "displayName",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,
    #[serde(
        default,
        rename = "supportedGenerationMethods",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub supported_generation_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}
