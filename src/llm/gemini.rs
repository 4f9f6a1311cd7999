//! Gemini provider
//!
//! Uses the `generateContent` REST endpoint with provider-side structured
//! output (`responseMimeType` + `responseJsonSchema`) when a schema is given.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{Generation, GenerationRequest, StructuredGenerator, TokenUsage};
use crate::config::{LlmConfig, TemperatureConfig};
use crate::error::{CityScoutError, GenerationError};

const MAX_ERROR_BODY: usize = 500;

/// Text-generation client for Google's Gemini models
pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperatures: TemperatureConfig,
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_json_schema: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

// ============================================================================
// Provider Implementation
// ============================================================================

impl GeminiGenerator {
    /// Create a generator from the LLM configuration. Fails when no API key
    /// is configured.
    pub fn new(config: &LlmConfig) -> Result<Self, CityScoutError> {
        let api_key = match config.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => {
                return Err(CityScoutError::config(
                    "Missing Gemini API key. Set GEMINI_API_KEY or llm.api_key",
                ));
            }
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.into()))
            .user_agent(concat!("CityScout/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CityScoutError::api(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperatures: config.temperatures,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_request(&self, request: GenerationRequest) -> GenerateContentRequest {
        let structured = request.schema.is_some();
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: request
                    .context
                    .into_iter()
                    .map(|text| Part { text })
                    .collect(),
            }],
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part {
                    text: request.instruction,
                }],
            }),
            generation_config: GenerationConfig {
                temperature: self.temperatures.for_role(request.role),
                response_mime_type: structured.then_some("application/json"),
                response_json_schema: request.schema,
            },
        }
    }
}

#[async_trait]
impl StructuredGenerator for GeminiGenerator {
    #[instrument(skip_all, fields(role = %request.role, model = %self.model))]
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, GenerationError> {
        let body = self.build_request(request);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(e.to_string())
                } else {
                    GenerationError::Provider(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            warn!(status = status.as_u16(), "Gemini API error");
            return Err(GenerationError::Provider(format!(
                "Gemini API error {status}: {body}"
            )));
        }

        let api_response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Provider(format!("Invalid Gemini response: {e}")))?;

        let usage = api_response
            .usage_metadata
            .map(|u| TokenUsage {
                input_tokens: u.prompt_token_count.unwrap_or(0),
                output_tokens: u.candidates_token_count.unwrap_or(0),
            })
            .unwrap_or_default();

        let candidate = api_response
            .candidates
            .and_then(|candidates| candidates.into_iter().next())
            .ok_or_else(|| GenerationError::Provider("Gemini returned no candidates".to_string()))?;

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            debug!(finish_reason = ?candidate.finish_reason, "Gemini returned empty content");
            return Err(GenerationError::EmptyOutput);
        }

        Ok(Generation { text, usage })
    }
}
