//! Gemini API client for report generation
//!
//! Multi-part requests (prompt text plus inline documents) with JSON
//! response mode. Uses a long-lived reqwest::Client for connection pooling.

use crate::documents::InlineData;
use crate::error::OrchestrationError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

/// Sampling settings for one call.
#[derive(Debug, Clone, Copy)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub max_output_tokens: i32,
}

impl GeminiClient {
    pub fn new(api_key: String, model: &str) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(180))
            .build()
            .map_err(|e| {
                OrchestrationError::Config(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: format!("{}/{}:generateContent", BASE_URL, model),
        })
    }

    /// Point the client at a different endpoint (local proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Generate a JSON response from Gemini
    pub async fn generate(
        &self,
        system_prompt: &str,
        parts: Vec<Part>,
        sampling: SamplingConfig,
    ) -> crate::Result<String> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::Generation(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let request = GeminiRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GenerationConfig {
                temperature: sampling.temperature,
                max_output_tokens: sampling.max_output_tokens,
                response_mime_type: "application/json".to_string(),
            },
            system_instruction: SystemInstruction {
                parts: vec![Part::text(system_prompt)],
            },
        };

        info!("Calling Gemini API");

        let response = self
            .client
            .post(&self.base_url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                OrchestrationError::Generation(format!("Gemini API error: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(OrchestrationError::Generation(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            OrchestrationError::Generation(format!("Gemini parse error: {}", e))
        })?;

        extract_text(gemini_response)
    }
}

fn extract_text(response: GeminiResponse) -> crate::Result<String> {
    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        OrchestrationError::Generation("No response from Gemini API".to_string())
    })?;

    if candidate.finish_reason.as_deref() == Some("MAX_TOKENS") {
        return Err(OrchestrationError::Generation(
            "Gemini response truncated at max output tokens".to_string(),
        ));
    }

    let text: String = candidate
        .content
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect();

    if text.trim().is_empty() {
        return Err(OrchestrationError::Generation(
            "Empty response from Gemini".to_string(),
        ));
    }

    info!(chars = text.len(), "Gemini response received");

    Ok(text)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn inline(data: InlineData) -> Self {
        Self {
            text: None,
            inline_data: Some(data),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: i32,
    response_mime_type: String,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Content,
    finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = GeminiRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    Part::text("Compare these statements"),
                    Part::inline(InlineData {
                        mime_type: "application/pdf".to_string(),
                        data: "JVBERi0=".to_string(),
                    }),
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                max_output_tokens: 8192,
                response_mime_type: "application/json".to_string(),
            },
            system_instruction: SystemInstruction {
                parts: vec![Part::text("You are a financial analyst")],
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(json["contents"][0]["parts"][1]["inlineData"]["mimeType"], "application/pdf");
        assert!(json["contents"][0]["parts"][0].get("inlineData").is_none());
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GeminiResponse = serde_json::from_str(
            r#"{ "candidates": [ { "content": { "parts": [ { "text": "{\"a\":" }, { "text": "1}" } ] }, "finishReason": "STOP" } ] }"#,
        )
        .unwrap();

        assert_eq!(extract_text(response).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn test_truncated_response_is_generation_error() {
        let response: GeminiResponse = serde_json::from_str(
            r#"{ "candidates": [ { "content": { "parts": [ { "text": "{" } ] }, "finishReason": "MAX_TOKENS" } ] }"#,
        )
        .unwrap();

        assert!(matches!(
            extract_text(response),
            Err(OrchestrationError::Generation(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = GeminiClient::new(String::new(), "gemini-2.0-flash").unwrap();
        let result = client
            .generate(
                "system",
                vec![Part::text("hi")],
                SamplingConfig {
                    temperature: 0.1,
                    max_output_tokens: 16,
                },
            )
            .await;

        assert!(matches!(result, Err(OrchestrationError::Generation(_))));
    }

    #[tokio::test]
    async fn test_transport_error_does_not_expose_api_key() {
        let client = GeminiClient::new("secret-key-123".to_string(), "gemini-2.0-flash")
            .unwrap()
            .with_base_url("http://127.0.0.1:1/v1beta/models/gemini-2.0-flash:generateContent");

        let err = client
            .generate(
                "system",
                vec![Part::text("hi")],
                SamplingConfig {
                    temperature: 0.1,
                    max_output_tokens: 16,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestrationError::Generation(_)));
        assert!(!err.to_string().contains("secret-key-123"));
    }
}
