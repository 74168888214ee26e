//! Direct Gemini REST client with server-side schema enforcement.
//!
//! Used whenever a credential is known (the caller's key or the server
//! default). The request sets `responseMimeType: application/json` and a
//! `responseSchema`, so the model is constrained to the report shape before
//! the reply ever reaches local validation.

use crate::error::GraderError;
use crate::pipeline::llm::{GradingModel, GradingRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// A Gemini model bound to one credential.
pub struct GeminiModel {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiModel {
    pub fn new(
        http: reqwest::Client,
        api_base_url: &str,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let model = model.into();
        let endpoint = generate_content_url(api_base_url, &model);
        Self {
            http,
            endpoint,
            model,
            api_key: api_key.into(),
        }
    }
}

/// `{base}/models/{model}:generateContent`, accepting `models/…` ids too.
fn generate_content_url(api_base_url: &str, model: &str) -> String {
    let model = model.strip_prefix("models/").unwrap_or(model);
    format!(
        "{}/models/{}:generateContent",
        api_base_url.trim_end_matches('/'),
        model
    )
}

#[async_trait]
impl GradingModel for GeminiModel {
    fn model_id(&self) -> &str {
        self.model.strip_prefix("models/").unwrap_or(&self.model)
    }

    async fn generate(&self, request: &GradingRequest) -> Result<String, GraderError> {
        let body = GenerateContentRequest::from_grading_request(request);
        debug!("POST {}", self.endpoint);

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GraderError::ProviderError {
                model: self.model_id().to_string(),
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GraderError::ProviderError {
                model: self.model_id().to_string(),
                status: Some(status.as_u16()),
                message: e.to_string(),
            })?;

        if !status.is_success() {
            return Err(classify_failure(self.model_id(), status.as_u16(), &text));
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&text).map_err(|e| GraderError::ProviderError {
                model: self.model_id().to_string(),
                status: Some(status.as_u16()),
                message: format!("unreadable response body: {e}"),
            })?;

        parsed.into_text().ok_or_else(|| {
            warn!("Gemini returned no candidate text");
            GraderError::EmptyResponse {
                model: self.model_id().to_string(),
            }
        })
    }
}

/// Map a non-2xx response to the matching error variant.
fn classify_failure(model: &str, status: u16, body: &str) -> GraderError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string());

    let bad_key = status == 400 && message.to_ascii_lowercase().contains("api key");
    if status == 401 || status == 403 || bad_key {
        return GraderError::AuthError {
            provider: "gemini".into(),
            detail: message,
        };
    }
    GraderError::ProviderError {
        model: model.to_string(),
        status: Some(status),
        message,
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    fn from_grading_request(request: &GradingRequest) -> Self {
        Self {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: request.system.clone(),
                }],
            },
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![Part {
                    text: request.prompt.clone(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".into(),
                response_schema: request.schema.clone(),
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
    temperature: f32,
    max_output_tokens: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, if it has any.
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> GradingRequest {
        GradingRequest {
            system: "be a marker".into(),
            prompt: "Essay:\nhello".into(),
            schema: json!({ "type": "OBJECT" }),
            temperature: 0.2,
            max_output_tokens: 4096,
        }
    }

    #[test]
    fn endpoint_accepts_prefixed_model_ids() {
        assert_eq!(
            generate_content_url("https://g.test/v1beta/", "models/gemini-1.5-flash"),
            "https://g.test/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert_eq!(
            generate_content_url("https://g.test/v1beta", "gemini-1.5-flash"),
            "https://g.test/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn request_body_shape() {
        let body = serde_json::to_value(GenerateContentRequest::from_grading_request(&request())).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be a marker");
        assert!(body["systemInstruction"].get("role").is_none());
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Essay:\nhello");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "OBJECT");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
    }

    #[test]
    fn response_text_from_first_candidate() {
        let raw = json!({
            "candidates": [
                { "content": { "role": "model", "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] },
                  "finishReason": "STOP" }
            ],
            "modelVersion": "gemini-1.5-flash-002"
        });
        let parsed: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.into_text().as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn blocked_prompt_has_no_text() {
        let raw = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let parsed: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        assert!(parsed.into_text().is_none());
    }

    #[test]
    fn invalid_key_is_auth_error() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        match classify_failure("gemini-1.5-flash", 400, body) {
            GraderError::AuthError { detail, .. } => assert!(detail.contains("API key not valid")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn server_error_keeps_status() {
        match classify_failure("gemini-1.5-flash", 503, "upstream overloaded") {
            GraderError::ProviderError { status, message, .. } => {
                assert_eq!(status, Some(503));
                assert_eq!(message, "upstream overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn model_id_drops_prefix() {
        let m = GeminiModel::new(reqwest::Client::new(), "https://g.test", "models/gemini-1.5-flash", "k");
        assert_eq!(m.model_id(), "gemini-1.5-flash");
    }
}
