//! Model interaction: build the grading request and validate the reply.
//!
//! Grading quality is outsourced entirely, so this module only defines the
//! seam and drives one call across it:
//!
//! * [`GradingModel`] — a model that turns a [`GradingRequest`] into raw JSON
//!   text. Implemented by [`crate::pipeline::gemini::GeminiModel`] (direct
//!   REST, schema enforced server-side) and [`ProviderModel`] (any
//!   `edgequake-llm` provider, schema spelled out in the prompt).
//! * [`ModelResolver`] — picks a model for the effective credential.
//! * [`run_grading`] — one call, no retries, followed by local schema and
//!   range validation. A reply that fails validation fails the request.

use crate::config::GraderConfig;
use crate::error::GraderError;
use crate::pipeline::gemini::GeminiModel;
use crate::pipeline::normalise::strip_json_fences;
use crate::prompts::{system_with_inline_schema, user_prompt, SYSTEM_INSTRUCTIONS};
use crate::report::{response_schema, GradeReport};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// Everything a model needs to grade one essay.
#[derive(Debug, Clone)]
pub struct GradingRequest {
    /// Persona, rubric and output contract.
    pub system: String,
    /// User turn embedding the essay verbatim.
    pub prompt: String,
    /// Output schema the reply must satisfy.
    pub schema: Value,
    pub temperature: f32,
    pub max_output_tokens: usize,
}

impl GradingRequest {
    /// The standard request for `essay`.
    pub fn for_essay(essay: &str, config: &GraderConfig) -> Self {
        Self {
            system: SYSTEM_INSTRUCTIONS.to_string(),
            prompt: user_prompt(essay),
            schema: response_schema(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

/// A generative model that can be asked for a grading report.
#[async_trait]
pub trait GradingModel: Send + Sync {
    /// Identifier reported back to the caller in `meta.model`.
    fn model_id(&self) -> &str;

    /// Issue one call and return the raw reply text.
    async fn generate(&self, request: &GradingRequest) -> Result<String, GraderError>;
}

/// Chooses the model that serves a request.
pub trait ModelResolver: Send + Sync {
    /// `credential` is the effective key (caller's, else the server default).
    fn resolve(&self, credential: Option<&str>) -> Result<Arc<dyn GradingModel>, GraderError>;
}

/// Gemini REST when a credential is known, else the configured
/// `edgequake-llm` provider using its own environment.
pub struct DefaultModelResolver {
    config: GraderConfig,
    http: reqwest::Client,
}

impl DefaultModelResolver {
    pub fn new(config: GraderConfig) -> Result<Self, GraderError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| GraderError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { config, http })
    }
}

impl ModelResolver for DefaultModelResolver {
    fn resolve(&self, credential: Option<&str>) -> Result<Arc<dyn GradingModel>, GraderError> {
        match credential {
            Some(key) => Ok(Arc::new(GeminiModel::new(
                self.http.clone(),
                &self.config.api_base_url,
                self.config.model.clone(),
                key,
            ))),
            None => {
                let model =
                    ProviderModel::from_factory(&self.config.fallback_provider, &self.config.model)?;
                Ok(Arc::new(model))
            }
        }
    }
}

/// Any `edgequake-llm` provider. The schema travels in the system prompt.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    model: String,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Build a named provider; it reads its key from the environment.
    pub fn from_factory(provider_name: &str, model: &str) -> Result<Self, GraderError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            GraderError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!(
                    "No API key was supplied with the request and none is configured on the server.\n\
                    Paste a key, set GOOGLE_GENERATIVE_AI_API_KEY, or configure the provider's own key.\n\
                    Error: {e}"
                ),
            }
        })?;
        Ok(Self::new(provider, model))
    }
}

#[async_trait]
impl GradingModel for ProviderModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GradingRequest) -> Result<String, GraderError> {
        let messages = vec![
            ChatMessage::system(system_with_inline_schema(&request.schema)),
            ChatMessage::user(request.prompt.clone()),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_output_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| GraderError::ProviderError {
                model: self.model.clone(),
                status: None,
                message: format!("{}", e),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.model, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Grade one essay with `model`: a single call, then validation.
///
/// `timeout_secs` bounds the call when set; there is no retry.
pub async fn run_grading(
    model: &dyn GradingModel,
    request: &GradingRequest,
    timeout_secs: Option<u64>,
) -> Result<GradeReport, GraderError> {
    let start = Instant::now();
    info!("Requesting grade from {}", model.model_id());

    let raw = match timeout_secs {
        Some(secs) => timeout(Duration::from_secs(secs), model.generate(request))
            .await
            .map_err(|_| GraderError::ProviderError {
                model: model.model_id().to_string(),
                status: None,
                message: format!("timed out after {secs}s"),
            })??,
        None => model.generate(request).await?,
    };

    let json = strip_json_fences(&raw);
    if json.is_empty() {
        return Err(GraderError::EmptyResponse {
            model: model.model_id().to_string(),
        });
    }

    let report = GradeReport::from_json(json).map_err(|e| {
        warn!("{} reply rejected: {}", model.model_id(), e);
        e
    })?;

    debug!(
        "{} graded in {}ms: score {}",
        model.model_id(),
        start.elapsed().as_millis(),
        report.score
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample_json;

    struct CannedModel(String);

    #[async_trait]
    impl GradingModel for CannedModel {
        fn model_id(&self) -> &str {
            "canned"
        }

        async fn generate(&self, _request: &GradingRequest) -> Result<String, GraderError> {
            Ok(self.0.clone())
        }
    }

    struct SlowModel;

    #[async_trait]
    impl GradingModel for SlowModel {
        fn model_id(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _request: &GradingRequest) -> Result<String, GraderError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(String::new())
        }
    }

    #[test]
    fn request_for_essay_uses_config() {
        let config = GraderConfig::builder()
            .temperature(0.7)
            .max_output_tokens(1000)
            .build()
            .unwrap();
        let req = GradingRequest::for_essay("My essay", &config);
        assert_eq!(req.temperature, 0.7);
        assert_eq!(req.max_output_tokens, 1000);
        assert!(req.prompt.ends_with("My essay"));
        assert_eq!(req.system, SYSTEM_INSTRUCTIONS);
    }

    #[tokio::test]
    async fn accepts_fenced_valid_reply() {
        let model = CannedModel(format!("```json\n{}\n```", sample_json()));
        let req = GradingRequest::for_essay("x", &GraderConfig::default());
        let report = run_grading(&model, &req, None).await.unwrap();
        assert_eq!(report.level, "5");
    }

    #[tokio::test]
    async fn rejects_out_of_range_reply() {
        let mut v = sample_json();
        v["rubric"]["language"] = serde_json::json!(11);
        let model = CannedModel(v.to_string());
        let req = GradingRequest::for_essay("x", &GraderConfig::default());
        let err = run_grading(&model, &req, None).await.unwrap_err();
        assert!(matches!(err, GraderError::SchemaViolation { .. }));
    }

    #[tokio::test]
    async fn blank_reply_is_empty_response() {
        let model = CannedModel("  \n".into());
        let req = GradingRequest::for_essay("x", &GraderConfig::default());
        let err = run_grading(&model, &req, None).await.unwrap_err();
        assert!(matches!(err, GraderError::EmptyResponse { .. }));
    }

    #[tokio::test]
    async fn timeout_is_enforced_when_configured() {
        let req = GradingRequest::for_essay("x", &GraderConfig::default());
        let err = run_grading(&SlowModel, &req, Some(1)).await.unwrap_err();
        assert!(err.to_string().contains("timed out"), "got: {err}");
    }

    #[test]
    fn resolver_uses_gemini_when_credential_known() {
        let resolver = DefaultModelResolver::new(GraderConfig::default()).unwrap();
        let model = resolver.resolve(Some("key")).unwrap();
        assert_eq!(model.model_id(), "gemini-1.5-flash");
    }
}
