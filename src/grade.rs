//! Grading orchestration: submission in, validated report out.
//!
//! [`Grader`] owns the read-only pieces a request needs (config, extractors,
//! model resolver) and is shared behind an `Arc` by every concurrent request.
//! A request runs strictly in order: resolve the essay, pick the credential,
//! make one model call, validate, attach metadata. Any failure ends the
//! request; there is no partial report.

use crate::config::GraderConfig;
use crate::error::GraderError;
use crate::pipeline::extract::Extractors;
use crate::pipeline::input::{resolve_essay, ResolvedEssay, Submission};
use crate::pipeline::llm::{run_grading, DefaultModelResolver, GradingRequest, ModelResolver};
use crate::report::{GradedEssay, ReportMeta};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Where the effective credential came from. Logged, never the key itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CredentialSource {
    Request,
    Server,
    None,
}

impl CredentialSource {
    fn as_str(self) -> &'static str {
        match self {
            CredentialSource::Request => "request",
            CredentialSource::Server => "server",
            CredentialSource::None => "none",
        }
    }
}

/// Grades submissions. Cheap to share; holds no per-request state.
pub struct Grader {
    config: GraderConfig,
    extractors: Extractors,
    models: Arc<dyn ModelResolver>,
}

impl Grader {
    /// A grader with pdfium/DOCX extraction and the default model resolver.
    pub fn new(config: GraderConfig) -> Result<Self, GraderError> {
        let extractors = Extractors::new(config.pdfium_library_path.clone());
        let models = Arc::new(DefaultModelResolver::new(config.clone())?);
        Ok(Self {
            config,
            extractors,
            models,
        })
    }

    pub fn with_extractors(mut self, extractors: Extractors) -> Self {
        self.extractors = extractors;
        self
    }

    pub fn with_model_resolver(mut self, models: Arc<dyn ModelResolver>) -> Self {
        self.models = models;
        self
    }

    pub fn config(&self) -> &GraderConfig {
        &self.config
    }

    /// Resolve the essay text only, without calling a model.
    pub async fn resolve(&self, submission: &Submission) -> Result<ResolvedEssay, GraderError> {
        resolve_essay(submission, &self.extractors, self.config.max_upload_bytes).await
    }

    /// Grade one submission.
    pub async fn grade(&self, submission: &Submission) -> Result<GradedEssay, GraderError> {
        let start = Instant::now();
        let essay = self.resolve(submission).await?;

        let (credential, source) = match submission.credential() {
            Some(key) => (Some(key), CredentialSource::Request),
            None => match self.config.default_api_key.as_deref() {
                Some(key) => (Some(key), CredentialSource::Server),
                None => (None, CredentialSource::None),
            },
        };
        info!(
            "Grading {} ({} chars), credential: {}",
            essay.source,
            essay.text.len(),
            source.as_str()
        );

        let model = self.models.resolve(credential)?;
        let request = GradingRequest::for_essay(&essay.text, &self.config);
        let report = run_grading(model.as_ref(), &request, self.config.api_timeout_secs).await?;

        info!(
            "Graded with {} in {}ms: {} ({})",
            model.model_id(),
            start.elapsed().as_millis(),
            report.grade,
            report.score
        );

        Ok(GradedEssay {
            report,
            meta: ReportMeta {
                // Empty extractions never reach the model, so a successful
                // report has nothing to warn about.
                extraction_warning: None,
                model: model.model_id().to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::GradingModel;
    use crate::report::tests::sample_json;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedModel {
        reply: String,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl GradingModel for CannedModel {
        fn model_id(&self) -> &str {
            "test-model"
        }

        async fn generate(&self, request: &GradingRequest) -> Result<String, GraderError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            Ok(self.reply.clone())
        }
    }

    /// Records the credential it was asked for.
    struct RecordingResolver {
        reply: String,
        credentials: Mutex<Vec<Option<String>>>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingResolver {
        fn new(reply: String) -> Arc<Self> {
            Arc::new(Self {
                reply,
                credentials: Mutex::new(Vec::new()),
                prompts: Arc::new(Mutex::new(Vec::new())),
            })
        }
    }

    impl ModelResolver for RecordingResolver {
        fn resolve(&self, credential: Option<&str>) -> Result<Arc<dyn GradingModel>, GraderError> {
            self.credentials
                .lock()
                .unwrap()
                .push(credential.map(str::to_string));
            Ok(Arc::new(CannedModel {
                reply: self.reply.clone(),
                prompts: Arc::clone(&self.prompts),
            }))
        }
    }

    fn grader(config: GraderConfig, resolver: Arc<RecordingResolver>) -> Grader {
        Grader::new(config).unwrap().with_model_resolver(resolver)
    }

    #[tokio::test]
    async fn pasted_text_is_graded_with_meta() {
        let resolver = RecordingResolver::new(sample_json().to_string());
        let g = grader(GraderConfig::default(), resolver.clone());
        let graded = g
            .grade(&Submission::from_text("  My essay about rivers.  "))
            .await
            .unwrap();
        assert_eq!(graded.meta.model, "test-model");
        assert!(graded.meta.extraction_warning.is_none());
        assert_eq!(graded.report.grade, "Strong");
        let prompts = resolver.prompts.lock().unwrap();
        assert!(prompts[0].ends_with("My essay about rivers."));
    }

    #[tokio::test]
    async fn request_key_beats_server_key() {
        let resolver = RecordingResolver::new(sample_json().to_string());
        let config = GraderConfig::builder().default_api_key("server-key").build().unwrap();
        let g = grader(config, resolver.clone());
        g.grade(&Submission::from_text("essay").with_api_key(" caller-key "))
            .await
            .unwrap();
        assert_eq!(
            resolver.credentials.lock().unwrap()[0].as_deref(),
            Some("caller-key")
        );
    }

    #[tokio::test]
    async fn blank_request_key_falls_back_to_server_key() {
        let resolver = RecordingResolver::new(sample_json().to_string());
        let config = GraderConfig::builder().default_api_key("server-key").build().unwrap();
        let g = grader(config, resolver.clone());
        g.grade(&Submission::from_text("essay").with_api_key("   "))
            .await
            .unwrap();
        assert_eq!(
            resolver.credentials.lock().unwrap()[0].as_deref(),
            Some("server-key")
        );
    }

    #[tokio::test]
    async fn no_key_anywhere_resolves_without_credential() {
        let resolver = RecordingResolver::new(sample_json().to_string());
        let g = grader(GraderConfig::default(), resolver.clone());
        g.grade(&Submission::from_text("essay")).await.unwrap();
        assert_eq!(resolver.credentials.lock().unwrap()[0], None);
    }

    #[tokio::test]
    async fn empty_submission_never_reaches_model() {
        let resolver = RecordingResolver::new(sample_json().to_string());
        let g = grader(GraderConfig::default(), resolver.clone());
        let err = g.grade(&Submission::default()).await.unwrap_err();
        assert!(matches!(err, GraderError::NoEssayText { warning: None }));
        assert!(resolver.credentials.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_model_output_fails_request() {
        let mut v = sample_json();
        v["rubric"]["mechanics"] = serde_json::json!(12);
        let resolver = RecordingResolver::new(v.to_string());
        let g = grader(GraderConfig::default(), resolver);
        let err = g.grade(&Submission::from_text("essay")).await.unwrap_err();
        assert!(matches!(err, GraderError::SchemaViolation { .. }));
        assert!(!err.is_client_error());
    }
}
