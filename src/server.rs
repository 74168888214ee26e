//! HTTP surface: the grading endpoint, the submission widget and a health probe.
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /` | the browser widget |
//! | `POST /api/grade` | `200` JSON report, `400` plain text for input errors, `500` plain text otherwise |
//! | `GET /healthz` | `200 ok` |
//!
//! The grade endpoint takes a multipart form with optional `text`, `file` and
//! `apiKey` fields. Unknown fields are drained and ignored.

use crate::error::GraderError;
use crate::grade::Grader;
use crate::pipeline::input::{Submission, Upload};
use crate::report::GradedEssay;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Response header repeating the extraction warning of a `400`.
pub const EXTRACTION_WARNING_HEADER: &str = "x-extraction-warning";

/// Headroom above the upload ceiling for the other form fields and boundaries.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Floor for the request body cap. Files over the upload ceiling but under
/// the body cap are discarded on receipt rather than failing the request.
const MIN_BODY_LIMIT_BYTES: usize = 32 * 1024 * 1024;

const INDEX_HTML: &str = include_str!("web/index.html");

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub grader: Arc<Grader>,
}

/// Build the application router.
pub fn router(grader: Arc<Grader>) -> Router {
    let max_upload = grader.config().max_upload_bytes;
    let body_limit = transport_limit(max_upload);
    Router::new()
        .route("/", get(index))
        .route("/api/grade", post(grade))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(AppState { grader })
}

/// Hard cap on a request body for a given upload ceiling.
fn transport_limit(max_upload_bytes: usize) -> usize {
    max_upload_bytes
        .saturating_mul(2)
        .saturating_add(FORM_OVERHEAD_BYTES)
        .max(MIN_BODY_LIMIT_BYTES)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, grader: Arc<Grader>) -> Result<(), GraderError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| GraderError::Internal(format!("Failed to bind {addr}: {e}")))?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, router(grader))
        .await
        .map_err(|e| GraderError::Internal(format!("Server error: {e}")))
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn grade(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<GradedEssay>, ApiError> {
    let multipart = multipart.map_err(|e| GraderError::InvalidSubmission {
        detail: e.body_text(),
        payload_too_large: e.status() == StatusCode::PAYLOAD_TOO_LARGE,
    })?;
    let max_upload = state.grader.config().max_upload_bytes;
    let submission = read_submission(multipart, max_upload).await?;
    let graded = state.grader.grade(&submission).await?;
    Ok(Json(graded))
}

/// Collect the form fields into a [`Submission`].
///
/// A `file` part without a filename or with no bytes counts as no upload,
/// which is what browsers send for an empty file input. File content past
/// `max_upload_bytes` is drained and dropped; only its size is kept, so the
/// ceiling is enforced later and only if the file is actually used.
async fn read_submission(
    mut multipart: Multipart,
    max_upload_bytes: usize,
) -> Result<Submission, GraderError> {
    let mut submission = Submission::default();

    while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "text" => submission.text = Some(field.text().await.map_err(invalid_form)?),
            "apiKey" => submission.api_key = Some(field.text().await.map_err(invalid_form)?),
            "file" => {
                let mut field = field;
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);

                let mut bytes = Vec::new();
                let mut size = 0usize;
                while let Some(chunk) = field.chunk().await.map_err(invalid_form)? {
                    size = size.saturating_add(chunk.len());
                    if size <= max_upload_bytes {
                        bytes.extend_from_slice(&chunk);
                    } else if !bytes.is_empty() {
                        bytes = Vec::new();
                    }
                }

                if file_name.is_empty() && size == 0 {
                    continue;
                }
                debug!("Received file '{}' ({} bytes)", file_name, size);
                submission.upload = Some(if size > max_upload_bytes {
                    Upload::discarded(file_name, content_type, size)
                } else {
                    Upload::new(file_name, content_type, bytes)
                });
            }
            other => {
                debug!("Ignoring form field '{}'", other);
                field.bytes().await.map_err(invalid_form)?;
            }
        }
    }

    Ok(submission)
}

fn invalid_form(e: MultipartError) -> GraderError {
    GraderError::InvalidSubmission {
        detail: e.body_text(),
        payload_too_large: e.status() == StatusCode::PAYLOAD_TOO_LARGE,
    }
}

/// A [`GraderError`] on its way out as a plain-text HTTP response.
pub struct ApiError(pub GraderError);

impl From<GraderError> for ApiError {
    fn from(err: GraderError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = match &err {
            GraderError::InvalidSubmission {
                payload_too_large: true,
                ..
            } => StatusCode::PAYLOAD_TOO_LARGE,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Grading failed: {}", err);
        } else {
            warn!("Rejected submission: {}", err);
        }

        let mut body = err.to_string();
        let warning = err.extraction_warning().map(str::to_string);
        if let Some(w) = &warning {
            body.push_str("\n\n");
            body.push_str(w);
        }

        let mut response = (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response();

        if let Some(value) = warning.and_then(|w| HeaderValue::from_str(&w).ok()) {
            response.headers_mut().insert(
                HeaderName::from_static(EXTRACTION_WARNING_HEADER),
                value,
            );
        }
        response
    }
}
