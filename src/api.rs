//! HTTP surface for Rusty RAG.
//!
//! - `POST /api/uploadFile` – Multipart upload (file field `document`). Extracts, chunks, and
//!   embeds the file, then binds the resulting index to the caller's session.
//! - `POST /api/retrieve` – JSON `{ "question": string }`. Answers from the bound index.
//! - `GET /api/status` – Whether the session is `empty` or `ready`, plus index details.
//! - `GET /api/metrics` – Build and question counters.
//!
//! Requests may carry an `x-session-id` header to work against an isolated index; without it
//! every caller shares the `default` session. Errors are always `{ "error": string }` with status
//! 400 for client mistakes and 500 otherwise.

use crate::metrics::MetricsSnapshot;
use crate::processing::{
    Document, PipelineApi, PipelineError, PipelineStatus, RetrievedPassage, SessionKey,
};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State, multipart::MultipartRejection,
        rejection::JsonRejection,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Header selecting an isolated session.
pub const SESSION_HEADER: &str = "x-session-id";

const UPLOAD_FIELD: &str = "document";
const UPLOAD_SUCCESS_MESSAGE: &str = "File processed and index initialized.";

/// Build the HTTP router exposing the upload and retrieval API.
pub fn create_router<S>(service: Arc<S>, upload_max_bytes: usize) -> Router
where
    S: PipelineApi + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/uploadFile", post(upload_file::<S>))
        .route("/api/retrieve", post(retrieve::<S>))
        .route("/api/status", get(get_status::<S>))
        .route("/api/metrics", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(upload_max_bytes))
        .layer(cors)
        .with_state(service)
}

fn session_from(headers: &HeaderMap) -> SessionKey {
    SessionKey::new(
        headers
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok()),
    )
}

/// Success response for `POST /api/uploadFile`.
#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    document: String,
    passages: usize,
    generation: u64,
}

/// Index an uploaded document for the caller's session.
async fn upload_file<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError>
where
    S: PipelineApi,
{
    let session = session_from(&headers);
    let Ok(mut multipart) = multipart else {
        return Err(PipelineError::NoFileProvided.into());
    };
    let document = read_document(&mut multipart)
        .await?
        .ok_or(PipelineError::NoFileProvided)?;

    let outcome = service.build(&session, document).await?;
    Ok(Json(UploadResponse {
        message: UPLOAD_SUCCESS_MESSAGE,
        document: outcome.document,
        passages: outcome.passages,
        generation: outcome.generation,
    }))
}

/// Pull the uploaded file out of the form.
///
/// The `document` field is preferred; any other field carrying a file name is accepted so that
/// clients using a different field name still work.
async fn read_document(multipart: &mut Multipart) -> Result<Option<Document>, PipelineError> {
    let mut fallback = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| PipelineError::Processing(format!("failed to read upload: {error}")))?
    {
        let is_document_field = field.name() == Some(UPLOAD_FIELD);
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|error| PipelineError::Processing(format!("failed to read upload: {error}")))?;
        let document = Document {
            name: file_name,
            content_type,
            bytes: bytes.to_vec(),
        };
        if is_document_field {
            return Ok(Some(document));
        }
        fallback.get_or_insert(document);
    }
    Ok(fallback)
}

/// Request body for `POST /api/retrieve`.
#[derive(Deserialize)]
struct RetrieveRequest {
    #[serde(default)]
    question: String,
}

/// Success response for `POST /api/retrieve`.
#[derive(Serialize)]
struct RetrieveResponse {
    answer: String,
    sources: Vec<RetrievedPassage>,
    generation: u64,
}

/// Answer a question from the session's index.
///
/// A malformed body is treated as an empty question, so an unbound session still reports
/// `NotReady` first.
async fn retrieve<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
    payload: Result<Json<RetrieveRequest>, JsonRejection>,
) -> Result<Json<RetrieveResponse>, AppError>
where
    S: PipelineApi,
{
    let session = session_from(&headers);
    let question = payload
        .map(|Json(request)| request.question)
        .unwrap_or_default();
    let answer = service.ask(&session, &question).await?;
    Ok(Json(RetrieveResponse {
        answer: answer.answer,
        sources: answer.sources,
        generation: answer.generation,
    }))
}

async fn get_status<S>(State(service): State<Arc<S>>, headers: HeaderMap) -> Json<PipelineStatus>
where
    S: PipelineApi,
{
    Json(service.status(&session_from(&headers)))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: PipelineApi,
{
    Json(service.metrics_snapshot())
}

struct AppError(PipelineError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            tracing::error!(error = %self.0, "Request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        Self(inner)
    }
}
