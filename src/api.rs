//! HTTP surface for the pipeline.
//!
//! Two entry points drive the same orchestrator core:
//!
//! - `POST /process` – synchronous: document bytes in (raw, or base64 inside
//!   a JSON wrapper), `{extracted_text, summary}` out in the same response.
//! - `POST /upload` + `PUT /upload/{job_id}` + `GET /result/{job_id}` –
//!   asynchronous: create a job, deposit the bytes out of band, poll until
//!   the job reaches a terminal state.
//!
//! Input errors map to 400 before any durable state exists; backend faults
//! map to 500 on the synchronous path and to a `failed` job on the
//! asynchronous one.

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use base64::{Engine as _, prelude::BASE64_STANDARD};

use crate::{
    jobs::{Job, JobFailure, JobId, JobStatus},
    pipeline::{Pipeline, PipelineError},
    prelude::*,
};

/// Shared state for all handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Build the router exposing both entry points.
pub fn create_router(pipeline: Arc<Pipeline>) -> Router {
    // Base64 JSON bodies are ~4/3 the size of the raw document, so the raw
    // body limit sits above the document limit; actual document size is
    // enforced after decoding.
    let body_limit = pipeline.opts().max_document_bytes * 2;
    Router::new()
        .route("/process", post(process_document))
        .route("/upload", post(begin_upload))
        .route("/upload/:job_id", put(put_upload))
        .route("/result/:job_id", get(get_result))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(AppState { pipeline })
}

/// Request body for `POST /process` when submitted as JSON.
#[derive(Deserialize)]
struct ProcessRequest {
    /// Base64-encoded document bytes.
    file_data: String,
}

/// Success response for `POST /process`.
#[derive(Serialize)]
struct ProcessResponse {
    /// Extracted lines joined with newlines.
    extracted_text: String,
    /// At most three summary lines.
    summary: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    extracted_fields: Option<BTreeMap<String, String>>,
}

/// Process a document inline and return the result in the same response.
async fn process_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ProcessResponse>, ApiError> {
    let bytes = decode_document_body(&headers, &body)?;
    state.pipeline.check_document_bytes(&bytes)?;
    let outcome = state.pipeline.process_document(&bytes).await?;
    Ok(Json(ProcessResponse {
        extracted_text: outcome.full_text(),
        summary: outcome.summary,
        extracted_fields: outcome.fields,
    }))
}

/// Accept either raw document bytes or a JSON wrapper with base64 data.
fn decode_document_body(headers: &HeaderMap, body: &Bytes) -> Result<Vec<u8>, ApiError> {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    if !is_json {
        return Ok(body.to_vec());
    }
    let request: ProcessRequest = serde_json::from_slice(body).map_err(|_| {
        invalid_input("expected a JSON body with a base64 `file_data` field")
    })?;
    BASE64_STANDARD
        .decode(request.file_data.as_bytes())
        .map_err(|_| invalid_input("`file_data` is not valid base64"))
}

/// Request body for `POST /upload`.
#[derive(Deserialize)]
struct UploadRequest {
    /// Declared MIME type of the document.
    content_type: String,
    /// Declared size of the document, in bytes.
    size_bytes: usize,
}

/// Response body for `POST /upload`.
#[derive(Serialize)]
struct UploadResponse {
    job_id: JobId,
    /// Where to `PUT` the document bytes.
    upload_url: String,
    /// Where to poll for the outcome.
    result_url: String,
}

/// Create a job record and hand back upload and polling handles.
///
/// Declarations that fail validation are rejected before any record exists,
/// so there is never a partial job to clean up.
async fn begin_upload(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, ApiError> {
    state
        .pipeline
        .check_intake(request.size_bytes, &request.content_type)?;

    let id = JobId::new();
    let job = Job::new(id.clone(), format!("uploads/{id}"), &request.content_type);
    state
        .pipeline
        .store()
        .create(&job)
        .await
        .map_err(ApiError::Internal)?;
    info!(job_id = %job.id, content_type = %job.content_type, "created job");

    Ok(Json(UploadResponse {
        upload_url: format!("/upload/{}", job.id),
        result_url: format!("/result/{}", job.id),
        job_id: job.id,
    }))
}

/// Response body for `PUT /upload/{job_id}`.
#[derive(Serialize)]
struct UploadAccepted {
    job_id: JobId,
    status: &'static str,
}

/// Receive the document bytes for a pending job, then fire processing.
async fn put_upload(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadAccepted>), ApiError> {
    let job_id = JobId::from(job_id.as_str());
    let job = state
        .pipeline
        .store()
        .get(&job_id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound)?;
    if job.status != JobStatus::Pending {
        return Err(ApiError::Conflict(
            "job already received its document".to_owned(),
        ));
    }

    let bytes = body.to_vec();
    state.pipeline.check_document_bytes(&bytes)?;
    state
        .pipeline
        .blobs()
        .put(&job.source_ref, bytes)
        .await
        .map_err(ApiError::Internal)?;

    // The bytes are deposited; fire the async trigger. Any fault from here
    // on lands in the job record, which is what the poller sees.
    let pipeline = state.pipeline.clone();
    let trigger_id = job_id.clone();
    tokio::spawn(async move {
        if let Err(err) = pipeline.run_job(&trigger_id).await {
            error!(job_id = %trigger_id, "processing trigger failed: {err:?}");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadAccepted {
            job_id,
            status: "processing",
        }),
    ))
}

/// Client-facing view of a job: status, plus results or error only once the
/// job is terminal.
#[derive(Serialize)]
struct JobView {
    job_id: JobId,
    /// `processing` | `complete` | `failed`.
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    extracted_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    extracted_fields: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JobFailure>,
}

impl JobView {
    /// Reduce a job record to what pollers get to see.
    fn from_job(job: Job) -> Self {
        let mut view = Self {
            job_id: job.id,
            // A job that hasn't been claimed yet is still "processing" as
            // far as the client is concerned.
            status: match job.status {
                JobStatus::Pending | JobStatus::Processing => "processing",
                JobStatus::Complete => "complete",
                JobStatus::Failed => "failed",
            },
            extracted_text: None,
            extracted_fields: None,
            summary: None,
            error: None,
        };
        match job.status {
            JobStatus::Complete => {
                view.extracted_text = job.extracted_text.map(|lines| lines.join("\n"));
                view.extracted_fields = job.extracted_fields;
                view.summary = job.summary;
            }
            JobStatus::Failed => {
                view.error = job.error;
            }
            JobStatus::Pending | JobStatus::Processing => {}
        }
        view
    }
}

/// Poll a job. A pure read: querying never triggers processing.
async fn get_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    let job_id = JobId::from(job_id.as_str());
    let job = state
        .pipeline
        .store()
        .get(&job_id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(JobView::from_job(job)))
}

/// Error body shared by every failure response.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Error wrapper mapping pipeline errors onto HTTP responses.
#[derive(Debug)]
enum ApiError {
    NotFound,
    Conflict(String),
    Pipeline(PipelineError),
    Internal(anyhow::Error),
}

impl From<PipelineError> for ApiError {
    fn from(inner: PipelineError) -> Self {
        Self::Pipeline(inner)
    }
}

/// Build an invalid-input rejection.
fn invalid_input(message: &str) -> ApiError {
    ApiError::Pipeline(PipelineError::InvalidInput(message.to_owned()))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "job not found".to_owned()),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::Pipeline(PipelineError::InvalidInput(message)) => {
                (StatusCode::BAD_REQUEST, message)
            }
            ApiError::Pipeline(PipelineError::NoTextFound) => {
                (StatusCode::BAD_REQUEST, "OCR found no text".to_owned())
            }
            ApiError::Pipeline(err @ PipelineError::Fault { .. }) => {
                error!("request failed: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::Internal(err) => {
                error!("request failed: {err:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobFailure, JobResults, Stage};

    fn pending_job() -> Job {
        let id = JobId::new();
        Job::new(id.clone(), format!("uploads/{id}"), "application/pdf")
    }

    #[test]
    fn view_hides_results_until_terminal() {
        let view = JobView::from_job(pending_job());
        assert_eq!(view.status, "processing");
        assert!(view.extracted_text.is_none());
        assert!(view.summary.is_none());
        assert!(view.error.is_none());

        let view = JobView::from_job(pending_job().processing());
        assert_eq!(view.status, "processing");
    }

    #[test]
    fn view_of_a_complete_job_joins_text_and_keeps_summary() {
        let job = pending_job().processing().completed(JobResults {
            extracted_text: vec!["one".to_owned(), "two".to_owned()],
            extracted_fields: None,
            summary: vec!["short".to_owned()],
        });
        let view = JobView::from_job(job);
        assert_eq!(view.status, "complete");
        assert_eq!(view.extracted_text.as_deref(), Some("one\ntwo"));
        assert_eq!(view.summary.unwrap(), vec!["short"]);
        assert!(view.error.is_none());
    }

    #[test]
    fn view_of_a_failed_job_carries_only_the_error() {
        let job = pending_job()
            .processing()
            .failed(JobFailure::new(Stage::Summarization, "Bedrock unreachable"));
        let view = JobView::from_job(job);
        assert_eq!(view.status, "failed");
        assert!(view.extracted_text.is_none());
        let error = view.error.unwrap();
        assert_eq!(error.stage, Stage::Summarization);
    }

    #[test]
    fn raw_bodies_pass_through_untouched() {
        let headers = HeaderMap::new();
        let body = Bytes::from_static(b"%PDF-1.7");
        let bytes = decode_document_body(&headers, &body).unwrap();
        assert_eq!(bytes, b"%PDF-1.7");
    }

    #[test]
    fn json_bodies_are_base64_decoded() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "application/json".parse().unwrap());
        let encoded = BASE64_STANDARD.encode(b"%PDF-1.7");
        let body = Bytes::from(format!("{{\"file_data\":\"{encoded}\"}}"));
        let bytes = decode_document_body(&headers, &body).unwrap();
        assert_eq!(bytes, b"%PDF-1.7");
    }

    #[test]
    fn bad_json_and_bad_base64_are_invalid_input() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "application/json".parse().unwrap());

        let body = Bytes::from_static(b"{\"wrong_field\": 1}");
        assert!(matches!(
            decode_document_body(&headers, &body),
            Err(ApiError::Pipeline(PipelineError::InvalidInput(_)))
        ));

        let body = Bytes::from_static(b"{\"file_data\": \"not base64!!\"}");
        assert!(matches!(
            decode_document_body(&headers, &body),
            Err(ApiError::Pipeline(PipelineError::InvalidInput(_)))
        ));
    }

    #[test]
    fn record_keeping_fields_are_not_exposed_on_views() {
        let rendered = serde_json::to_value(JobView::from_job(pending_job())).unwrap();
        assert!(rendered.get("created_at").is_none());
        assert!(rendered.get("source_ref").is_none());
        assert!(rendered.get("content_type").is_none());
    }
}
