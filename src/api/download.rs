use std::io::ErrorKind;

use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderValue, header},
    response::Response,
};
use tokio_util::io::ReaderStream;

use crate::{
    error::{ApiError, ApiResult},
    server::AppState,
    types::{JobStatus, JobView, StartDownloadRequest, StartDownloadResponse},
};

/// `POST /download/start`
///
/// A missing, empty or unparseable body is treated like `{}` and rejected
/// with `400` rather than the framework's extractor error.
pub async fn start_download(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<StartDownloadResponse>> {
    let request: StartDownloadRequest = serde_json::from_slice(&body).unwrap_or_default();
    let track_ref = request.track_ref.trim();
    if track_ref.is_empty() {
        return Err(ApiError::BadRequest("Missing trackRef".to_string()));
    }

    let job_id = state
        .orchestrator
        .submit(track_ref)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(StartDownloadResponse { job_id }))
}

/// `GET /download/status/{job_id}`
pub async fn download_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobView>> {
    state
        .orchestrator
        .registry()
        .view(&job_id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// `GET /download/file/{job_id}`
pub async fn download_file(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let job = state
        .orchestrator
        .registry()
        .get(&job_id)
        .await
        .ok_or(ApiError::NotFound)?;

    let output = match (job.status(), job.output()) {
        (JobStatus::Done, Some(output)) => output.clone(),
        _ => return Err(ApiError::NotReady),
    };

    let file = tokio::fs::File::open(&output.path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => ApiError::NotFound,
        _ => ApiError::Internal(format!("cannot open staged file: {e}")),
    })?;
    let length = file
        .metadata()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .len();

    let disposition = HeaderValue::from_str(&content_disposition(&output.name))
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Response::builder()
        .header(header::CONTENT_TYPE, output.content_type)
        .header(header::CONTENT_LENGTH, length)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// `attachment` disposition with an ASCII fallback name plus the exact name
/// in RFC 5987 form, since artist and title are frequently non-ASCII.
pub fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(name)
    )
}
