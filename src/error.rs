use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::types::JobStatus;

/// Terminal failures of a download job. The `Display` text is what a client
/// sees in the job's `error` field.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Could not look up track: {0}")]
    Unavailable(String),

    #[error("No audio source found: {0}")]
    SourceNotFound(String),

    #[error("Timed out after {} seconds", .0.as_secs())]
    TimedOut(Duration),

    #[error("No audio file produced. {0}")]
    NoOutputProduced(String),

    #[error("{0}")]
    ProcessFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected: {0}")]
    Unexpected(String),
}

/// A single provider strategy failing. Never fatal on its own; the locator
/// moves on to the next provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider}: request failed: {source}")]
    Http {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider}: timed out after {} seconds", .timeout.as_secs())]
    Timeout { provider: String, timeout: Duration },

    #[error("{provider}: no results for \"{query}\"")]
    Empty { provider: String, query: String },

    #[error("{provider}: malformed response: {detail}")]
    Malformed { provider: String, detail: String },

    #[error("{provider}: {detail}")]
    Process { provider: String, detail: String },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("job {0} already exists")]
    AlreadyExists(String),

    #[error("job {0} not found")]
    NotFound(String),

    #[error("job {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },
}

/// Errors surfaced directly by the synchronous HTTP endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("Not ready")]
    NotReady,

    #[error("{message}")]
    Upstream { status: StatusCode, message: String },

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound | ApiError::NotReady => StatusCode::NOT_FOUND,
            ApiError::Upstream { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
