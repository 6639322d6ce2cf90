use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::{
    error::{ApiError, ApiResult},
    server::AppState,
    spotify::auth,
    types::{RefreshRequest, TokenRequest},
};

/// `POST /token`
///
/// Completes the frontend's PKCE login. The code verifier never touches
/// Spotify from the browser's side of the exchange, and the provider's token
/// response is relayed as-is.
pub async fn token(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    let request: TokenRequest = serde_json::from_slice(&body).unwrap_or_default();

    let (Some(code), Some(redirect_uri), Some(verifier)) = (
        present(request.code),
        present(request.redirect_uri),
        present(request.code_verifier),
    ) else {
        return Err(ApiError::BadRequest(
            "Missing code, redirect_uri, or code_verifier".to_string(),
        ));
    };

    let client_id = state.config.spotify_client_id.clone().unwrap_or_default();
    let (status, text) = auth::exchange_code_pkce(
        &state.http,
        &state.config.spotify_token_url,
        &client_id,
        &code,
        &redirect_uri,
        &verifier,
    )
    .await
    .map_err(unreachable_upstream)?;

    relay(status, text)
}

/// `POST /refresh`
pub async fn refresh(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    let request: RefreshRequest = serde_json::from_slice(&body).unwrap_or_default();
    let Some(refresh_token) = present(request.refresh_token) else {
        return Err(ApiError::BadRequest("Missing refresh_token".to_string()));
    };

    let client_id = state.config.spotify_client_id.clone().unwrap_or_default();
    let (status, text) = auth::refresh_token(
        &state.http,
        &state.config.spotify_token_url,
        &client_id,
        &refresh_token,
    )
    .await
    .map_err(unreachable_upstream)?;

    relay(status, text)
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn unreachable_upstream(e: reqwest::Error) -> ApiError {
    ApiError::Upstream {
        status: StatusCode::BAD_GATEWAY,
        message: format!("token endpoint unreachable: {e}"),
    }
}

fn relay(status: StatusCode, text: String) -> ApiResult<Response> {
    if !status.is_success() {
        return Err(ApiError::Upstream {
            status,
            message: text,
        });
    }

    let json: Value = serde_json::from_str(&text).map_err(|e| ApiError::Upstream {
        status: StatusCode::BAD_GATEWAY,
        message: format!("malformed token response: {e}"),
    })?;
    Ok(Json(json).into_response())
}
