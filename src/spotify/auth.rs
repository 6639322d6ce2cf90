use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::types::AccessToken;

/// Requests an app-only access token with the client-credentials grant.
///
/// This token is only good for public catalogue reads such as track lookups,
/// which is all the download pipeline needs.
///
/// # Arguments
///
/// * `client` - Shared HTTP client (carries the per-call timeout)
/// * `token_url` - Spotify token endpoint
/// * `client_id` / `client_secret` - Application credentials
///
/// # Errors
///
/// Returns a description of the failure when the request cannot be sent, the
/// endpoint answers with a non-success status, or the body has no
/// `access_token`.
pub async fn client_credentials_token(
    client: &Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<AccessToken, String> {
    let res = client
        .post(token_url)
        .basic_auth(client_id, Some(client_secret))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if !res.status().is_success() {
        return Err(format!("token endpoint returned {}", res.status()));
    }

    let json: Value = res.json().await.map_err(|e| e.to_string())?;
    let access_token = json["access_token"]
        .as_str()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "token response has no access_token".to_string())?;

    Ok(AccessToken {
        access_token: access_token.to_string(),
        expires_in: json["expires_in"].as_u64().unwrap_or(3600),
        obtained_at: Utc::now().timestamp() as u64,
    })
}

/// Exchanges an authorization code for a user token using PKCE.
///
/// The provider's answer is handed back untouched, status included, so the
/// caller can relay it to the browser that started the flow.
///
/// # Arguments
///
/// * `code` - Authorization code received on the frontend's redirect
/// * `redirect_uri` - The redirect URI used when requesting the code
/// * `verifier` - PKCE code verifier generated by the frontend
pub async fn exchange_code_pkce(
    client: &Client,
    token_url: &str,
    client_id: &str,
    code: &str,
    redirect_uri: &str,
    verifier: &str,
) -> Result<(StatusCode, String), reqwest::Error> {
    let res = client
        .post(token_url)
        .form(&[
            ("grant_type", "authorization_code"),
            ("client_id", client_id),
            ("code", code),
            ("code_verifier", verifier),
            ("redirect_uri", redirect_uri),
        ])
        .send()
        .await?;

    let status = res.status();
    Ok((status, res.text().await?))
}

/// Refreshes an expired user access token.
///
/// Like [`exchange_code_pkce`], the raw provider response is returned.
pub async fn refresh_token(
    client: &Client,
    token_url: &str,
    client_id: &str,
    refresh_token: &str,
) -> Result<(StatusCode, String), reqwest::Error> {
    let res = client
        .post(token_url)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
        ])
        .send()
        .await?;

    let status = res.status();
    Ok((status, res.text().await?))
}
