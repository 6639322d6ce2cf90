use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::{
    config::ServiceConfig,
    error::JobError,
    management::TokenManager,
    types::{TrackInfo, TrackResponse},
    utils,
};

use super::{MetadataResolver, auth};

/// Spotify Web API client used for track metadata.
pub struct SpotifyClient {
    http: Client,
    api_url: String,
    token_url: String,
    credentials: Option<(String, String)>,
    tokens: TokenManager,
}

impl SpotifyClient {
    pub fn new(http: Client, config: &ServiceConfig) -> Self {
        let credentials = match (&config.spotify_client_id, &config.spotify_client_secret) {
            (Some(id), Some(secret)) => Some((id.clone(), secret.clone())),
            _ => None,
        };

        SpotifyClient {
            http,
            api_url: config.spotify_api_url.trim_end_matches('/').to_string(),
            token_url: config.spotify_token_url.clone(),
            credentials,
            tokens: TokenManager::new(),
        }
    }

    async fn access_token(&self) -> Result<String, JobError> {
        let Some((client_id, client_secret)) = &self.credentials else {
            return Err(JobError::Unavailable(
                "SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET are not configured".to_string(),
            ));
        };

        if let Some(token) = self.tokens.get_valid_token().await {
            return Ok(token);
        }

        let token =
            auth::client_credentials_token(&self.http, &self.token_url, client_id, client_secret)
                .await
                .map_err(|e| {
                    JobError::Unavailable(format!(
                        "Spotify authentication failed ({e}), check SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET"
                    ))
                })?;

        let access_token = token.access_token.clone();
        self.tokens.store(token).await;
        Ok(access_token)
    }
}

#[async_trait]
impl MetadataResolver for SpotifyClient {
    async fn resolve(&self, track_ref: &str) -> Result<TrackInfo, JobError> {
        let track_id = utils::extract_track_id(track_ref).ok_or_else(|| {
            JobError::Unavailable(format!("no track id in reference {track_ref:?}"))
        })?;

        let token = self.access_token().await?;
        let api_url = format!("{}/tracks/{}", self.api_url, track_id);

        let res = self
            .http
            .get(&api_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| JobError::Unavailable(format!("metadata request failed: {e}")))?;

        let status = res.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.tokens.clear().await;
            }
            return Err(JobError::Unavailable(format!(
                "metadata request for track {track_id} returned {status}"
            )));
        }

        let track: TrackResponse = res
            .json()
            .await
            .map_err(|e| JobError::Unavailable(format!("malformed metadata response: {e}")))?;

        let title = track
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| JobError::Unavailable(format!("track {track_id} has no title")))?;

        let artist = track
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        tracing::debug!(track_id, %title, %artist, "resolved track metadata");
        Ok(TrackInfo { title, artist })
    }
}
