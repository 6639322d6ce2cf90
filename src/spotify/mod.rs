//! # Spotify Integration Module
//!
//! Talks to the Spotify Web API for two things: resolving a track reference
//! into the title and artist used to search for audio, and proxying the OAuth
//! token calls the frontend needs without exposing the client secret.
//!
//! ## Layout
//!
//! ```text
//! Orchestrator / API handlers
//!          ↓
//!     ├── auth    (client credentials, PKCE code exchange, refresh)
//!     └── tracks  (GET /tracks/{id} → TrackInfo)
//!          ↓
//! HTTP Layer (reqwest, JSON)
//! ```
//!
//! Metadata lookups fail closed: missing credentials, a rejected token request
//! or a non-success track response all map to [`JobError::Unavailable`] and
//! are never retried.

pub mod auth;
pub mod tracks;

use async_trait::async_trait;

use crate::{error::JobError, types::TrackInfo};

pub use tracks::SpotifyClient;

/// Turns a track reference into `(title, artist)`.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn resolve(&self, track_ref: &str) -> Result<TrackInfo, JobError>;
}
