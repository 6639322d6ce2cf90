//! Configuration management for the download service.
//!
//! Values come from environment variables, optionally seeded from `.env`
//! files. Each variable has an accessor with a sensible default; only the
//! Spotify credentials are optional, and their absence surfaces as a job
//! failure rather than a startup error.
//!
//! The accessors are read once at startup into a [`ServiceConfig`], which the
//! server's composition root hands to every component.

use std::{env, path::PathBuf, str::FromStr, time::Duration};

pub const DEFAULT_PROVIDERS: &[&str] = &["youtube", "soundcloud", "invidious"];

/// Loads environment variables from `.env` files.
///
/// The current directory is tried first, then `tunefetch/.env` in the
/// platform's local data directory. Variables already present in the
/// environment are never overwritten, and missing files are not an error.
///
/// # Errors
///
/// Returns an error if the data directory cannot be created or a `.env` file
/// exists but cannot be parsed.
pub async fn load_env() -> Result<(), String> {
    match dotenv::dotenv() {
        Ok(_) => {}
        Err(dotenv::Error::Io(_)) => {}
        Err(e) => return Err(e.to_string()),
    }

    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("tunefetch/.env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }

    if path.is_file() {
        dotenv::from_path(&path).map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Returns the address the HTTP server binds to.
///
/// `SERVER_ADDRESS` wins when set; otherwise `0.0.0.0:$PORT`, with `PORT`
/// defaulting to 5000.
pub fn server_addr() -> String {
    env::var("SERVER_ADDRESS").unwrap_or_else(|_| format!("0.0.0.0:{}", port()))
}

pub fn port() -> u16 {
    parse_or("PORT", 5000)
}

/// Returns the Spotify client ID, if configured.
pub fn spotify_client_id() -> Option<String> {
    non_empty("SPOTIFY_CLIENT_ID")
}

/// Returns the Spotify client secret, if configured.
///
/// The secret must never be logged.
pub fn spotify_client_secret() -> Option<String> {
    non_empty("SPOTIFY_CLIENT_SECRET")
}

/// Returns the Spotify Web API base URL, e.g. `https://api.spotify.com/v1`.
pub fn spotify_apiurl() -> String {
    env::var("SPOTIFY_API_URL").unwrap_or_else(|_| "https://api.spotify.com/v1".to_string())
}

/// Returns the Spotify OAuth token URL.
pub fn spotify_apitoken_url() -> String {
    env::var("SPOTIFY_API_TOKEN_URL")
        .unwrap_or_else(|_| "https://accounts.spotify.com/api/token".to_string())
}

pub fn ytdlp_bin() -> String {
    env::var("YTDLP_BIN").unwrap_or_else(|_| "yt-dlp".to_string())
}

pub fn ffmpeg_bin() -> String {
    env::var("FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".to_string())
}

/// Returns the directory finished files are staged in while they wait to be
/// fetched.
pub fn staging_dir() -> PathBuf {
    env::var("STAGING_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("tunefetch_dl"))
}

pub fn retention() -> Duration {
    Duration::from_secs(parse_or("RETENTION_SECS", 600))
}

pub fn failed_retention() -> Duration {
    Duration::from_secs(parse_or("FAILED_RETENTION_SECS", 600))
}

pub fn download_timeout() -> Duration {
    Duration::from_secs(parse_or("DOWNLOAD_TIMEOUT_SECS", 180))
}

pub fn locate_timeout() -> Duration {
    Duration::from_secs(parse_or("LOCATE_TIMEOUT_SECS", 60))
}

pub fn provider_timeout() -> Duration {
    Duration::from_secs(parse_or("PROVIDER_TIMEOUT_SECS", 20))
}

pub fn http_timeout() -> Duration {
    Duration::from_secs(parse_or("HTTP_TIMEOUT_SECS", 10))
}

pub fn max_concurrent_jobs() -> usize {
    parse_or::<usize>("MAX_CONCURRENT_JOBS", 4).max(1)
}

/// Returns the ordered provider list from `SOURCE_PROVIDERS`.
///
/// Unknown names are dropped with a warning. An empty result falls back to
/// the default order.
pub fn source_providers() -> Vec<String> {
    let providers: Vec<String> = match env::var("SOURCE_PROVIDERS") {
        Ok(raw) => split_list(&raw)
            .into_iter()
            .filter(|name| {
                let known = DEFAULT_PROVIDERS.contains(&name.as_str());
                if !known {
                    tracing::warn!(provider = %name, "ignoring unknown source provider");
                }
                known
            })
            .collect(),
        Err(_) => Vec::new(),
    };

    if providers.is_empty() {
        DEFAULT_PROVIDERS.iter().map(|p| p.to_string()).collect()
    } else {
        providers
    }
}

pub fn invidious_instances() -> Vec<String> {
    let raw = env::var("INVIDIOUS_INSTANCES")
        .unwrap_or_else(|_| "https://yewtu.be,https://inv.nadeko.net".to_string());
    split_list(&raw)
        .into_iter()
        .map(|url| url.trim_end_matches('/').to_string())
        .collect()
}

pub fn audio_quality() -> String {
    env::var("AUDIO_QUALITY").unwrap_or_else(|_| "5".to_string())
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// A snapshot of every setting the service needs, taken once at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub server_addr: String,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub spotify_api_url: String,
    pub spotify_token_url: String,
    pub ytdlp_bin: String,
    pub ffmpeg_bin: String,
    pub staging_dir: PathBuf,
    pub retention: Duration,
    pub failed_retention: Duration,
    pub download_timeout: Duration,
    pub locate_timeout: Duration,
    pub provider_timeout: Duration,
    pub http_timeout: Duration,
    pub max_concurrent_jobs: usize,
    pub source_providers: Vec<String>,
    pub invidious_instances: Vec<String>,
    pub audio_quality: String,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        ServiceConfig {
            server_addr: server_addr(),
            spotify_client_id: spotify_client_id(),
            spotify_client_secret: spotify_client_secret(),
            spotify_api_url: spotify_apiurl(),
            spotify_token_url: spotify_apitoken_url(),
            ytdlp_bin: ytdlp_bin(),
            ffmpeg_bin: ffmpeg_bin(),
            staging_dir: staging_dir(),
            retention: retention(),
            failed_retention: failed_retention(),
            download_timeout: download_timeout(),
            locate_timeout: locate_timeout(),
            provider_timeout: provider_timeout(),
            http_timeout: http_timeout(),
            max_concurrent_jobs: max_concurrent_jobs(),
            source_providers: source_providers(),
            invidious_instances: invidious_instances(),
            audio_quality: audio_quality(),
        }
    }
}
