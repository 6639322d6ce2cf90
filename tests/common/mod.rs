#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tunefetch::{
    config::ServiceConfig,
    error::{JobError, ProviderError},
    executor::DownloadExecutor,
    management::{ExpiryScheduler, JobRegistry},
    orchestrator::{Orchestrator, PipelineSettings},
    server::AppState,
    sources::{SourceLocator, SourceProvider},
    spotify::MetadataResolver,
    types::{JobView, SourceDescriptor, TrackInfo},
};

// Script that behaves like a successful download tool run
pub const SUCCESS_SCRIPT: &str = r#"
echo "[youtube] Extracting URL"
echo "[download]  12.5% of 3.20MiB at 1.00MiB/s"
echo "[download] 100.0% of 3.20MiB at 1.00MiB/s"
echo "[ExtractAudio] Destination: Song.mp3"
printf 'ID3\003\000fake-mp3-payload' > "Song.mp3"
"#;

// Metadata resolver returning a fixed answer
pub struct StaticMetadata {
    pub result: Result<TrackInfo, String>,
}

impl StaticMetadata {
    pub fn track(artist: &str, title: &str) -> Self {
        StaticMetadata {
            result: Ok(TrackInfo {
                title: title.to_string(),
                artist: artist.to_string(),
            }),
        }
    }

    pub fn unavailable(message: &str) -> Self {
        StaticMetadata {
            result: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl MetadataResolver for StaticMetadata {
    async fn resolve(&self, _track_ref: &str) -> Result<TrackInfo, JobError> {
        self.result.clone().map_err(JobError::Unavailable)
    }
}

// Metadata resolver that takes its time before answering
pub struct SlowMetadata {
    pub delay: Duration,
}

#[async_trait]
impl MetadataResolver for SlowMetadata {
    async fn resolve(&self, _track_ref: &str) -> Result<TrackInfo, JobError> {
        tokio::time::sleep(self.delay).await;
        Ok(TrackInfo {
            title: "Slow Song".to_string(),
            artist: "Slow Artist".to_string(),
        })
    }
}

pub struct PanickingMetadata;

#[async_trait]
impl MetadataResolver for PanickingMetadata {
    async fn resolve(&self, _track_ref: &str) -> Result<TrackInfo, JobError> {
        panic!("metadata resolver blew up");
    }
}

/// Provider that always succeeds with `url` and counts its calls.
pub struct FixedProvider {
    pub name: String,
    pub url: String,
    pub calls: Arc<AtomicUsize>,
}

impl FixedProvider {
    pub fn new(name: &str, url: &str) -> Self {
        FixedProvider {
            name: name.to_string(),
            url: url.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl SourceProvider for FixedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, _query: &str) -> Result<SourceDescriptor, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SourceDescriptor {
            provider: self.name.clone(),
            url: self.url.clone(),
        })
    }
}

/// Provider that always comes back empty and counts its calls.
pub struct FailingProvider {
    pub name: String,
    pub calls: Arc<AtomicUsize>,
}

impl FailingProvider {
    pub fn new(name: &str) -> Self {
        FailingProvider {
            name: name.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl SourceProvider for FailingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, query: &str) -> Result<SourceDescriptor, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Empty {
            provider: self.name.clone(),
            query: query.to_string(),
        })
    }
}

/// Provider that never answers within any reasonable budget.
pub struct HangingProvider {
    pub name: String,
}

#[async_trait]
impl SourceProvider for HangingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, _query: &str) -> Result<SourceDescriptor, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(ProviderError::Empty {
            provider: self.name.clone(),
            query: String::new(),
        })
    }
}

/// Writes a shell script that stands in for the download tool. It is run as
/// `sh <script> <tool args...>` inside the job's work dir, so the fake source
/// URL is the script path and the executor program is `sh`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write script");
    path
}

pub fn test_config(staging_dir: &Path) -> ServiceConfig {
    ServiceConfig {
        server_addr: "127.0.0.1:0".to_string(),
        spotify_client_id: None,
        spotify_client_secret: None,
        spotify_api_url: "http://127.0.0.1:9/v1".to_string(),
        spotify_token_url: "http://127.0.0.1:9/api/token".to_string(),
        ytdlp_bin: "sh".to_string(),
        ffmpeg_bin: "ffmpeg".to_string(),
        staging_dir: staging_dir.to_path_buf(),
        retention: Duration::from_secs(600),
        failed_retention: Duration::from_secs(600),
        download_timeout: Duration::from_secs(10),
        locate_timeout: Duration::from_secs(5),
        provider_timeout: Duration::from_secs(2),
        http_timeout: Duration::from_secs(2),
        max_concurrent_jobs: 4,
        source_providers: vec!["youtube".to_string()],
        invidious_instances: Vec::new(),
        audio_quality: "5".to_string(),
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub registry: Arc<JobRegistry>,
    pub shutdown: CancellationToken,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub fn harness(
    config: &ServiceConfig,
    metadata: Arc<dyn MetadataResolver>,
    providers: Vec<Arc<dyn SourceProvider>>,
) -> Harness {
    let registry = Arc::new(JobRegistry::new());
    let shutdown = CancellationToken::new();
    let (expiry, _sweeper) = ExpiryScheduler::spawn(Arc::clone(&registry), shutdown.clone());
    let locator = Arc::new(SourceLocator::new(
        providers,
        config.provider_timeout,
        config.locate_timeout,
    ));
    let executor = Arc::new(DownloadExecutor::new("sh", "5"));

    let orchestrator = Orchestrator::new(
        Arc::clone(&registry),
        metadata,
        locator,
        executor,
        expiry,
        PipelineSettings::from(config),
    );

    Harness {
        orchestrator,
        registry,
        shutdown,
    }
}

pub fn app_state(harness: &Harness, config: ServiceConfig) -> AppState {
    AppState {
        orchestrator: harness.orchestrator.clone(),
        http: reqwest::Client::new(),
        config: Arc::new(config),
    }
}

/// Polls a job until it reaches a terminal status, returning the final view
/// and every distinct view seen on the way.
pub async fn wait_for_terminal(registry: &JobRegistry, job_id: &str) -> (JobView, Vec<JobView>) {
    let mut seen: Vec<JobView> = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);

    loop {
        let view = registry
            .view(job_id)
            .await
            .expect("job disappeared before finishing");
        if seen.last() != Some(&view) {
            seen.push(view.clone());
        }
        if view.status.is_terminal() {
            return (view, seen);
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} did not finish in time, last view: {view:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_until_gone(registry: &JobRegistry, job_id: &str, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if registry.get(job_id).await.is_none() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
