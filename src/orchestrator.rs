//! The per-job download pipeline.
//!
//! ```text
//! queued ─► running(lookup) ─► running(locate) ─► running(download) ─► running(stage-file) ─► done
//!                 │                  │                   │                     │
//!                 └──────────────────┴─────────┬─────────┴─────────────────────┘
//!                                              ▼
//!                                            error
//! ```
//!
//! [`Orchestrator::submit`] registers the job and returns its id at once; a
//! supervising task waits for a concurrency permit, marks the job running and
//! drives the stages in a child task. Whatever the child task produces,
//! including a panic, becomes the job's single terminal write. Only after that
//! write is the job handed to the expiry sweeper.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tokio::sync::{Semaphore, mpsc};

use crate::{
    config::ServiceConfig,
    error::{JobError, RegistryError},
    executor::DownloadExecutor,
    management::{ExpiryScheduler, JobRegistry},
    sources::SourceLocator,
    spotify::MetadataResolver,
    types::{AudioFile, DownloadProgress, Job, SourceDescriptor, Stage, StagedFile, TrackInfo},
    utils,
};

/// Timing and placement knobs for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub staging_dir: PathBuf,
    pub download_timeout: Duration,
    pub retention: Duration,
    pub failed_retention: Duration,
    pub max_concurrent_jobs: usize,
}

impl From<&ServiceConfig> for PipelineSettings {
    fn from(config: &ServiceConfig) -> Self {
        PipelineSettings {
            staging_dir: config.staging_dir.clone(),
            download_timeout: config.download_timeout,
            retention: config.retention,
            failed_retention: config.failed_retention,
            max_concurrent_jobs: config.max_concurrent_jobs,
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<JobRegistry>,
    metadata: Arc<dyn MetadataResolver>,
    locator: Arc<SourceLocator>,
    executor: Arc<DownloadExecutor>,
    expiry: ExpiryScheduler,
    permits: Arc<Semaphore>,
    settings: Arc<PipelineSettings>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<JobRegistry>,
        metadata: Arc<dyn MetadataResolver>,
        locator: Arc<SourceLocator>,
        executor: Arc<DownloadExecutor>,
        expiry: ExpiryScheduler,
        settings: PipelineSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_jobs.max(1)));
        Orchestrator {
            registry,
            metadata,
            locator,
            executor,
            expiry,
            permits,
            settings: Arc::new(settings),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Source providers in the order the locator tries them.
    pub fn provider_names(&self) -> Vec<&str> {
        self.locator.provider_names()
    }

    /// Registers a new job for `track_ref` and starts its worker. Returns the
    /// job id without waiting for any stage.
    pub async fn submit(&self, track_ref: &str) -> Result<String, RegistryError> {
        let job_id = loop {
            let candidate = utils::generate_job_id();
            match self.registry.create(&candidate, track_ref).await {
                Ok(_) => break candidate,
                Err(RegistryError::AlreadyExists(_)) => continue,
                Err(e) => return Err(e),
            }
        };

        tracing::info!(job_id = %job_id, track_ref, "job queued");

        let this = self.clone();
        let id = job_id.clone();
        let track_ref = track_ref.to_string();
        tokio::spawn(async move { this.supervise(id, track_ref).await });

        Ok(job_id)
    }

    async fn supervise(self, job_id: String, track_ref: String) {
        let permit = self.permits.clone().acquire_owned().await;

        if let Err(e) = self.registry.update(&job_id, |job| job.start()).await {
            tracing::error!(job_id = %job_id, error = %e, "cannot start job");
            return;
        }
        tracing::info!(job_id = %job_id, "job started");

        let outcome = match permit {
            Ok(_permit) => {
                let pipeline = tokio::spawn(self.clone().run_pipeline(job_id.clone(), track_ref));
                match pipeline.await {
                    Ok(result) => result,
                    Err(e) if e.is_panic() => Err(JobError::Unexpected("worker panicked".to_string())),
                    Err(e) => Err(JobError::Unexpected(e.to_string())),
                }
            }
            Err(_) => Err(JobError::Unexpected("service is shutting down".to_string())),
        };

        let retention = match outcome {
            Ok(staged) => self.finish(&job_id, staged).await,
            Err(e) => self.fail(&job_id, &e).await,
        };

        self.expiry.schedule(&job_id, retention);
    }

    async fn finish(&self, job_id: &str, staged: StagedFile) -> Duration {
        let path = staged.path.clone();
        let completed = self
            .registry
            .update(job_id, |job| {
                job.complete(staged)?;
                Ok(elapsed_ms(job))
            })
            .await;
        match completed {
            Ok(elapsed_ms) => {
                tracing::info!(job_id, path = %path.display(), elapsed_ms, "job done");
                self.settings.retention
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "cannot mark job done, discarding output");
                let _ = async_fs::remove_file(&path).await;
                self.fail(job_id, &JobError::Unexpected(e.to_string())).await
            }
        }
    }

    async fn fail(&self, job_id: &str, error: &JobError) -> Duration {
        let text = error.to_string();
        let failed = self
            .registry
            .update(job_id, |job| {
                job.fail(&text)?;
                Ok(elapsed_ms(job))
            })
            .await;
        match failed {
            Ok(elapsed_ms) => tracing::warn!(job_id, error = %text, elapsed_ms, "job failed"),
            Err(e) => tracing::error!(job_id, error = %e, "cannot mark job failed"),
        }
        self.settings.failed_retention
    }

    async fn run_pipeline(self, job_id: String, track_ref: String) -> Result<StagedFile, JobError> {
        self.mark(&job_id, Stage::Lookup, "Looking up track…").await;
        let track = self.metadata.resolve(&track_ref).await?;

        self.mark(
            &job_id,
            Stage::Locate,
            format!("Searching: {} – {}", track.artist, track.title),
        )
        .await;
        let source = self.locator.locate(&track.display_name()).await?;

        self.mark(&job_id, Stage::Download, "Downloading audio…").await;
        let work_dir = tempfile::Builder::new().prefix("tunefetch-").tempdir()?;
        let audio = self.download(&job_id, &source, work_dir.path()).await?;

        self.mark(&job_id, Stage::StageFile, "Finishing up…").await;
        let staged = self.stage(&job_id, &track, &audio).await?;

        if let Err(e) = work_dir.close() {
            tracing::warn!(job_id = %job_id, error = %e, "failed to remove work dir");
        }
        Ok(staged)
    }

    async fn download(
        &self,
        job_id: &str,
        source: &SourceDescriptor,
        work_dir: &Path,
    ) -> Result<AudioFile, JobError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<DownloadProgress>();
        let registry = self.registry.clone();
        let id = job_id.to_string();
        let forwarder = tokio::spawn(async move {
            while let Some(hint) = rx.recv().await {
                let _ = registry
                    .update(&id, |job| job.advance(hint.percent, hint.message))
                    .await;
            }
        });

        tracing::info!(job_id, provider = %source.provider, url = %source.url, "downloading");
        let result = self
            .executor
            .execute(source, work_dir, self.settings.download_timeout, Some(tx))
            .await;

        // every hint lands before the next stage marker
        let _ = forwarder.await;
        result
    }

    /// Copies the finished file into the staging directory as
    /// `<job id>.<ext>`; the client-facing name is `"<artist> - <title>.<ext>"`.
    async fn stage(
        &self,
        job_id: &str,
        track: &TrackInfo,
        audio: &AudioFile,
    ) -> Result<StagedFile, JobError> {
        async_fs::create_dir_all(&self.settings.staging_dir).await?;
        let dest = self
            .settings
            .staging_dir
            .join(format!("{}.{}", job_id, audio.extension));
        async_fs::copy(&audio.path, &dest).await?;

        Ok(StagedFile {
            path: dest,
            name: format!(
                "{}.{}",
                utils::sanitize_file_stem(&track.display_name()),
                audio.extension
            ),
            content_type: utils::content_type_for(audio.extension),
        })
    }

    async fn mark(&self, job_id: &str, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(job_id, ?stage, %message, "stage");
        if let Err(e) = self
            .registry
            .update(job_id, |job| job.advance(stage.checkpoint(), message))
            .await
        {
            tracing::warn!(job_id, error = %e, "cannot record stage");
        }
    }
}

fn elapsed_ms(job: &Job) -> i64 {
    job.finished_at()
        .map(|finished| (finished - job.created_at()).num_milliseconds())
        .unwrap_or_default()
}
