use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::RegistryError, utils};

/// Longest `error` text a job will carry.
pub const MAX_ERROR_LEN: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

/// Pipeline stages a running job walks through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lookup,
    Locate,
    Download,
    StageFile,
}

impl Stage {
    /// Progress checkpoint reported when the stage begins.
    pub fn checkpoint(self) -> u8 {
        match self {
            Stage::Lookup => 10,
            Stage::Locate => 25,
            Stage::Download => 45,
            Stage::StageFile => 85,
        }
    }
}

/// A completed job's output, held in the staging directory until expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    pub name: String,
    pub content_type: &'static str,
}

/// One download request tracked from submission to expiry.
///
/// Fields are only reachable through the transition methods so that the
/// status order, the progress floor and the "output iff done" rule cannot be
/// broken by a caller.
#[derive(Debug, Clone)]
pub struct Job {
    id: String,
    track_ref: String,
    status: JobStatus,
    progress: u8,
    message: String,
    error: Option<String>,
    output: Option<StagedFile>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: String, track_ref: String) -> Self {
        Job {
            id,
            track_ref,
            status: JobStatus::Queued,
            progress: 0,
            message: "Queued…".to_string(),
            error: None,
            output: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn track_ref(&self) -> &str {
        &self.track_ref
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn output(&self) -> Option<&StagedFile> {
        self.output.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn start(&mut self) -> Result<(), RegistryError> {
        self.transition(JobStatus::Running, &[JobStatus::Queued])
    }

    /// Moves the job's progress marker and message. Progress never goes
    /// backwards and stays below 100 until the job is done.
    pub fn advance(&mut self, progress: u8, message: impl Into<String>) -> Result<(), RegistryError> {
        if self.status != JobStatus::Running {
            return Err(self.invalid(JobStatus::Running));
        }
        self.progress = self.progress.max(progress.min(99));
        self.message = message.into();
        Ok(())
    }

    pub fn complete(&mut self, output: StagedFile) -> Result<(), RegistryError> {
        self.transition(JobStatus::Done, &[JobStatus::Running])?;
        self.progress = 100;
        self.message = "Ready".to_string();
        self.output = Some(output);
        Ok(())
    }

    pub fn fail(&mut self, error: &str) -> Result<(), RegistryError> {
        self.transition(JobStatus::Error, &[JobStatus::Running])?;
        self.message = "Failed".to_string();
        self.error = Some(utils::truncate_tail(error.trim(), MAX_ERROR_LEN));
        Ok(())
    }

    fn transition(&mut self, to: JobStatus, from: &[JobStatus]) -> Result<(), RegistryError> {
        if !from.contains(&self.status) {
            return Err(self.invalid(to));
        }
        self.status = to;
        if to.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    fn invalid(&self, to: JobStatus) -> RegistryError {
        RegistryError::InvalidTransition {
            id: self.id.clone(),
            from: self.status,
            to,
        }
    }
}

/// The client-facing snapshot returned by `GET /download/status/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobView {
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        JobView {
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            error: job.error.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub title: String,
    pub artist: String,
}

impl TrackInfo {
    /// `"<artist> - <title>"`, the base for both search queries and file names.
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }
}

/// What the download tool needs to fetch audio for a located track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub provider: String,
    pub url: String,
}

/// An audio file found in a job's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFile {
    pub path: PathBuf,
    pub extension: &'static str,
}

/// A progress hint inferred from the download tool's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProgress {
    pub percent: u8,
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartDownloadRequest {
    #[serde(rename = "trackRef", alias = "spotify_url", default)]
    pub track_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartDownloadResponse {
    #[serde(rename = "jobId")]
    pub job_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// A client-credentials token with the moment it was obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub obtained_at: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackResponse {
    pub name: Option<String>,
    #[serde(default)]
    pub artists: Vec<TrackArtist>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackArtist {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvidiousSearchItem {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
}
