use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    sync::mpsc::UnboundedSender,
    task::JoinHandle,
    time::timeout,
};
use walkdir::WalkDir;

use crate::{
    config::ServiceConfig,
    error::JobError,
    types::{AudioFile, DownloadProgress, SourceDescriptor, Stage},
    utils,
};

/// Output extensions accepted as a finished download, highest priority first.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "opus"];

/// Characters of each output stream kept in memory while the tool runs.
const CAPTURE_CHARS: usize = 800;
const FAILURE_DETAIL_CHARS: usize = 400;
const NO_OUTPUT_DETAIL_CHARS: usize = 200;

/// How long to wait for the output readers once the process has exited.
const READER_GRACE: Duration = Duration::from_secs(5);

/// Runs the external download/transcode tool for one located source.
#[derive(Debug, Clone)]
pub struct DownloadExecutor {
    program: String,
    audio_quality: String,
}

impl DownloadExecutor {
    pub fn new(program: impl Into<String>, audio_quality: impl Into<String>) -> Self {
        DownloadExecutor {
            program: program.into(),
            audio_quality: audio_quality.into(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(&config.ytdlp_bin, &config.audio_quality)
    }

    pub fn build_args(&self, source: &SourceDescriptor, work_dir: &Path) -> Vec<String> {
        let template = work_dir.join("%(title)s.%(ext)s");
        vec![
            source.url.clone(),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            "mp3".to_string(),
            "--audio-quality".to_string(),
            self.audio_quality.clone(),
            "--output".to_string(),
            template.to_string_lossy().into_owned(),
            "--no-playlist".to_string(),
            "--socket-timeout".to_string(),
            "30".to_string(),
            "--retries".to_string(),
            "3".to_string(),
            "--no-warnings".to_string(),
            "--newline".to_string(),
        ]
    }

    /// Downloads `source` into `work_dir`.
    ///
    /// The process is killed once `limit` elapses. A zero exit status only
    /// counts as success when a file with one of [`AUDIO_EXTENSIONS`] exists
    /// somewhere under `work_dir`. Progress hints read from the tool's output
    /// are sent on `progress` when given.
    pub async fn execute(
        &self,
        source: &SourceDescriptor,
        work_dir: &Path,
        limit: Duration,
        progress: Option<UnboundedSender<DownloadProgress>>,
    ) -> Result<AudioFile, JobError> {
        let mut command = Command::new(&self.program);
        command
            .args(self.build_args(source, work_dir))
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // own process group, so a timeout also reaches the transcoder it spawns
        #[cfg(unix)]
        {
            command.process_group(0);
        }

        let mut child = command
            .spawn()
            .map_err(|e| JobError::ProcessFailed(format!("cannot run {}: {}", self.program, e)))?;
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| JobError::Unexpected("download tool stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| JobError::Unexpected("download tool stderr not captured".to_string()))?;

        let stdout_task = tokio::spawn(capture_output(stdout, progress));
        let stderr_task = tokio::spawn(capture_output(stderr, None));

        let waited = timeout(limit, child.wait()).await;
        let status = match waited {
            Ok(status) => status?,
            Err(_) => {
                tracing::warn!(
                    program = %self.program,
                    timeout_secs = limit.as_secs(),
                    "download tool timed out, killing"
                );
                kill_process_tree(&mut child, pid).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(JobError::TimedOut(limit));
            }
        };

        let stdout_tail = join_capture(stdout_task).await;
        let stderr_tail = join_capture(stderr_task).await;
        tracing::debug!(
            code = ?status.code(),
            stdout = %utils::truncate_tail(&stdout_tail, FAILURE_DETAIL_CHARS),
            stderr = %utils::truncate_tail(&stderr_tail, FAILURE_DETAIL_CHARS),
            "download tool exited"
        );

        if !status.success() {
            let detail = [stderr_tail.trim(), stdout_tail.trim()]
                .into_iter()
                .find(|s| !s.is_empty())
                .unwrap_or("download tool failed");
            return Err(JobError::ProcessFailed(utils::truncate_tail(
                detail,
                FAILURE_DETAIL_CHARS,
            )));
        }

        let dir = work_dir.to_path_buf();
        let found = tokio::task::spawn_blocking(move || find_audio_file(&dir))
            .await
            .map_err(|e| JobError::Unexpected(e.to_string()))?;

        found.ok_or_else(|| {
            JobError::NoOutputProduced(utils::truncate_tail(
                stderr_tail.trim(),
                NO_OUTPUT_DETAIL_CHARS,
            ))
        })
    }
}

/// Finds the output file: the first extension in priority order wins, and
/// within one extension the first file in name order.
pub fn find_audio_file(dir: &Path) -> Option<AudioFile> {
    let files: Vec<PathBuf> = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();

    AUDIO_EXTENSIONS.iter().find_map(|ext| {
        files
            .iter()
            .find(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(ext))
            })
            .map(|path| AudioFile {
                path: path.clone(),
                extension: *ext,
            })
    })
}

/// Maps one line of tool output to a progress hint.
///
/// `[download]  42.0% of ...` lines spread across the download band (45–75),
/// extraction and ffmpeg lines mark the conversion step.
pub fn infer_progress(line: &str) -> Option<DownloadProgress> {
    let line = line.trim();

    if line.starts_with("[ExtractAudio]") || line.starts_with("[ffmpeg]") || line.contains("Converting") {
        return Some(DownloadProgress {
            percent: 75,
            message: "Converting to MP3…".to_string(),
        });
    }

    if let Some(rest) = line.strip_prefix("[download]") {
        let token = rest.split_whitespace().next()?;
        let pct: f32 = token.strip_suffix('%')?.parse().ok()?;
        let pct = pct.clamp(0.0, 100.0);
        let base = Stage::Download.checkpoint() as f32;
        return Some(DownloadProgress {
            percent: (base + pct * 0.3) as u8,
            message: format!("Downloading audio… {pct:.0}%"),
        });
    }

    None
}

/// Kills the tool together with everything it started, then reaps it.
async fn kill_process_tree(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = pid {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                tracing::warn!(pid, error = %e, "failed to kill download tool process group");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }

    if let Err(e) = child.kill().await {
        tracing::error!(error = %e, "failed to kill download tool");
    }
}

async fn capture_output<R>(reader: R, progress: Option<UnboundedSender<DownloadProgress>>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut captured = String::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let line = String::from_utf8_lossy(&buf);
        tracing::trace!(line = %line.trim_end(), "download tool output");

        if let Some(tx) = &progress {
            if let Some(hint) = infer_progress(&line) {
                let _ = tx.send(hint);
            }
        }

        captured.push_str(&line);
        if captured.len() > CAPTURE_CHARS * 8 {
            captured = utils::truncate_tail(&captured, CAPTURE_CHARS);
        }
    }

    utils::truncate_tail(&captured, CAPTURE_CHARS)
}

async fn join_capture(mut handle: JoinHandle<String>) -> String {
    match timeout(READER_GRACE, &mut handle).await {
        Ok(Ok(text)) => text,
        Ok(Err(_)) => String::new(),
        Err(_) => {
            handle.abort();
            String::new()
        }
    }
}
