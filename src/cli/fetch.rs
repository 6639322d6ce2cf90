use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, header};
use serde_json::{Value, json};
use tokio::time::sleep;

use crate::{
    Res, error, info, success,
    types::{JobStatus, JobView, StartDownloadResponse},
    warning,
};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub async fn fetch(server: &str, track_ref: &str, output_dir: Option<PathBuf>) {
    let client = Client::new();
    let base = server.trim_end_matches('/');

    info!("Submitting {}", track_ref);
    let job_id = match start(&client, base, track_ref).await {
        Ok(id) => id,
        Err(e) => error!("Cannot start download: {}", e),
    };
    info!("Job {} queued", job_id);

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.blue} [{bar:30.blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    loop {
        let view = match status(&client, base, &job_id).await {
            Ok(view) => view,
            Err(e) => {
                pb.finish_and_clear();
                error!("Cannot read job status: {}", e);
            }
        };

        pb.set_position(view.progress as u64);
        pb.set_message(view.message.clone());

        match view.status {
            JobStatus::Done => break,
            JobStatus::Error => {
                pb.finish_and_clear();
                error!(
                    "Download failed: {}",
                    view.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
            JobStatus::Queued | JobStatus::Running => sleep(POLL_INTERVAL).await,
        }
    }
    pb.finish_and_clear();

    let dir = output_dir.unwrap_or_else(|| PathBuf::from("."));
    match save(&client, base, &job_id, &dir).await {
        Ok(path) => success!("Saved {}", path.display()),
        Err(e) => error!("Cannot save file: {}", e),
    }
}

async fn start(client: &Client, base: &str, track_ref: &str) -> Res<String> {
    let res = client
        .post(format!("{base}/download/start"))
        .json(&json!({ "trackRef": track_ref }))
        .send()
        .await?;

    if !res.status().is_success() {
        return Err(error_text(res).await.into());
    }
    Ok(res.json::<StartDownloadResponse>().await?.job_id)
}

async fn status(client: &Client, base: &str, job_id: &str) -> Res<JobView> {
    let res = client
        .get(format!("{base}/download/status/{job_id}"))
        .send()
        .await?;

    if !res.status().is_success() {
        return Err(error_text(res).await.into());
    }
    Ok(res.json::<JobView>().await?)
}

async fn save(client: &Client, base: &str, job_id: &str, dir: &Path) -> Res<PathBuf> {
    let res = client
        .get(format!("{base}/download/file/{job_id}"))
        .send()
        .await?;

    if !res.status().is_success() {
        return Err(error_text(res).await.into());
    }

    let name = match res
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(filename_from_disposition)
    {
        Some(name) => name,
        None => {
            warning!("Server sent no file name, saving as {}.mp3", job_id);
            format!("{job_id}.mp3")
        }
    };

    let bytes = res.bytes().await?;
    async_fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    async_fs::write(&path, &bytes).await?;
    Ok(path)
}

async fn error_text(res: reqwest::Response) -> String {
    let status = res.status();
    match res.json::<Value>().await {
        Ok(body) => match body["error"].as_str() {
            Some(message) => format!("{status}: {message}"),
            None => status.to_string(),
        },
        Err(_) => status.to_string(),
    }
}

/// Picks the file name out of a `Content-Disposition` header, preferring the
/// RFC 5987 `filename*` form. Any directory part is dropped.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for part in value.split(';').map(str::trim) {
        if let Some(encoded) = part.strip_prefix("filename*=UTF-8''") {
            extended = urlencoding::decode(encoded).ok().map(|s| s.into_owned());
        } else if let Some(quoted) = part.strip_prefix("filename=") {
            plain = Some(quoted.trim_matches('"').to_string());
        }
    }

    extended
        .or(plain)
        .and_then(|name| {
            Path::new(&name)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .filter(|name| !name.is_empty())
}
