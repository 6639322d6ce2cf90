#![cfg(unix)]

mod common;

use std::{sync::Arc, time::Duration};

use tunefetch::spotify::{MetadataResolver, SpotifyClient};
use tunefetch::types::JobStatus;

use common::{
    FailingProvider, FixedProvider, PanickingMetadata, SUCCESS_SCRIPT, SlowMetadata, StaticMetadata,
    harness, test_config, wait_for_terminal, wait_until_gone, write_script,
};

const TRACK: &str = "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC";

#[tokio::test]
async fn test_successful_job_reaches_done() {
    let staging = tempfile::tempdir().unwrap();
    let scripts = tempfile::tempdir().unwrap();
    let script = write_script(scripts.path(), "ok.sh", SUCCESS_SCRIPT);

    let config = test_config(staging.path());
    let h = harness(
        &config,
        Arc::new(StaticMetadata::track("Radiohead", "Creep")),
        vec![Arc::new(FixedProvider::new("youtube", &script.to_string_lossy()))],
    );

    let job_id = h.orchestrator.submit(TRACK).await.unwrap();
    assert_eq!(job_id.len(), 8);

    let (view, seen) = wait_for_terminal(&h.registry, &job_id).await;
    assert_eq!(view.status, JobStatus::Done, "job failed: {:?}", view.error);
    assert_eq!(view.progress, 100);
    assert_eq!(view.message, "Ready");
    assert!(view.error.is_none());

    // Progress only moves forward and never shows 100 before done
    for pair in seen.windows(2) {
        assert!(pair[0].progress <= pair[1].progress, "progress went back: {seen:?}");
    }
    for v in &seen {
        if v.status != JobStatus::Done {
            assert!(v.progress < 100);
        }
    }

    let job = h.registry.get(&job_id).await.unwrap();
    let output = job.output().unwrap();
    assert_eq!(output.name, "Radiohead - Creep.mp3");
    assert_eq!(output.content_type, "audio/mpeg");
    assert_eq!(output.path, staging.path().join(format!("{job_id}.mp3")));
    assert!(output.path.exists());
    assert!(job.finished_at().is_some());
}

#[tokio::test]
async fn test_submit_returns_before_pipeline_runs() {
    let staging = tempfile::tempdir().unwrap();
    let config = test_config(staging.path());
    let h = harness(
        &config,
        Arc::new(SlowMetadata {
            delay: Duration::from_millis(500),
        }),
        vec![Arc::new(FailingProvider::new("youtube"))],
    );

    let job_id = h.orchestrator.submit(TRACK).await.unwrap();
    let view = h.registry.view(&job_id).await.unwrap();
    assert!(!view.status.is_terminal());

    let (view, _) = wait_for_terminal(&h.registry, &job_id).await;
    assert_eq!(view.status, JobStatus::Error);
}

#[tokio::test]
async fn test_lookup_failure_marks_job_failed() {
    let staging = tempfile::tempdir().unwrap();
    let config = test_config(staging.path());
    let provider = Arc::new(FixedProvider::new("youtube", "https://example.com"));
    let h = harness(
        &config,
        Arc::new(StaticMetadata::unavailable("track 4uLU6hMCjMI75M1A2tKUQC returned 404 Not Found")),
        vec![provider.clone()],
    );

    let job_id = h.orchestrator.submit(TRACK).await.unwrap();
    let (view, _) = wait_for_terminal(&h.registry, &job_id).await;

    assert_eq!(view.status, JobStatus::Error);
    assert_eq!(view.message, "Failed");
    let error = view.error.unwrap();
    assert!(error.starts_with("Could not look up track"));
    assert!(error.contains("404"));

    // The locator is never reached
    assert_eq!(provider.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert!(h.registry.get(&job_id).await.unwrap().output().is_none());
}

#[tokio::test]
async fn test_missing_credentials_fail_at_lookup() {
    let staging = tempfile::tempdir().unwrap();
    let config = test_config(staging.path());
    let spotify: Arc<dyn MetadataResolver> =
        Arc::new(SpotifyClient::new(reqwest::Client::new(), &config));
    let h = harness(&config, spotify, vec![Arc::new(FailingProvider::new("youtube"))]);

    let job_id = h.orchestrator.submit(TRACK).await.unwrap();
    let (view, _) = wait_for_terminal(&h.registry, &job_id).await;

    assert_eq!(view.status, JobStatus::Error);
    assert!(view.error.unwrap().contains("SPOTIFY_CLIENT_ID"));
}

#[tokio::test]
async fn test_no_source_found() {
    let staging = tempfile::tempdir().unwrap();
    let config = test_config(staging.path());
    let h = harness(
        &config,
        Arc::new(StaticMetadata::track("Nobody", "Nothing")),
        vec![
            Arc::new(FailingProvider::new("youtube")),
            Arc::new(FailingProvider::new("soundcloud")),
        ],
    );

    let job_id = h.orchestrator.submit(TRACK).await.unwrap();
    let (view, _) = wait_for_terminal(&h.registry, &job_id).await;

    assert_eq!(view.status, JobStatus::Error);
    let error = view.error.clone().unwrap();
    assert!(error.starts_with("No audio source found"));
    assert!(error.contains("soundcloud"));

    // Progress stays where the failing stage left it
    assert_eq!(view.progress, 25);
}

#[tokio::test]
async fn test_download_timeout_fails_job() {
    let staging = tempfile::tempdir().unwrap();
    let scripts = tempfile::tempdir().unwrap();
    let script = write_script(scripts.path(), "hang.sh", "exec sleep 30\n");

    let mut config = test_config(staging.path());
    config.download_timeout = Duration::from_secs(1);
    let h = harness(
        &config,
        Arc::new(StaticMetadata::track("Artist", "Title")),
        vec![Arc::new(FixedProvider::new("youtube", &script.to_string_lossy()))],
    );

    let job_id = h.orchestrator.submit(TRACK).await.unwrap();
    let (view, _) = wait_for_terminal(&h.registry, &job_id).await;

    assert_eq!(view.status, JobStatus::Error);
    assert_eq!(view.error.as_deref(), Some("Timed out after 1 seconds"));
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_worker_panic_becomes_error() {
    let staging = tempfile::tempdir().unwrap();
    let config = test_config(staging.path());
    let h = harness(
        &config,
        Arc::new(PanickingMetadata),
        vec![Arc::new(FailingProvider::new("youtube"))],
    );

    let job_id = h.orchestrator.submit(TRACK).await.unwrap();
    let (view, _) = wait_for_terminal(&h.registry, &job_id).await;

    assert_eq!(view.status, JobStatus::Error);
    assert!(view.error.unwrap().starts_with("Unexpected"));
}

#[tokio::test]
async fn test_jobs_beyond_the_limit_stay_queued() {
    let staging = tempfile::tempdir().unwrap();
    let mut config = test_config(staging.path());
    config.max_concurrent_jobs = 1;
    let h = harness(
        &config,
        Arc::new(SlowMetadata {
            delay: Duration::from_millis(400),
        }),
        vec![Arc::new(FailingProvider::new("youtube"))],
    );

    let first = h.orchestrator.submit(TRACK).await.unwrap();
    let second = h.orchestrator.submit(TRACK).await.unwrap();
    assert_ne!(first, second);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.registry.view(&first).await.unwrap().status, JobStatus::Running);
    let waiting = h.registry.view(&second).await.unwrap();
    assert_eq!(waiting.status, JobStatus::Queued);
    assert_eq!(waiting.progress, 0);

    let (a, _) = wait_for_terminal(&h.registry, &first).await;
    let (b, _) = wait_for_terminal(&h.registry, &second).await;
    assert_eq!(a.status, JobStatus::Error);
    assert_eq!(b.status, JobStatus::Error);
}

#[tokio::test]
async fn test_done_job_expires_with_its_file() {
    let staging = tempfile::tempdir().unwrap();
    let scripts = tempfile::tempdir().unwrap();
    let script = write_script(scripts.path(), "ok.sh", SUCCESS_SCRIPT);

    let mut config = test_config(staging.path());
    config.retention = Duration::from_millis(300);
    let h = harness(
        &config,
        Arc::new(StaticMetadata::track("Artist", "Title")),
        vec![Arc::new(FixedProvider::new("youtube", &script.to_string_lossy()))],
    );

    let job_id = h.orchestrator.submit(TRACK).await.unwrap();
    let (view, _) = wait_for_terminal(&h.registry, &job_id).await;
    assert_eq!(view.status, JobStatus::Done);

    let path = h.registry.get(&job_id).await.unwrap().output().unwrap().path.clone();
    assert!(path.exists());

    assert!(wait_until_gone(&h.registry, &job_id, Duration::from_secs(5)).await);
    // The file goes right after the entry
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!path.exists());
}

#[tokio::test]
async fn test_failed_job_expires() {
    let staging = tempfile::tempdir().unwrap();
    let mut config = test_config(staging.path());
    config.failed_retention = Duration::from_millis(200);
    let h = harness(
        &config,
        Arc::new(StaticMetadata::unavailable("down")),
        vec![Arc::new(FailingProvider::new("youtube"))],
    );

    let job_id = h.orchestrator.submit(TRACK).await.unwrap();
    let (view, _) = wait_for_terminal(&h.registry, &job_id).await;
    assert_eq!(view.status, JobStatus::Error);

    assert!(wait_until_gone(&h.registry, &job_id, Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_many_jobs_get_distinct_ids() {
    let staging = tempfile::tempdir().unwrap();
    let config = test_config(staging.path());
    let h = harness(
        &config,
        Arc::new(StaticMetadata::unavailable("down")),
        vec![Arc::new(FailingProvider::new("youtube"))],
    );

    let mut ids = std::collections::BTreeSet::new();
    for _ in 0..50 {
        ids.insert(h.orchestrator.submit(TRACK).await.unwrap());
    }
    assert_eq!(ids.len(), 50);
}
