use std::{cmp::Reverse, collections::BinaryHeap, io::ErrorKind, sync::Arc, time::Duration};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;

use super::JobRegistry;

#[derive(Debug)]
struct Expiry {
    deadline: Instant,
    job_id: String,
}

/// Handle for scheduling job expiries on the sweeper task.
///
/// A single sweeper owns a deadline heap; when a deadline passes it deletes
/// the registry entry first and the staged file second, so a fetch can never
/// find a `done` job whose file is already gone.
#[derive(Debug, Clone)]
pub struct ExpiryScheduler {
    tx: mpsc::UnboundedSender<Expiry>,
}

impl ExpiryScheduler {
    /// Starts the sweeper. It runs until `shutdown` is cancelled, at which
    /// point every job still waiting to expire is purged immediately.
    pub fn spawn(registry: Arc<JobRegistry>, shutdown: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_sweeper(registry, rx, shutdown));
        (ExpiryScheduler { tx }, handle)
    }

    /// Must only be called after the job's terminal write.
    pub fn schedule(&self, job_id: &str, after: Duration) {
        let expiry = Expiry {
            deadline: Instant::now() + after,
            job_id: job_id.to_string(),
        };
        if self.tx.send(expiry).is_err() {
            tracing::warn!(job_id, "expiry sweeper is gone, job will not be purged");
        }
    }
}

async fn run_sweeper(
    registry: Arc<JobRegistry>,
    mut rx: mpsc::UnboundedReceiver<Expiry>,
    shutdown: CancellationToken,
) {
    let mut heap: BinaryHeap<Reverse<(Instant, String)>> = BinaryHeap::new();
    let mut accepting = true;

    loop {
        let next = heap.peek().map(|Reverse((deadline, _))| *deadline);
        if !accepting && next.is_none() {
            break;
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = rx.recv(), if accepting => match received {
                Some(expiry) => heap.push(Reverse((expiry.deadline, expiry.job_id))),
                None => accepting = false,
            },
            _ = sleep_until(next.unwrap_or_else(Instant::now)), if next.is_some() => {
                let now = Instant::now();
                while let Some(Reverse((deadline, _))) = heap.peek() {
                    if *deadline > now {
                        break;
                    }
                    if let Some(Reverse((_, job_id))) = heap.pop() {
                        purge(&registry, &job_id).await;
                    }
                }
            }
        }
    }

    while let Ok(expiry) = rx.try_recv() {
        heap.push(Reverse((expiry.deadline, expiry.job_id)));
    }
    for Reverse((_, job_id)) in heap.into_vec() {
        purge(&registry, &job_id).await;
    }
    tracing::debug!("expiry sweeper stopped");
}

async fn purge(registry: &JobRegistry, job_id: &str) {
    let Some(job) = registry.delete(job_id).await else {
        return;
    };

    if let Some(output) = job.output() {
        match async_fs::remove_file(&output.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                job_id,
                path = %output.path.display(),
                error = %e,
                "failed to remove staged file"
            ),
        }
    }
    tracing::info!(job_id, status = ?job.status(), "job expired");
}
