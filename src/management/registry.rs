use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::{
    error::RegistryError,
    types::{Job, JobView},
};

/// In-memory table of every job the service currently knows about.
///
/// A job's entry is written by exactly two parties: its own worker while the
/// job runs, and the expiry sweeper once the worker has made its terminal
/// write. Readers get a cloned snapshot.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, id: &str, track_ref: &str) -> Result<Job, RegistryError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(id) {
            return Err(RegistryError::AlreadyExists(id.to_string()));
        }

        let job = Job::new(id.to_string(), track_ref.to_string());
        jobs.insert(id.to_string(), job.clone());
        Ok(job)
    }

    pub async fn get(&self, id: &str) -> Option<Job> {
        self.jobs.read().await.get(id).cloned()
    }

    pub async fn view(&self, id: &str) -> Option<JobView> {
        self.jobs.read().await.get(id).map(JobView::from)
    }

    /// Applies `f` to the job under the write lock.
    pub async fn update<T, F>(&self, id: &str, f: F) -> Result<T, RegistryError>
    where
        F: FnOnce(&mut Job) -> Result<T, RegistryError>,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        f(job)
    }

    pub async fn delete(&self, id: &str) -> Option<Job> {
        self.jobs.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
