//! Source location: finding something the download tool can fetch for a
//! resolved track.
//!
//! Providers are tried in their configured order. A provider failing, coming
//! back empty or running out of time only moves the locator on to the next
//! one; the job fails only once every provider has been tried, and then with
//! the last provider's diagnostic.

mod invidious;
mod ytdlp;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use tokio::time::{Instant, timeout};

use crate::{
    config::ServiceConfig,
    error::{JobError, ProviderError},
    types::SourceDescriptor,
};

pub use invidious::InvidiousSearch;
pub use ytdlp::YtDlpSearch;

/// One way of turning a search query into a downloadable source.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Searches for `query` (`"<artist> - <title>"`). Implementations shape
    /// the query as their backend needs. Dropping the returned future must
    /// abandon any work in flight.
    async fn find(&self, query: &str) -> Result<SourceDescriptor, ProviderError>;
}

pub struct SourceLocator {
    providers: Vec<Arc<dyn SourceProvider>>,
    attempt_timeout: Duration,
    total_timeout: Duration,
}

impl SourceLocator {
    pub fn new(
        providers: Vec<Arc<dyn SourceProvider>>,
        attempt_timeout: Duration,
        total_timeout: Duration,
    ) -> Self {
        SourceLocator {
            providers,
            attempt_timeout,
            total_timeout,
        }
    }

    /// Builds the provider chain named by `source_providers`.
    pub fn from_config(config: &ServiceConfig, http: Client) -> Self {
        let providers = config
            .source_providers
            .iter()
            .filter_map(|name| -> Option<Arc<dyn SourceProvider>> {
                match name.as_str() {
                    "youtube" => Some(Arc::new(YtDlpSearch::youtube(&config.ytdlp_bin))),
                    "soundcloud" => Some(Arc::new(YtDlpSearch::soundcloud(&config.ytdlp_bin))),
                    "invidious" => Some(Arc::new(InvidiousSearch::new(
                        http.clone(),
                        config.invidious_instances.clone(),
                    ))),
                    other => {
                        tracing::warn!(provider = other, "unknown source provider, skipping");
                        None
                    }
                }
            })
            .collect();

        Self::new(providers, config.provider_timeout, config.locate_timeout)
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Returns the first provider's success. Providers after the winning one
    /// are never invoked.
    pub async fn locate(&self, query: &str) -> Result<SourceDescriptor, JobError> {
        let deadline = Instant::now() + self.total_timeout;
        let mut last_error: Option<String> = None;

        for provider in &self.providers {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                last_error = Some(format!(
                    "search budget of {} seconds exhausted",
                    self.total_timeout.as_secs()
                ));
                break;
            }
            let budget = remaining.min(self.attempt_timeout);

            let error = match timeout(budget, provider.find(query)).await {
                Ok(Ok(source)) => {
                    tracing::info!(provider = provider.name(), url = %source.url, "located audio source");
                    return Ok(source);
                }
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout {
                    provider: provider.name().to_string(),
                    timeout: budget,
                },
            };

            tracing::warn!(provider = provider.name(), error = %error, "source provider failed");
            last_error = Some(error.to_string());
        }

        Err(JobError::SourceNotFound(
            last_error.unwrap_or_else(|| "no source providers configured".to_string()),
        ))
    }
}
