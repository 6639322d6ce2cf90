use async_trait::async_trait;
use reqwest::Client;

use crate::{
    error::ProviderError,
    types::{InvidiousSearchItem, SourceDescriptor},
};

use super::SourceProvider;

const PROVIDER: &str = "invidious";

/// Searches YouTube through Invidious mirrors, trying each instance in order
/// until one returns a video.
pub struct InvidiousSearch {
    http: Client,
    instances: Vec<String>,
}

impl InvidiousSearch {
    pub fn new(http: Client, instances: Vec<String>) -> Self {
        InvidiousSearch { http, instances }
    }

    async fn search_instance(
        &self,
        instance: &str,
        query: &str,
    ) -> Result<SourceDescriptor, ProviderError> {
        let res = self
            .http
            .get(format!("{instance}/api/v1/search"))
            .query(&[("q", query), ("type", "video")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| ProviderError::Http {
                provider: PROVIDER.to_string(),
                source,
            })?;

        let items: Vec<InvidiousSearchItem> =
            res.json().await.map_err(|e| ProviderError::Malformed {
                provider: PROVIDER.to_string(),
                detail: format!("{instance}: {e}"),
            })?;

        items
            .into_iter()
            .filter(|item| item.kind.as_deref().is_none_or(|k| k == "video"))
            .find_map(|item| item.video_id.filter(|id| !id.is_empty()))
            .map(|video_id| SourceDescriptor {
                provider: PROVIDER.to_string(),
                url: format!("https://www.youtube.com/watch?v={video_id}"),
            })
            .ok_or_else(|| ProviderError::Empty {
                provider: PROVIDER.to_string(),
                query: query.to_string(),
            })
    }
}

#[async_trait]
impl SourceProvider for InvidiousSearch {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn find(&self, query: &str) -> Result<SourceDescriptor, ProviderError> {
        let query = format!("{query} audio");
        let mut last_error = ProviderError::Malformed {
            provider: PROVIDER.to_string(),
            detail: "no instances configured".to_string(),
        };

        for instance in &self.instances {
            match self.search_instance(instance, &query).await {
                Ok(source) => return Ok(source),
                Err(e) => {
                    tracing::debug!(instance, error = %e, "invidious instance failed");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}
