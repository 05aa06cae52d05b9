use super::{FeedDocument, FeedSnapshot, SourceFeed};
use crate::config::FeedConfig;
use crate::error::{Result, SyncError};
use crate::types::Region;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Fetches listings from an HTTP endpoint serving scraper output as JSON
pub struct HttpFeed {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFeed {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn listings_url(&self, region: &Region) -> String {
        format!("{}/listings?state={}", self.base_url, region)
    }
}

#[async_trait]
impl SourceFeed for HttpFeed {
    fn name(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self))]
    async fn fetch(&self, region: &Region) -> Result<FeedSnapshot> {
        let url = self.listings_url(region);
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Feed {
                message: format!("{url} returned {status}: {}", body.chars().take(200).collect::<String>()),
            });
        }

        let document: FeedDocument = response.json().await?;
        let listings = document.into_region(region)?;
        Ok(FeedSnapshot::new(self.base_url.clone(), region.clone(), listings))
    }
}
