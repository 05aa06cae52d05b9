use super::{FeedDocument, FeedSnapshot, SourceFeed};
use crate::error::{Result, SyncError};
use crate::types::Region;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads a scraper JSON export from disk
pub struct JsonFileFeed {
    path: PathBuf,
    name: String,
}

impl JsonFileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("file:{}", path.display());
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<FeedDocument> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| SyncError::Feed {
            message: format!("failed to read {}: {e}", self.path.display()),
        })?;
        debug!("Read {} bytes from {}", bytes.len(), self.path.display());
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Region named by the first listing in the file, for imports that don't specify one
    pub async fn detect_region(&self) -> Result<Region> {
        let document = self.load().await?;
        let code = document.first_region().ok_or_else(|| SyncError::Feed {
            message: format!("could not determine region from {}", self.path.display()),
        })?;
        Region::parse(&code)
    }
}

#[async_trait]
impl SourceFeed for JsonFileFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, region: &Region) -> Result<FeedSnapshot> {
        let listings = self.load().await?.into_region(region)?;
        Ok(FeedSnapshot::new(self.name.clone(), region.clone(), listings))
    }
}
