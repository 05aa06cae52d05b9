use crate::error::{Result, SyncError};
use crate::metrics::FeedMetrics;
use crate::types::{Observed, RawListing, Region};
use crate::validate::validate_snapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

pub mod file;
pub mod http;

pub use file::JsonFileFeed;
pub use http::HttpFeed;

/// Everything one feed returned for one region at one point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub feed: String,
    pub region: Region,
    pub captured_at: DateTime<Utc>,
    pub listings: Vec<RawListing>,
}

impl FeedSnapshot {
    pub fn new(feed: impl Into<String>, region: Region, listings: Vec<RawListing>) -> Self {
        Self {
            feed: feed.into(),
            region,
            captured_at: Utc::now(),
            listings,
        }
    }

    /// Validate every listing for this snapshot's region
    pub fn observed(&self) -> Vec<Observed> {
        validate_snapshot(&self.listings, &self.region)
    }

    pub fn highlights(&self) -> SnapshotHighlights {
        SnapshotHighlights {
            new_listings: self.listings.iter().filter(|l| l.is_new_listing).count(),
            price_reduced: self.listings.iter().filter(|l| l.is_price_reduced).count(),
        }
    }
}

/// Listings the feed itself flags as new or price-reduced, shown at review
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotHighlights {
    pub new_listings: usize,
    pub price_reduced: usize,
}

/// A source of listing snapshots for a region
#[async_trait]
pub trait SourceFeed: Send + Sync {
    /// Identifier used in logs, metrics and archived snapshots
    fn name(&self) -> &str;

    async fn fetch(&self, region: &Region) -> Result<FeedSnapshot>;
}

/// Fetch a snapshot and validate it, recording feed metrics
#[instrument(skip(feed), fields(feed = feed.name(), region = %region))]
pub async fn fetch_observed(
    feed: &dyn SourceFeed,
    region: &Region,
) -> Result<(FeedSnapshot, Vec<Observed>)> {
    let started = Instant::now();
    let snapshot = match feed.fetch(region).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("Failed to fetch snapshot: {}", e);
            FeedMetrics::record_fetch_error(feed.name());
            return Err(e);
        }
    };
    FeedMetrics::record_fetch_success(
        feed.name(),
        snapshot.listings.len(),
        started.elapsed().as_secs_f64(),
    );

    let observed = snapshot.observed();
    let rejected = observed
        .iter()
        .filter(|o| matches!(o, Observed::Rejected { .. }))
        .count();
    if rejected > 0 {
        warn!("{} of {} listings failed validation", rejected, observed.len());
        FeedMetrics::record_rejected_items(feed.name(), rejected);
    }
    info!("Fetched {} listings for {}", snapshot.listings.len(), region);
    Ok((snapshot, observed))
}

/// Shapes a feed document may take: a bare list, a wrapped list, or lists keyed by region
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum FeedDocument {
    List(Vec<RawListing>),
    Wrapped { listings: Vec<RawListing> },
    ByRegion(HashMap<String, Vec<RawListing>>),
}

impl FeedDocument {
    pub(crate) fn into_region(self, region: &Region) -> Result<Vec<RawListing>> {
        match self {
            FeedDocument::List(listings) | FeedDocument::Wrapped { listings } => Ok(listings),
            FeedDocument::ByRegion(mut by_region) => {
                let key = by_region
                    .keys()
                    .find(|k| k.eq_ignore_ascii_case(region.as_str()))
                    .cloned();
                key.and_then(|k| by_region.remove(&k))
                    .ok_or_else(|| SyncError::Feed {
                        message: format!("feed document has no listings for {region}"),
                    })
            }
        }
    }

    /// Region of the first listing that names one
    pub(crate) fn first_region(&self) -> Option<String> {
        match self {
            FeedDocument::List(listings) | FeedDocument::Wrapped { listings } => {
                listings.iter().find_map(|l| l.state.clone())
            }
            FeedDocument::ByRegion(by_region) => {
                let mut keys: Vec<&String> = by_region.keys().collect();
                keys.sort();
                keys.first().map(|k| k.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nc() -> Region {
        Region::parse("NC").unwrap()
    }

    #[test]
    fn bare_list_document() {
        let doc: FeedDocument =
            serde_json::from_value(json!([{ "case_number": "381-1", "state": "NC" }])).unwrap();
        assert_eq!(doc.first_region().as_deref(), Some("NC"));
        assert_eq!(doc.into_region(&nc()).unwrap().len(), 1);
    }

    #[test]
    fn wrapped_document() {
        let doc: FeedDocument =
            serde_json::from_value(json!({ "listings": [{ "case_number": "381-1" }] })).unwrap();
        assert_eq!(doc.into_region(&nc()).unwrap().len(), 1);
    }

    #[test]
    fn by_region_document_selects_region() {
        let doc: FeedDocument = serde_json::from_value(json!({
            "nc": [{ "case_number": "381-1" }, { "case_number": "381-2" }],
            "SC": [{ "case_number": "461-1" }]
        }))
        .unwrap();
        assert_eq!(doc.into_region(&nc()).unwrap().len(), 2);
    }

    #[test]
    fn by_region_document_without_region_is_an_error() {
        let doc: FeedDocument =
            serde_json::from_value(json!({ "SC": [{ "case_number": "461-1" }] })).unwrap();
        assert!(matches!(doc.into_region(&nc()), Err(SyncError::Feed { .. })));
    }

    #[test]
    fn numbers_may_arrive_as_text() {
        let doc: FeedDocument = serde_json::from_value(json!([{
            "case_number": "381-1",
            "price": "$100,000",
            "beds": 3,
            "baths": "2.5"
        }]))
        .unwrap();
        let listings = doc.into_region(&nc()).unwrap();
        assert_eq!(listings[0].price.as_ref().unwrap().to_f64().unwrap(), 100000.0);
        assert_eq!(listings[0].baths.as_ref().unwrap().to_f64().unwrap(), 2.5);
    }
}
