use super::CatalogStore;
use crate::error::{Result, SyncError};
use crate::types::{ListingRecord, ListingStatus, Region};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

type CatalogKey = (Region, String);

/// In-memory catalog for development, dry experiments and tests
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    listings: Arc<Mutex<HashMap<CatalogKey, ListingRecord>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-populated with existing rows
    pub fn with_listings(listings: impl IntoIterator<Item = ListingRecord>) -> Self {
        let map = listings
            .into_iter()
            .map(|l| ((l.region.clone(), l.case_number.clone()), l))
            .collect();
        Self {
            listings: Arc::new(Mutex::new(map)),
        }
    }

    /// Every row across all regions, sorted by region then case number
    pub fn snapshot(&self) -> Result<Vec<ListingRecord>> {
        let listings = self.lock()?;
        let mut rows: Vec<ListingRecord> = listings.values().cloned().collect();
        rows.sort_by(|a, b| (&a.region, &a.case_number).cmp(&(&b.region, &b.case_number)));
        Ok(rows)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<CatalogKey, ListingRecord>>> {
        self.listings
            .lock()
            .map_err(|_| SyncError::Store("in-memory catalog lock poisoned".to_string()))
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn list_region(&self, region: &Region) -> Result<Vec<ListingRecord>> {
        let listings = self.lock()?;
        let mut rows: Vec<ListingRecord> = listings
            .values()
            .filter(|l| &l.region == region)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.case_number.cmp(&b.case_number));
        Ok(rows)
    }

    async fn get_listing(&self, region: &Region, case_number: &str) -> Result<Option<ListingRecord>> {
        let listings = self.lock()?;
        Ok(listings
            .get(&(region.clone(), case_number.to_string()))
            .cloned())
    }

    async fn insert_listing(&self, listing: &ListingRecord) -> Result<()> {
        let mut listings = self.lock()?;
        let key = (listing.region.clone(), listing.case_number.clone());
        if listings.contains_key(&key) {
            return Err(SyncError::Store(format!(
                "listing {} already exists in {}",
                listing.case_number, listing.region
            )));
        }
        listings.insert(key, listing.clone());
        debug!("Inserted listing {} ({})", listing.case_number, listing.region);
        Ok(())
    }

    async fn update_listing(&self, listing: &ListingRecord) -> Result<()> {
        let mut listings = self.lock()?;
        let key = (listing.region.clone(), listing.case_number.clone());
        let existing = listings.get_mut(&key).ok_or_else(|| {
            SyncError::Store(format!(
                "cannot update missing listing {} in {}",
                listing.case_number, listing.region
            ))
        })?;
        let created_at = existing.created_at;
        let listing_date = existing.listing_date;
        *existing = ListingRecord {
            created_at,
            listing_date,
            ..listing.clone()
        };
        debug!("Updated listing {} ({})", listing.case_number, listing.region);
        Ok(())
    }

    async fn set_status(
        &self,
        region: &Region,
        case_number: &str,
        status: ListingStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut listings = self.lock()?;
        let existing = listings
            .get_mut(&(region.clone(), case_number.to_string()))
            .ok_or_else(|| {
                SyncError::Store(format!(
                    "cannot set status of missing listing {case_number} in {region}"
                ))
            })?;
        existing.status = status;
        existing.updated_at = updated_at;
        debug!("Set listing {} ({}) to {}", case_number, region, status);
        Ok(())
    }
}
