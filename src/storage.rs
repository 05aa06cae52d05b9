use crate::error::Result;
use crate::types::{ListingRecord, ListingStatus, Region};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryCatalog;
pub use sqlite::SqliteCatalog;

/// Keyed persistent store for catalog listings.
///
/// Rows are keyed by (region, case number). There is no delete operation:
/// listings that leave the feed change status instead of disappearing.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All rows currently stored for a region
    async fn list_region(&self, region: &Region) -> Result<Vec<ListingRecord>>;

    async fn get_listing(&self, region: &Region, case_number: &str) -> Result<Option<ListingRecord>>;

    /// Insert a new row. Fails if the key already exists.
    async fn insert_listing(&self, listing: &ListingRecord) -> Result<()>;

    /// Overwrite descriptive fields, status and `updated_at` of an existing row.
    /// `created_at` and `listing_date` are never changed by an update.
    async fn update_listing(&self, listing: &ListingRecord) -> Result<()>;

    async fn set_status(
        &self,
        region: &Region,
        case_number: &str,
        status: ListingStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;
}
