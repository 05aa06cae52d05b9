use super::CatalogStore;
use crate::error::{Result, SyncError};
use crate::types::{ListingRecord, ListingStatus, Region};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS listings (
        region         TEXT NOT NULL,
        case_number    TEXT NOT NULL,
        address        TEXT NOT NULL,
        city           TEXT NOT NULL,
        postal_code    TEXT NOT NULL,
        county         TEXT NOT NULL DEFAULT '',
        price          REAL NOT NULL,
        beds           INTEGER NOT NULL,
        baths          REAL NOT NULL,
        property_type  TEXT NOT NULL,
        status         TEXT NOT NULL,
        bid_deadline   TEXT,
        listing_date   TEXT NOT NULL,
        created_at     TEXT NOT NULL,
        updated_at     TEXT NOT NULL,
        PRIMARY KEY (region, case_number)
    );
    CREATE INDEX IF NOT EXISTS idx_listings_region ON listings(region);
"#;

const SELECT_COLUMNS: &str = "region, case_number, address, city, postal_code, county, price, beds, \
     baths, property_type, status, bid_deadline, listing_date, created_at, updated_at";

/// SQLite-backed listing catalog
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        info!("Opened listing catalog at {}", db_path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SyncError::Store("catalog connection lock poisoned".to_string()))
    }
}

/// Column values exactly as stored, before date and status parsing
struct StoredRow {
    region: String,
    case_number: String,
    address: String,
    city: String,
    postal_code: String,
    county: String,
    price: f64,
    beds: i64,
    baths: f64,
    property_type: String,
    status: String,
    bid_deadline: Option<String>,
    listing_date: String,
    created_at: String,
    updated_at: String,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            region: row.get(0)?,
            case_number: row.get(1)?,
            address: row.get(2)?,
            city: row.get(3)?,
            postal_code: row.get(4)?,
            county: row.get(5)?,
            price: row.get(6)?,
            beds: row.get(7)?,
            baths: row.get(8)?,
            property_type: row.get(9)?,
            status: row.get(10)?,
            bid_deadline: row.get(11)?,
            listing_date: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    fn into_record(self) -> Result<ListingRecord> {
        let bid_deadline = match self.bid_deadline.as_deref() {
            Some(text) => Some(NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|e| {
                SyncError::Store(format!("bad bid_deadline '{text}' for {}: {e}", self.case_number))
            })?),
            None => None,
        };
        Ok(ListingRecord {
            region: Region::parse(&self.region)?,
            status: self.status.parse()?,
            bid_deadline,
            listing_date: parse_timestamp(&self.listing_date)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            beds: u32::try_from(self.beds).map_err(|_| {
                SyncError::Store(format!("bad beds value {} for {}", self.beds, self.case_number))
            })?,
            case_number: self.case_number,
            address: self.address,
            city: self.city,
            postal_code: self.postal_code,
            county: self.county,
            price: self.price,
            baths: self.baths,
            property_type: self.property_type,
        })
    }
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::Store(format!("bad timestamp '{text}': {e}")))
}

fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn list_region(&self, region: &Region) -> Result<Vec<ListingRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM listings WHERE region = ?1 ORDER BY case_number"
        ))?;
        let rows = stmt.query_map(params![region.as_str()], StoredRow::from_row)?;
        let mut listings = Vec::new();
        for row in rows {
            listings.push(row?.into_record()?);
        }
        debug!("Loaded {} listings for {}", listings.len(), region);
        Ok(listings)
    }

    async fn get_listing(&self, region: &Region, case_number: &str) -> Result<Option<ListingRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM listings WHERE region = ?1 AND case_number = ?2"
                ),
                params![region.as_str(), case_number],
                StoredRow::from_row,
            )
            .optional()?;
        row.map(StoredRow::into_record).transpose()
    }

    async fn insert_listing(&self, listing: &ListingRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO listings (region, case_number, address, city, postal_code, county, price,
                 beds, baths, property_type, status, bid_deadline, listing_date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                listing.region.as_str(),
                listing.case_number,
                listing.address,
                listing.city,
                listing.postal_code,
                listing.county,
                listing.price,
                listing.beds as i64,
                listing.baths,
                listing.property_type,
                listing.status.as_str(),
                format_date(listing.bid_deadline),
                listing.listing_date.to_rfc3339(),
                listing.created_at.to_rfc3339(),
                listing.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn update_listing(&self, listing: &ListingRecord) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE listings SET address = ?3, city = ?4, postal_code = ?5, county = ?6, price = ?7,
                 beds = ?8, baths = ?9, property_type = ?10, status = ?11, bid_deadline = ?12,
                 updated_at = ?13
             WHERE region = ?1 AND case_number = ?2",
            params![
                listing.region.as_str(),
                listing.case_number,
                listing.address,
                listing.city,
                listing.postal_code,
                listing.county,
                listing.price,
                listing.beds as i64,
                listing.baths,
                listing.property_type,
                listing.status.as_str(),
                format_date(listing.bid_deadline),
                listing.updated_at.to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(SyncError::Store(format!(
                "cannot update missing listing {} in {}",
                listing.case_number, listing.region
            )));
        }
        Ok(())
    }

    async fn set_status(
        &self,
        region: &Region,
        case_number: &str,
        status: ListingStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE listings SET status = ?3, updated_at = ?4 WHERE region = ?1 AND case_number = ?2",
            params![region.as_str(), case_number, status.as_str(), updated_at.to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(SyncError::Store(format!(
                "cannot set status of missing listing {case_number} in {region}"
            )));
        }
        Ok(())
    }
}
