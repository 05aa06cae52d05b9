use crate::constants::{STATUS_AVAILABLE, STATUS_UNDER_CONTRACT, STATUS_UNDER_CONTRACT_LEGACY};
use crate::error::{Result, SyncError, ValidationError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Two-letter region code (a US state or territory) scoping feeds and catalog passes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Region(String);

impl Region {
    pub fn parse(code: &str) -> Result<Self> {
        let code = code.trim().to_ascii_uppercase();
        if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(SyncError::InvalidRegion(code));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Region {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self> {
        Region::parse(&value)
    }
}

impl From<Region> for String {
    fn from(region: Region) -> Self {
        region.0
    }
}

/// Lifecycle status of a catalog listing. Rows are never deleted, so there is no deleted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    Available,
    #[serde(alias = "UNDER CONTRACT")]
    UnderContract,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Available => STATUS_AVAILABLE,
            ListingStatus::UnderContract => STATUS_UNDER_CONTRACT,
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            STATUS_AVAILABLE => Ok(ListingStatus::Available),
            STATUS_UNDER_CONTRACT | STATUS_UNDER_CONTRACT_LEGACY => Ok(ListingStatus::UnderContract),
            other => Err(SyncError::Store(format!("unknown listing status '{other}'"))),
        }
    }
}

/// A numeric field as scraped: either a JSON number or text such as "$125,000"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Number(f64),
    Text(String),
}

impl RawNumber {
    pub fn to_f64(&self) -> std::result::Result<f64, String> {
        match self {
            RawNumber::Number(n) => Ok(*n),
            RawNumber::Text(text) => {
                let cleaned: String = text
                    .trim()
                    .chars()
                    .filter(|c| !matches!(c, '$' | ',' | ' '))
                    .collect();
                cleaned
                    .parse::<f64>()
                    .map_err(|_| format!("'{text}' is not a number"))
            }
        }
    }
}

/// One listing exactly as a source feed delivered it; nothing is guaranteed present
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    pub case_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub county: Option<String>,
    pub price: Option<RawNumber>,
    pub beds: Option<RawNumber>,
    pub baths: Option<RawNumber>,
    pub property_type: Option<String>,
    pub bid_deadline: Option<String>,
    #[serde(default)]
    pub is_new_listing: bool,
    #[serde(default)]
    pub is_price_reduced: bool,
}

/// A validated listing observed in the current snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingObservation {
    pub case_number: String,
    pub region: Region,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub county: String,
    pub price: f64,
    pub beds: u32,
    pub baths: f64,
    pub property_type: String,
    pub bid_deadline: Option<NaiveDate>,
}

/// What the reconciler receives for each item of a snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Valid(ListingObservation),
    Rejected {
        case_number: Option<String>,
        error: ValidationError,
    },
}

impl Observed {
    pub fn case_number(&self) -> Option<&str> {
        match self {
            Observed::Valid(listing) => Some(&listing.case_number),
            Observed::Rejected { case_number, .. } => case_number.as_deref(),
        }
    }
}

/// A row of the listing catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub case_number: String,
    pub region: Region,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub county: String,
    pub price: f64,
    pub beds: u32,
    pub baths: f64,
    pub property_type: String,
    pub status: ListingStatus,
    pub bid_deadline: Option<NaiveDate>,
    pub listing_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ListingRecord {
    /// Build a brand-new catalog row from an observation
    pub fn new_from_observation(observation: &ListingObservation, now: DateTime<Utc>) -> Self {
        Self {
            case_number: observation.case_number.clone(),
            region: observation.region.clone(),
            address: observation.address.clone(),
            city: observation.city.clone(),
            postal_code: observation.postal_code.clone(),
            county: observation.county.clone(),
            price: observation.price,
            beds: observation.beds,
            baths: observation.baths,
            property_type: observation.property_type.clone(),
            status: ListingStatus::Available,
            bid_deadline: observation.bid_deadline,
            listing_date: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy of this row with descriptive fields refreshed from an observation.
    /// Status and bookkeeping fields are left to the caller.
    pub fn refreshed_from(&self, observation: &ListingObservation) -> Self {
        Self {
            address: observation.address.clone(),
            city: observation.city.clone(),
            postal_code: observation.postal_code.clone(),
            county: observation.county.clone(),
            price: observation.price,
            beds: observation.beds,
            baths: observation.baths,
            property_type: observation.property_type.clone(),
            bid_deadline: observation.bid_deadline,
            ..self.clone()
        }
    }
}
