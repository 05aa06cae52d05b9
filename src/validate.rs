//! Turns scraped listings into validated observations at the feed boundary.

use crate::constants::{BID_DEADLINE_FORMAT, DEFAULT_PROPERTY_TYPE};
use crate::error::ValidationError;
use crate::types::{ListingObservation, Observed, RawListing, RawNumber, Region};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::warn;

static CASE_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+-\d+$").expect("valid regex"));

/// Validate one scraped listing for `region`
pub fn validate_listing(
    raw: &RawListing,
    region: &Region,
) -> Result<ListingObservation, ValidationError> {
    let case_number = required_text(&raw.case_number, "case_number")?;
    if !CASE_NUMBER_RE.is_match(&case_number) {
        return Err(ValidationError::Malformed {
            field: "case_number",
            reason: format!("'{case_number}' does not look like a case number (e.g. 381-123456)"),
        });
    }

    let address = required_text(&raw.address, "address")?;
    let city = required_text(&raw.city, "city")?;
    let state = required_text(&raw.state, "state")?;
    if !state.eq_ignore_ascii_case(region.as_str()) {
        return Err(ValidationError::RegionMismatch {
            expected: region.to_string(),
            found: state,
        });
    }
    let postal_code = required_text(&raw.zip_code, "zip_code")?;

    let price = required_number(&raw.price, "price")?;
    let beds = required_number(&raw.beds, "beds")?;
    if beds.fract() != 0.0 {
        return Err(ValidationError::Malformed {
            field: "beds",
            reason: format!("{beds} is not a whole number"),
        });
    }
    if beds > f64::from(u32::MAX) {
        return Err(ValidationError::Malformed {
            field: "beds",
            reason: format!("{beds} is out of range"),
        });
    }
    let baths = required_number(&raw.baths, "baths")?;

    Ok(ListingObservation {
        case_number,
        region: region.clone(),
        address,
        city,
        postal_code,
        county: optional_text(&raw.county).unwrap_or_default(),
        price,
        beds: beds as u32,
        baths,
        property_type: optional_text(&raw.property_type)
            .unwrap_or_else(|| DEFAULT_PROPERTY_TYPE.to_string()),
        bid_deadline: raw.bid_deadline.as_deref().and_then(parse_bid_deadline),
    })
}

/// Parse a feed bid deadline; anything unparseable is dropped rather than failing the listing
pub fn parse_bid_deadline(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(text, BID_DEADLINE_FORMAT).ok()
}

/// Validate a whole snapshot, flagging repeated case numbers after their first occurrence
pub fn validate_snapshot(raws: &[RawListing], region: &Region) -> Vec<Observed> {
    let mut seen: HashSet<String> = HashSet::new();
    raws.iter()
        .map(|raw| {
            let case_number = optional_text(&raw.case_number);
            if let Some(cn) = &case_number {
                if !seen.insert(cn.clone()) {
                    warn!(case_number = %cn, "Duplicate case number in snapshot");
                    return Observed::Rejected {
                        case_number: Some(cn.clone()),
                        error: ValidationError::DuplicateCaseNumber(cn.clone()),
                    };
                }
            }
            match validate_listing(raw, region) {
                Ok(listing) => Observed::Valid(listing),
                Err(error) => {
                    warn!(
                        case_number = case_number.as_deref().unwrap_or("unknown"),
                        "Rejected listing: {}", error
                    );
                    Observed::Rejected { case_number, error }
                }
            }
        })
        .collect()
}

fn optional_text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required_text(value: &Option<String>, field: &'static str) -> Result<String, ValidationError> {
    optional_text(value).ok_or(ValidationError::MissingField(field))
}

fn required_number(value: &Option<RawNumber>, field: &'static str) -> Result<f64, ValidationError> {
    let raw = value.as_ref().ok_or(ValidationError::MissingField(field))?;
    if let RawNumber::Text(text) = raw {
        if text.trim().is_empty() {
            return Err(ValidationError::MissingField(field));
        }
    }
    let number = raw
        .to_f64()
        .map_err(|reason| ValidationError::Malformed { field, reason })?;
    if !number.is_finite() || number < 0.0 {
        return Err(ValidationError::Malformed {
            field,
            reason: format!("{number} must be a non-negative number"),
        });
    }
    Ok(number)
}
