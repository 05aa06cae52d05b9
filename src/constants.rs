/// Listing and feed constants shared across the crate

// Status values as stored in the catalog
pub const STATUS_AVAILABLE: &str = "AVAILABLE";
pub const STATUS_UNDER_CONTRACT: &str = "UNDER_CONTRACT";

// Older rows were written with a space instead of an underscore
pub const STATUS_UNDER_CONTRACT_LEGACY: &str = "UNDER CONTRACT";

/// Format of the optional bid deadline in scraped feeds (e.g. 01/15/2026)
pub const BID_DEADLINE_FORMAT: &str = "%m/%d/%Y";

/// Property type assumed when the feed does not provide one
pub const DEFAULT_PROPERTY_TYPE: &str = "Single Family";

/// Default config file name, overridable with HUD_SYNC_CONFIG
pub const DEFAULT_CONFIG_FILE: &str = "hud_sync.toml";

/// US state codes and names accepted as regions
pub const US_STATES: &[(&str, &str)] = &[
    ("AL", "Alabama"),
    ("AK", "Alaska"),
    ("AZ", "Arizona"),
    ("AR", "Arkansas"),
    ("CA", "California"),
    ("CO", "Colorado"),
    ("CT", "Connecticut"),
    ("DE", "Delaware"),
    ("FL", "Florida"),
    ("GA", "Georgia"),
    ("HI", "Hawaii"),
    ("ID", "Idaho"),
    ("IL", "Illinois"),
    ("IN", "Indiana"),
    ("IA", "Iowa"),
    ("KS", "Kansas"),
    ("KY", "Kentucky"),
    ("LA", "Louisiana"),
    ("ME", "Maine"),
    ("MD", "Maryland"),
    ("MA", "Massachusetts"),
    ("MI", "Michigan"),
    ("MN", "Minnesota"),
    ("MS", "Mississippi"),
    ("MO", "Missouri"),
    ("MT", "Montana"),
    ("NE", "Nebraska"),
    ("NV", "Nevada"),
    ("NH", "New Hampshire"),
    ("NJ", "New Jersey"),
    ("NM", "New Mexico"),
    ("NY", "New York"),
    ("NC", "North Carolina"),
    ("ND", "North Dakota"),
    ("OH", "Ohio"),
    ("OK", "Oklahoma"),
    ("OR", "Oregon"),
    ("PA", "Pennsylvania"),
    ("RI", "Rhode Island"),
    ("SC", "South Carolina"),
    ("SD", "South Dakota"),
    ("TN", "Tennessee"),
    ("TX", "Texas"),
    ("UT", "Utah"),
    ("VT", "Vermont"),
    ("VA", "Virginia"),
    ("WA", "Washington"),
    ("WV", "West Virginia"),
    ("WI", "Wisconsin"),
    ("WY", "Wyoming"),
];

/// Full state name for a region code, if it is a known US state
pub fn state_name(code: &str) -> Option<&'static str> {
    US_STATES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}
