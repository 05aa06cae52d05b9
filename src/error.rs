use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid region code '{0}': expected a two-letter code such as NC")]
    InvalidRegion(String),

    #[error("Catalog store error: {0}")]
    Store(String),

    #[error(
        "Snapshot for {region} names no usable case number but {at_risk} listings are still \
         AVAILABLE; confirm the empty snapshot to mark them UNDER_CONTRACT"
    )]
    EmptySnapshot { region: String, at_risk: usize },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Feed error: {message}")]
    Feed { message: String },
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Why a single observed listing was rejected. Counted per item, never fatal to a pass.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("malformed {field}: {reason}")]
    Malformed { field: &'static str, reason: String },

    #[error("listing belongs to region {found}, expected {expected}")]
    RegionMismatch { expected: String, found: String },

    #[error("case number {0} appears more than once in this snapshot")]
    DuplicateCaseNumber(String),
}
