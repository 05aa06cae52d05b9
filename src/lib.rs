pub mod config;
pub mod constants;
pub mod error;
pub mod feed;
pub mod jobs;
pub mod locks;
pub mod logging;
pub mod metrics;
pub mod reconcile;
pub mod service;
pub mod snapshots;
pub mod storage;
pub mod types;
pub mod validate;

pub use error::{Result, SyncError, ValidationError};
pub use reconcile::{reconcile, PassReport, Reconciler, ReconciliationStats, RunOptions, WriteIntent};
pub use storage::{CatalogStore, InMemoryCatalog, SqliteCatalog};
pub use types::{ListingObservation, ListingRecord, ListingStatus, Observed, RawListing, Region};
