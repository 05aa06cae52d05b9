//! Reconciliation of an observed listing snapshot against the catalog.
//!
//! A pass has two phases. Phase 1 walks the observed items in order: new case
//! numbers are inserted as `AVAILABLE`, known ones are refreshed, and rows that
//! were `UNDER_CONTRACT` are restored to `AVAILABLE`. Phase 2 sweeps every
//! catalog row whose case number was not seen and marks it `UNDER_CONTRACT`.
//! Rows are never deleted.

use crate::error::{Result, SyncError};
use crate::metrics::ReconcileMetrics;
use crate::storage::CatalogStore;
use crate::types::{ListingRecord, ListingStatus, Observed, Region};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Why a write was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteReason {
    New,
    Refreshed,
    Restored,
    MarkedUnderContract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriteKind {
    Insert,
    Update,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WritePayload {
    Insert(ListingRecord),
    Update(ListingRecord),
    SetStatus {
        status: ListingStatus,
        updated_at: DateTime<Utc>,
    },
}

/// One store write produced by a pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteIntent {
    pub case_number: String,
    pub reason: WriteReason,
    pub payload: WritePayload,
}

impl WriteIntent {
    pub fn kind(&self) -> WriteKind {
        match self.payload {
            WritePayload::Insert(_) => WriteKind::Insert,
            WritePayload::Update(_) | WritePayload::SetStatus { .. } => WriteKind::Update,
        }
    }

    /// Status the row has once this write lands
    pub fn resulting_status(&self) -> ListingStatus {
        match &self.payload {
            WritePayload::Insert(record) | WritePayload::Update(record) => record.status,
            WritePayload::SetStatus { status, .. } => *status,
        }
    }

    /// Inserts, restores and sweeps change catalog state; refreshes only touch `updated_at`
    /// and descriptive fields.
    pub fn changes_status(&self) -> bool {
        !matches!(self.reason, WriteReason::Refreshed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationStats {
    pub total_observed: usize,
    pub new_count: usize,
    pub updated_count: usize,
    pub restored_count: usize,
    pub marked_under_contract_count: usize,
    pub error_count: usize,
}

impl ReconciliationStats {
    pub fn record(&mut self, reason: WriteReason) {
        match reason {
            WriteReason::New => self.new_count += 1,
            WriteReason::Refreshed => self.updated_count += 1,
            WriteReason::Restored => {
                self.updated_count += 1;
                self.restored_count += 1;
            }
            WriteReason::MarkedUnderContract => self.marked_under_contract_count += 1,
        }
    }
}

/// Writes and statistics computed for one pass, before anything is persisted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationResult {
    pub region: Region,
    pub writes: Vec<WriteIntent>,
    pub stats: ReconciliationStats,
}

/// Compute the writes that bring `existing` in line with `observed`.
///
/// Pure: nothing is persisted. `existing` must hold every catalog row for
/// `region`, keyed by case number. Statistics assume every write succeeds.
pub fn reconcile(
    region: &Region,
    observed: &[Observed],
    existing: &HashMap<String, ListingRecord>,
    now: DateTime<Utc>,
) -> ReconciliationResult {
    let mut stats = ReconciliationStats {
        total_observed: observed.len(),
        ..Default::default()
    };
    let mut writes = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    // Phase 1: observed listings, in feed order
    for item in observed {
        let listing = match item {
            Observed::Valid(listing) => listing,
            Observed::Rejected { case_number, error } => {
                // A listing still present in the feed must not be swept, even with bad data
                if let Some(cn) = case_number {
                    seen.insert(cn.as_str());
                }
                debug!(case_number = case_number.as_deref().unwrap_or("unknown"), "Skipping rejected listing: {}", error);
                stats.error_count += 1;
                continue;
            }
        };

        if &listing.region != region {
            warn!(case_number = %listing.case_number, "Listing belongs to {} not {}", listing.region, region);
            stats.error_count += 1;
            continue;
        }
        if !seen.insert(listing.case_number.as_str()) {
            warn!(case_number = %listing.case_number, "Duplicate case number in snapshot");
            stats.error_count += 1;
            continue;
        }

        let intent = match existing.get(&listing.case_number) {
            None => WriteIntent {
                case_number: listing.case_number.clone(),
                reason: WriteReason::New,
                payload: WritePayload::Insert(ListingRecord::new_from_observation(listing, now)),
            },
            Some(current) => {
                let mut record = current.refreshed_from(listing);
                record.updated_at = now.max(current.updated_at);
                let reason = match current.status {
                    ListingStatus::UnderContract => {
                        record.status = ListingStatus::Available;
                        WriteReason::Restored
                    }
                    ListingStatus::Available => WriteReason::Refreshed,
                };
                WriteIntent {
                    case_number: listing.case_number.clone(),
                    reason,
                    payload: WritePayload::Update(record),
                }
            }
        };
        stats.record(intent.reason);
        writes.push(intent);
    }

    // Phase 2: sweep rows absent from this snapshot
    let mut absent: Vec<&ListingRecord> = existing
        .iter()
        .filter(|(case_number, _)| !seen.contains(case_number.as_str()))
        .map(|(_, record)| record)
        .filter(|record| record.status != ListingStatus::UnderContract)
        .collect();
    absent.sort_by(|a, b| a.case_number.cmp(&b.case_number));

    for record in absent {
        let intent = WriteIntent {
            case_number: record.case_number.clone(),
            reason: WriteReason::MarkedUnderContract,
            payload: WritePayload::SetStatus {
                status: ListingStatus::UnderContract,
                updated_at: now.max(record.updated_at),
            },
        };
        stats.record(intent.reason);
        writes.push(intent);
    }

    ReconciliationResult {
        region: region.clone(),
        writes,
        stats,
    }
}

/// Case numbers Phase 1 would mark as seen: valid items of this region plus
/// rejected items that still carry a case number
pub fn seen_case_numbers(region: &Region, observed: &[Observed]) -> usize {
    observed
        .iter()
        .filter_map(|item| match item {
            Observed::Valid(listing) if &listing.region == region => Some(listing.case_number.as_str()),
            Observed::Valid(_) => None,
            Observed::Rejected { case_number, .. } => case_number.as_deref(),
        })
        .collect::<HashSet<&str>>()
        .len()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Compute writes and statistics but persist nothing
    pub dry_run: bool,
    /// Allow a snapshot with no usable case numbers to sweep a region that still has AVAILABLE rows
    pub confirm_empty: bool,
}

/// A write the store rejected during a pass
#[derive(Debug, Clone, Serialize)]
pub struct FailedWrite {
    pub case_number: String,
    pub reason: WriteReason,
    pub error: String,
}

/// Outcome of a store-backed pass
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub region: Region,
    pub dry_run: bool,
    pub stats: ReconciliationStats,
    /// Writes that were persisted, or that would have been in a dry run
    pub writes: Vec<WriteIntent>,
    pub failed_writes: Vec<FailedWrite>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u128,
}

/// Runs reconciliation passes against a catalog store
pub struct Reconciler {
    store: Arc<dyn CatalogStore>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("store", &"<Arc<dyn CatalogStore>>")
            .finish()
    }
}

impl Reconciler {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Reconcile `observed` against the stored rows for `region`.
    ///
    /// Fails before issuing any write if the existing rows cannot be read or an
    /// unconfirmed snapshot without a single usable case number would sweep
    /// AVAILABLE rows. Once writes begin the pass always runs to the end;
    /// failed writes are counted as errors.
    /// Callers must not run two passes for the same region concurrently.
    #[instrument(skip(self, observed, options), fields(region = %region, observed = observed.len()))]
    pub async fn run(
        &self,
        region: &Region,
        observed: &[Observed],
        options: RunOptions,
    ) -> Result<PassReport> {
        let started = Instant::now();
        let started_at = Utc::now();

        let existing: HashMap<String, ListingRecord> = match self.store.list_region(region).await {
            Ok(rows) => rows
                .into_iter()
                .filter(|row| &row.region == region)
                .map(|row| (row.case_number.clone(), row))
                .collect(),
            Err(e) => {
                error!("Failed to read existing listings for {}: {}", region, e);
                ReconcileMetrics::record_pass_failed(region.as_str());
                return Err(e);
            }
        };
        info!("Found {} existing listings for {}", existing.len(), region);

        if !options.confirm_empty && seen_case_numbers(region, observed) == 0 {
            let at_risk = existing
                .values()
                .filter(|row| row.status == ListingStatus::Available)
                .count();
            if at_risk > 0 {
                warn!(
                    "Refusing to sweep {} AVAILABLE listings in {}: snapshot of {} items names no usable case number",
                    at_risk,
                    region,
                    observed.len()
                );
                ReconcileMetrics::record_pass_failed(region.as_str());
                return Err(SyncError::EmptySnapshot {
                    region: region.to_string(),
                    at_risk,
                });
            }
        }

        let plan = reconcile(region, observed, &existing, started_at);

        let (stats, writes, failed_writes) = if options.dry_run {
            (plan.stats, plan.writes, Vec::new())
        } else {
            self.apply(region, plan).await
        };

        let report = PassReport {
            region: region.clone(),
            dry_run: options.dry_run,
            stats,
            writes,
            failed_writes,
            started_at,
            duration_ms: started.elapsed().as_millis(),
        };
        log_summary(&report);
        ReconcileMetrics::record_pass(region.as_str(), &report.stats, report.dry_run, started.elapsed().as_secs_f64());
        Ok(report)
    }

    async fn apply(
        &self,
        region: &Region,
        plan: ReconciliationResult,
    ) -> (ReconciliationStats, Vec<WriteIntent>, Vec<FailedWrite>) {
        let mut stats = ReconciliationStats {
            total_observed: plan.stats.total_observed,
            error_count: plan.stats.error_count,
            ..Default::default()
        };
        let mut applied = Vec::with_capacity(plan.writes.len());
        let mut failed = Vec::new();

        for intent in plan.writes {
            let result = match &intent.payload {
                WritePayload::Insert(record) => self.store.insert_listing(record).await,
                WritePayload::Update(record) => self.store.update_listing(record).await,
                WritePayload::SetStatus { status, updated_at } => {
                    self.store
                        .set_status(region, &intent.case_number, *status, *updated_at)
                        .await
                }
            };

            match result {
                Ok(()) => {
                    match intent.reason {
                        WriteReason::New => info!("Inserted new listing: {}", intent.case_number),
                        WriteReason::Restored => info!(
                            "Restored {} from UNDER_CONTRACT to AVAILABLE",
                            intent.case_number
                        ),
                        WriteReason::MarkedUnderContract => info!(
                            "Marked {} as UNDER_CONTRACT (not in snapshot)",
                            intent.case_number
                        ),
                        WriteReason::Refreshed => debug!("Updated listing: {}", intent.case_number),
                    }
                    stats.record(intent.reason);
                    applied.push(intent);
                }
                Err(e) => {
                    error!("Error writing listing {}: {}", intent.case_number, e);
                    stats.error_count += 1;
                    failed.push(FailedWrite {
                        case_number: intent.case_number.clone(),
                        reason: intent.reason,
                        error: e.to_string(),
                    });
                }
            }
        }

        (stats, applied, failed)
    }
}

fn log_summary(report: &PassReport) {
    let stats = &report.stats;
    info!(
        region = %report.region,
        total_observed = stats.total_observed,
        new = stats.new_count,
        updated = stats.updated_count,
        restored = stats.restored_count,
        marked_under_contract = stats.marked_under_contract_count,
        errors = stats.error_count,
        dry_run = report.dry_run,
        duration_ms = report.duration_ms as u64,
        "Reconciliation pass finished"
    );
    if report.dry_run {
        info!("DRY RUN - no changes were written to the catalog");
    }
}
