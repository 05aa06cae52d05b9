use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hud_sync::storage::CatalogStore;
use hud_sync::validate::validate_snapshot;
use hud_sync::{
    InMemoryCatalog, ListingRecord, ListingStatus, RawListing, Reconciler, Region, RunOptions,
    SyncError,
};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn nc() -> Region {
    Region::parse("NC").unwrap()
}

fn raw(case_number: &str) -> RawListing {
    serde_json::from_value(json!({
        "case_number": case_number,
        "address": "1 Oak St",
        "city": "Raleigh",
        "state": "NC",
        "zip_code": "27601",
        "price": 100000,
        "beds": 3,
        "baths": 2,
        "bid_deadline": "03/15/2026"
    }))
    .unwrap()
}

fn statuses(catalog: &InMemoryCatalog) -> BTreeMap<String, ListingStatus> {
    catalog
        .snapshot()
        .unwrap()
        .into_iter()
        .map(|r| (r.case_number, r.status))
        .collect()
}

async fn seed(catalog: &InMemoryCatalog, case_numbers: &[&str]) {
    let reconciler = Reconciler::new(Arc::new(catalog.clone()));
    let raws: Vec<RawListing> = case_numbers.iter().map(|cn| raw(cn)).collect();
    reconciler
        .run(&nc(), &validate_snapshot(&raws, &nc()), RunOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn scenario_a_new_listing_is_inserted() -> Result<()> {
    let catalog = InMemoryCatalog::new();
    let reconciler = Reconciler::new(Arc::new(catalog.clone()));

    let observed = validate_snapshot(&[raw("381-123456")], &nc());
    let report = reconciler.run(&nc(), &observed, RunOptions::default()).await?;

    assert_eq!(report.stats.total_observed, 1);
    assert_eq!(report.stats.new_count, 1);
    assert_eq!(report.stats.updated_count, 0);
    assert_eq!(report.stats.restored_count, 0);
    assert_eq!(report.stats.marked_under_contract_count, 0);
    assert_eq!(report.stats.error_count, 0);

    let rows = catalog.snapshot()?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, ListingStatus::Available);
    assert_eq!(rows[0].created_at, rows[0].listing_date);
    assert_eq!(
        rows[0].bid_deadline.map(|d| d.to_string()).as_deref(),
        Some("2026-03-15")
    );
    Ok(())
}

#[tokio::test]
async fn scenario_b_confirmed_empty_snapshot_sweeps_region() -> Result<()> {
    let catalog = InMemoryCatalog::new();
    seed(&catalog, &["381-123456"]).await;
    let reconciler = Reconciler::new(Arc::new(catalog.clone()));

    let report = reconciler
        .run(
            &nc(),
            &[],
            RunOptions {
                dry_run: false,
                confirm_empty: true,
            },
        )
        .await?;

    assert_eq!(report.writes.len(), 1);
    assert_eq!(report.stats.marked_under_contract_count, 1);
    assert_eq!(report.stats.new_count, 0);
    assert_eq!(statuses(&catalog)["381-123456"], ListingStatus::UnderContract);
    Ok(())
}

#[tokio::test]
async fn unconfirmed_empty_snapshot_is_refused_without_writes() {
    let catalog = InMemoryCatalog::new();
    seed(&catalog, &["381-123456", "381-654321"]).await;
    let before = catalog.snapshot().unwrap();
    let reconciler = Reconciler::new(Arc::new(catalog.clone()));

    let result = reconciler.run(&nc(), &[], RunOptions::default()).await;
    assert!(matches!(
        result,
        Err(SyncError::EmptySnapshot { at_risk: 2, .. })
    ));
    assert_eq!(catalog.snapshot().unwrap(), before);
}

#[tokio::test]
async fn snapshot_without_usable_case_numbers_needs_confirmation() -> Result<()> {
    let catalog = InMemoryCatalog::new();
    seed(&catalog, &["381-000001", "381-000002"]).await;
    let before = catalog.snapshot()?;
    let reconciler = Reconciler::new(Arc::new(catalog.clone()));

    // Feed renamed its key, so nothing carries a case number we can read
    let renamed: Vec<RawListing> = serde_json::from_value(json!([
        { "caseNumber": "381-000001", "state": "NC" },
        { "caseNumber": "381-000002", "state": "NC" }
    ]))?;
    let observed = validate_snapshot(&renamed, &nc());

    let refused = reconciler.run(&nc(), &observed, RunOptions::default()).await;
    assert!(matches!(
        refused,
        Err(SyncError::EmptySnapshot { at_risk: 2, .. })
    ));
    assert_eq!(catalog.snapshot()?, before);

    let confirmed = reconciler
        .run(
            &nc(),
            &observed,
            RunOptions {
                dry_run: false,
                confirm_empty: true,
            },
        )
        .await?;
    assert_eq!(confirmed.stats.error_count, 2);
    assert_eq!(confirmed.stats.marked_under_contract_count, 2);
    Ok(())
}

#[tokio::test]
async fn empty_snapshot_for_empty_region_is_fine() -> Result<()> {
    let reconciler = Reconciler::new(Arc::new(InMemoryCatalog::new()));
    let report = reconciler.run(&nc(), &[], RunOptions::default()).await?;
    assert!(report.writes.is_empty());
    Ok(())
}

#[tokio::test]
async fn scenario_c_reappearing_listing_is_restored() -> Result<()> {
    let catalog = InMemoryCatalog::new();
    seed(&catalog, &["381-123456", "381-000001"]).await;
    seed(&catalog, &["381-000001"]).await;
    assert_eq!(statuses(&catalog)["381-123456"], ListingStatus::UnderContract);

    let reconciler = Reconciler::new(Arc::new(catalog.clone()));
    let observed = validate_snapshot(&[raw("381-123456"), raw("381-000001")], &nc());
    let report = reconciler.run(&nc(), &observed, RunOptions::default()).await?;

    assert_eq!(report.stats.restored_count, 1);
    assert_eq!(report.stats.updated_count, 2);
    assert_eq!(statuses(&catalog)["381-123456"], ListingStatus::Available);
    Ok(())
}

#[tokio::test]
async fn scenario_d_item_missing_price_is_skipped() -> Result<()> {
    let catalog = InMemoryCatalog::new();
    let reconciler = Reconciler::new(Arc::new(catalog.clone()));

    let mut broken = raw("381-000002");
    broken.price = None;
    let observed = validate_snapshot(&[raw("381-000001"), broken, raw("381-000003")], &nc());
    let report = reconciler.run(&nc(), &observed, RunOptions::default()).await?;

    assert_eq!(report.stats.total_observed, 3);
    assert_eq!(report.stats.error_count, 1);
    assert_eq!(report.stats.new_count, 2);
    assert!(report.writes.iter().all(|w| w.case_number != "381-000002"));
    assert_eq!(catalog.snapshot()?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn second_identical_pass_changes_no_status() -> Result<()> {
    let catalog = InMemoryCatalog::new();
    seed(&catalog, &["381-000001", "381-000002", "381-000003"]).await;
    let reconciler = Reconciler::new(Arc::new(catalog.clone()));
    let observed = validate_snapshot(&[raw("381-000001"), raw("381-000003")], &nc());

    let first = reconciler.run(&nc(), &observed, RunOptions::default()).await?;
    assert_eq!(first.stats.marked_under_contract_count, 1);

    let second = reconciler.run(&nc(), &observed, RunOptions::default()).await?;
    assert!(second.writes.iter().all(|w| !w.changes_status()));
    assert_eq!(second.stats.new_count, 0);
    assert_eq!(second.stats.restored_count, 0);
    assert_eq!(second.stats.marked_under_contract_count, 0);
    Ok(())
}

#[tokio::test]
async fn status_follows_presence_and_nothing_is_deleted() -> Result<()> {
    let catalog = InMemoryCatalog::new();
    seed(&catalog, &["381-000001", "381-000002", "381-000003"]).await;
    seed(&catalog, &["381-000002"]).await;
    let before: BTreeSet<String> = statuses(&catalog).into_keys().collect();

    let reconciler = Reconciler::new(Arc::new(catalog.clone()));
    let present = ["381-000001", "381-000004"];
    let raws: Vec<RawListing> = present.iter().map(|cn| raw(cn)).collect();
    reconciler
        .run(&nc(), &validate_snapshot(&raws, &nc()), RunOptions::default())
        .await?;

    let after = statuses(&catalog);
    let after_keys: BTreeSet<String> = after.keys().cloned().collect();
    assert!(after_keys.is_superset(&before));
    for (case_number, status) in &after {
        let expected = if present.contains(&case_number.as_str()) {
            ListingStatus::Available
        } else {
            ListingStatus::UnderContract
        };
        assert_eq!(*status, expected, "{case_number}");
    }
    Ok(())
}

#[tokio::test]
async fn dry_run_reports_writes_but_persists_nothing() -> Result<()> {
    let catalog = InMemoryCatalog::new();
    seed(&catalog, &["381-000001"]).await;
    let before = catalog.snapshot()?;
    let reconciler = Reconciler::new(Arc::new(catalog.clone()));

    let observed = validate_snapshot(&[raw("381-000002")], &nc());
    let report = reconciler
        .run(
            &nc(),
            &observed,
            RunOptions {
                dry_run: true,
                confirm_empty: false,
            },
        )
        .await?;

    assert!(report.dry_run);
    assert_eq!(report.stats.new_count, 1);
    assert_eq!(report.stats.marked_under_contract_count, 1);
    assert_eq!(report.writes.len(), 2);
    assert_eq!(catalog.snapshot()?, before);
    Ok(())
}

/// Store that fails every write for one case number and can fail region reads
struct FlakyStore {
    inner: InMemoryCatalog,
    failing_case: &'static str,
    fail_reads: AtomicBool,
}

#[async_trait]
impl CatalogStore for FlakyStore {
    async fn list_region(&self, region: &Region) -> hud_sync::Result<Vec<ListingRecord>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SyncError::Store("connection reset".into()));
        }
        self.inner.list_region(region).await
    }

    async fn get_listing(
        &self,
        region: &Region,
        case_number: &str,
    ) -> hud_sync::Result<Option<ListingRecord>> {
        self.inner.get_listing(region, case_number).await
    }

    async fn insert_listing(&self, listing: &ListingRecord) -> hud_sync::Result<()> {
        if listing.case_number == self.failing_case {
            return Err(SyncError::Store("write timeout".into()));
        }
        self.inner.insert_listing(listing).await
    }

    async fn update_listing(&self, listing: &ListingRecord) -> hud_sync::Result<()> {
        if listing.case_number == self.failing_case {
            return Err(SyncError::Store("write timeout".into()));
        }
        self.inner.update_listing(listing).await
    }

    async fn set_status(
        &self,
        region: &Region,
        case_number: &str,
        status: ListingStatus,
        updated_at: DateTime<Utc>,
    ) -> hud_sync::Result<()> {
        if case_number == self.failing_case {
            return Err(SyncError::Store("write timeout".into()));
        }
        self.inner
            .set_status(region, case_number, status, updated_at)
            .await
    }
}

#[tokio::test]
async fn failed_write_is_counted_and_pass_continues() -> Result<()> {
    let inner = InMemoryCatalog::new();
    let store = Arc::new(FlakyStore {
        inner: inner.clone(),
        failing_case: "381-000002",
        fail_reads: AtomicBool::new(false),
    });
    let reconciler = Reconciler::new(store);

    let raws = [raw("381-000001"), raw("381-000002"), raw("381-000003")];
    let report = reconciler
        .run(&nc(), &validate_snapshot(&raws, &nc()), RunOptions::default())
        .await?;

    assert_eq!(report.stats.new_count, 2);
    assert_eq!(report.stats.error_count, 1);
    assert_eq!(report.failed_writes.len(), 1);
    assert_eq!(report.failed_writes[0].case_number, "381-000002");
    assert_eq!(inner.snapshot()?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn unreadable_catalog_fails_pass_before_writing() {
    let inner = InMemoryCatalog::new();
    let store = Arc::new(FlakyStore {
        inner: inner.clone(),
        failing_case: "",
        fail_reads: AtomicBool::new(true),
    });
    let reconciler = Reconciler::new(store);

    let result = reconciler
        .run(
            &nc(),
            &validate_snapshot(&[raw("381-000001")], &nc()),
            RunOptions::default(),
        )
        .await;

    assert!(matches!(result, Err(SyncError::Store(_))));
    assert!(inner.snapshot().unwrap().is_empty());
}

#[tokio::test]
async fn failed_restore_is_not_counted_as_restored() -> Result<()> {
    let inner = InMemoryCatalog::new();
    seed(&inner, &["381-000001", "381-000002"]).await;
    seed(&inner, &["381-000002"]).await;
    assert_eq!(statuses(&inner)["381-000001"], ListingStatus::UnderContract);

    let reconciler = Reconciler::new(Arc::new(FlakyStore {
        inner: inner.clone(),
        failing_case: "381-000001",
        fail_reads: AtomicBool::new(false),
    }));
    let raws = [raw("381-000001"), raw("381-000002")];
    let report = reconciler
        .run(&nc(), &validate_snapshot(&raws, &nc()), RunOptions::default())
        .await?;

    assert_eq!(report.stats.restored_count, 0);
    assert_eq!(report.stats.updated_count, 1);
    assert_eq!(report.stats.error_count, 1);
    assert_eq!(report.failed_writes.len(), 1);
    assert_eq!(statuses(&inner)["381-000001"], ListingStatus::UnderContract);
    Ok(())
}

#[tokio::test]
async fn failed_sweep_is_not_counted_as_marked() -> Result<()> {
    let inner = InMemoryCatalog::new();
    seed(&inner, &["381-000001", "381-000002"]).await;

    let reconciler = Reconciler::new(Arc::new(FlakyStore {
        inner: inner.clone(),
        failing_case: "381-000001",
        fail_reads: AtomicBool::new(false),
    }));
    let report = reconciler
        .run(
            &nc(),
            &validate_snapshot(&[raw("381-000002")], &nc()),
            RunOptions::default(),
        )
        .await?;

    assert_eq!(report.stats.marked_under_contract_count, 0);
    assert_eq!(report.stats.updated_count, 1);
    assert_eq!(report.stats.error_count, 1);
    assert_eq!(report.failed_writes[0].case_number, "381-000001");
    assert_eq!(statuses(&inner)["381-000001"], ListingStatus::Available);
    Ok(())
}
