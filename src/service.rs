//! Stage, preview and commit flow on top of the reconciler.
//!
//! A snapshot is fetched and archived once, stashed as a job, previewed as a
//! dry run and then committed. Every pass holds its region's lock.

use crate::error::{Result, SyncError};
use crate::feed::{fetch_observed, SourceFeed};
use crate::jobs::{JobStore, StagedJob};
use crate::locks::RegionLocks;
use crate::reconcile::{PassReport, Reconciler, RunOptions};
use crate::snapshots::{ArchiveFeed, SnapshotArchive};
use crate::storage::CatalogStore;
use crate::types::{ListingRecord, ListingStatus, Region};
use std::sync::Arc;
use tracing::{info, instrument};

pub struct SyncService {
    store: Arc<dyn CatalogStore>,
    reconciler: Reconciler,
    archive: Arc<SnapshotArchive>,
    jobs: JobStore,
    locks: RegionLocks,
}

impl SyncService {
    pub fn new(store: Arc<dyn CatalogStore>, archive: Arc<SnapshotArchive>, jobs: JobStore) -> Self {
        Self {
            reconciler: Reconciler::new(store.clone()),
            store,
            archive,
            jobs,
            locks: RegionLocks::new(),
        }
    }

    pub fn archive(&self) -> &Arc<SnapshotArchive> {
        &self.archive
    }

    /// Fetch a snapshot, archive it and hold it for review. The region's
    /// current generation only moves once the job is committed.
    #[instrument(skip(self, feed), fields(region = %region, feed = feed.name()))]
    pub async fn stage(&self, region: &Region, feed: &dyn SourceFeed) -> Result<Arc<StagedJob>> {
        let (snapshot, observed) = fetch_observed(feed, region).await?;
        let generation = self.archive.archive(&snapshot)?;
        self.jobs.evict_expired();
        let job = self.jobs.insert(StagedJob::new(
            region.clone(),
            generation,
            observed,
            snapshot.highlights(),
        ));
        info!(
            "Staged job {} with {} listings ({} rejected)",
            job.job_id,
            job.observed.len(),
            job.rejected_count()
        );
        Ok(job)
    }

    fn job(&self, job_id: &str) -> Result<Arc<StagedJob>> {
        self.jobs
            .get(job_id)
            .ok_or_else(|| SyncError::JobNotFound(job_id.to_string()))
    }

    /// Dry run of a staged job. The job stays available for commit.
    pub async fn preview(&self, job_id: &str) -> Result<PassReport> {
        let job = self.job(job_id)?;
        let _guard = self.locks.acquire(&job.region).await;
        self.reconciler
            .run(
                &job.region,
                &job.observed,
                RunOptions {
                    dry_run: true,
                    confirm_empty: true,
                },
            )
            .await
    }

    /// Apply a staged job to the catalog and make its generation current.
    ///
    /// The job is consumed once the pass completes. A pass refused before any
    /// write (unconfirmed empty snapshot, unreadable catalog) leaves it staged.
    #[instrument(skip(self))]
    pub async fn commit(&self, job_id: &str, confirm_empty: bool) -> Result<PassReport> {
        let region = self.job(job_id)?.region.clone();
        let _guard = self.locks.acquire(&region).await;
        // A concurrent commit of the same job may have consumed it while we waited
        let job = self.job(job_id)?;
        let report = self
            .reconciler
            .run(
                &job.region,
                &job.observed,
                RunOptions {
                    dry_run: false,
                    confirm_empty,
                },
            )
            .await?;
        self.jobs.remove(job_id);
        self.archive.set_current(&job.generation)?;
        info!("Committed job {}", job_id);
        Ok(report)
    }

    /// Fetch, archive and reconcile in one call without staging a job.
    /// A dry run archives nothing.
    #[instrument(skip(self, feed, options), fields(region = %region, feed = feed.name()))]
    pub async fn sync_region(
        &self,
        region: &Region,
        feed: &dyn SourceFeed,
        options: RunOptions,
    ) -> Result<PassReport> {
        let (snapshot, observed) = fetch_observed(feed, region).await?;
        let generation = if options.dry_run {
            None
        } else {
            Some(self.archive.archive(&snapshot)?)
        };
        let _guard = self.locks.acquire(region).await;
        let report = self.reconciler.run(region, &observed, options).await?;
        if let Some(generation) = generation {
            self.archive.set_current(&generation)?;
        }
        Ok(report)
    }

    /// Reconcile the region's last committed generation again
    pub async fn replay(&self, region: &Region, options: RunOptions) -> Result<PassReport> {
        let feed = ArchiveFeed::new(self.archive.clone());
        self.sync_region(region, &feed, options).await
    }

    /// Catalog rows for a region sorted by case number, optionally filtered by status
    pub async fn listings(
        &self,
        region: &Region,
        status: Option<ListingStatus>,
    ) -> Result<Vec<ListingRecord>> {
        let mut rows: Vec<ListingRecord> = self
            .store
            .list_region(region)
            .await?
            .into_iter()
            .filter(|row| status.map_or(true, |s| row.status == s))
            .collect();
        rows.sort_by(|a, b| a.case_number.cmp(&b.case_number));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedSnapshot;
    use crate::storage::InMemoryCatalog;
    use crate::types::RawListing;
    use async_trait::async_trait;
    use std::time::Duration;

    struct StaticFeed {
        listings: Vec<RawListing>,
    }

    #[async_trait]
    impl SourceFeed for StaticFeed {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch(&self, region: &Region) -> Result<FeedSnapshot> {
            Ok(FeedSnapshot::new("static", region.clone(), self.listings.clone()))
        }
    }

    fn listing(case_number: &str) -> RawListing {
        serde_json::from_value(serde_json::json!({
            "case_number": case_number,
            "address": "12 Elm St",
            "city": "Durham",
            "state": "NC",
            "zip_code": "27701",
            "price": 150000,
            "beds": 3,
            "baths": 2
        }))
        .unwrap()
    }

    fn service(dir: &std::path::Path) -> (SyncService, InMemoryCatalog) {
        let catalog = InMemoryCatalog::new();
        let archive = Arc::new(SnapshotArchive::open(dir).unwrap());
        let service = SyncService::new(
            Arc::new(catalog.clone()),
            archive,
            JobStore::new(Duration::from_secs(60), 8),
        );
        (service, catalog)
    }

    #[tokio::test]
    async fn preview_writes_nothing_and_commit_consumes_job() {
        let dir = tempfile::tempdir().unwrap();
        let (service, catalog) = service(dir.path());
        let nc = Region::parse("NC").unwrap();
        let feed = StaticFeed {
            listings: vec![listing("381-100001"), listing("381-100002")],
        };

        let job = service.stage(&nc, &feed).await.unwrap();
        let preview = service.preview(&job.job_id).await.unwrap();
        assert!(preview.dry_run);
        assert_eq!(preview.stats.new_count, 2);
        assert!(catalog.snapshot().unwrap().is_empty());

        let report = service.commit(&job.job_id, false).await.unwrap();
        assert_eq!(report.stats.new_count, 2);
        assert_eq!(catalog.snapshot().unwrap().len(), 2);

        assert!(matches!(
            service.commit(&job.job_id, false).await,
            Err(SyncError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn refused_empty_commit_keeps_job_staged() {
        let dir = tempfile::tempdir().unwrap();
        let (service, catalog) = service(dir.path());
        let nc = Region::parse("NC").unwrap();

        let full = StaticFeed {
            listings: vec![listing("381-100001")],
        };
        service
            .sync_region(&nc, &full, RunOptions::default())
            .await
            .unwrap();

        let empty = StaticFeed { listings: vec![] };
        let job = service.stage(&nc, &empty).await.unwrap();
        assert!(matches!(
            service.commit(&job.job_id, false).await,
            Err(SyncError::EmptySnapshot { at_risk: 1, .. })
        ));

        let report = service.commit(&job.job_id, true).await.unwrap();
        assert_eq!(report.stats.marked_under_contract_count, 1);
        let rows = service
            .listings(&nc, Some(ListingStatus::UnderContract))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(catalog.snapshot().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replay_ignores_uncommitted_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let (service, catalog) = service(dir.path());
        let nc = Region::parse("NC").unwrap();

        let committed = StaticFeed {
            listings: vec![listing("381-100001"), listing("381-100002")],
        };
        service
            .sync_region(&nc, &committed, RunOptions::default())
            .await
            .unwrap();

        // Staged and previewed, then declined
        let pending = StaticFeed {
            listings: vec![listing("381-100009")],
        };
        let job = service.stage(&nc, &pending).await.unwrap();
        service.preview(&job.job_id).await.unwrap();

        let report = service.replay(&nc, RunOptions::default()).await.unwrap();
        assert_eq!(report.stats.new_count, 0);
        assert_eq!(report.stats.marked_under_contract_count, 0);
        assert_eq!(report.stats.updated_count, 2);
        assert_eq!(catalog.snapshot().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn commit_moves_current_generation() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _catalog) = service(dir.path());
        let nc = Region::parse("NC").unwrap();
        let feed = StaticFeed {
            listings: vec![listing("381-100001")],
        };

        let job = service.stage(&nc, &feed).await.unwrap();
        assert!(service.archive().current(&nc).unwrap().is_none());

        service.commit(&job.job_id, false).await.unwrap();
        let current = service.archive().current(&nc).unwrap().unwrap();
        assert_eq!(current.generation_id, job.generation.generation_id);
    }

    #[tokio::test]
    async fn dry_run_sync_archives_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _catalog) = service(dir.path());
        let nc = Region::parse("NC").unwrap();
        let feed = StaticFeed {
            listings: vec![listing("381-100001")],
        };
        let options = RunOptions {
            dry_run: true,
            confirm_empty: false,
        };
        service.sync_region(&nc, &feed, options).await.unwrap();
        assert!(service.archive().history(&nc).unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_commits_apply_job_once() {
        let dir = tempfile::tempdir().unwrap();
        let (service, catalog) = service(dir.path());
        let nc = Region::parse("NC").unwrap();
        let feed = StaticFeed {
            listings: vec![listing("381-100001")],
        };
        let job = service.stage(&nc, &feed).await.unwrap();

        // Both commits find the job, then queue behind the region lock
        let guard = service.locks.acquire(&nc).await;
        let release = async move {
            tokio::task::yield_now().await;
            drop(guard);
        };
        let (first, second, ()) = tokio::join!(
            service.commit(&job.job_id, false),
            service.commit(&job.job_id, false),
            release
        );

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(SyncError::JobNotFound(_)))));
        let applied = outcomes.iter().find_map(|r| r.as_ref().ok()).unwrap();
        assert_eq!(applied.stats.new_count, 1);
        assert_eq!(applied.stats.error_count, 0);
        assert_eq!(catalog.snapshot().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn staged_job_counts_new_and_reduced_listings() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _catalog) = service(dir.path());
        let nc = Region::parse("NC").unwrap();

        let mut fresh = listing("381-100001");
        fresh.is_new_listing = true;
        let mut reduced = listing("381-100002");
        reduced.is_price_reduced = true;
        let feed = StaticFeed {
            listings: vec![fresh, reduced, listing("381-100003")],
        };

        let job = service.stage(&nc, &feed).await.unwrap();
        assert_eq!(job.highlights.new_listings, 1);
        assert_eq!(job.highlights.price_reduced, 1);
    }

    #[tokio::test]
    async fn preview_of_expired_job_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = InMemoryCatalog::new();
        let archive = Arc::new(SnapshotArchive::open(dir.path()).unwrap());
        let service = SyncService::new(
            Arc::new(catalog.clone()),
            archive,
            JobStore::new(Duration::ZERO, 8),
        );
        let nc = Region::parse("NC").unwrap();
        let feed = StaticFeed {
            listings: vec![listing("381-100001")],
        };

        let job = service.stage(&nc, &feed).await.unwrap();
        assert!(matches!(
            service.preview(&job.job_id).await,
            Err(SyncError::JobNotFound(_))
        ));
        assert!(catalog.snapshot().unwrap().is_empty());
    }
}
