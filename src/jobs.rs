//! Staged snapshots waiting for review and commit.
//!
//! Entries expire after a TTL and the table is bounded; the oldest entry is
//! evicted first when it is full.

use crate::feed::SnapshotHighlights;
use crate::snapshots::Generation;
use crate::types::{Observed, Region};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// A fetched and validated snapshot waiting to be reconciled
#[derive(Debug)]
pub struct StagedJob {
    pub job_id: String,
    pub region: Region,
    pub generation: Generation,
    pub observed: Vec<Observed>,
    pub highlights: SnapshotHighlights,
    pub staged_at: DateTime<Utc>,
}

impl StagedJob {
    pub fn new(
        region: Region,
        generation: Generation,
        observed: Vec<Observed>,
        highlights: SnapshotHighlights,
    ) -> Self {
        let staged_at = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        let job_id = format!(
            "{}_{}_{}",
            region,
            staged_at.format("%Y%m%d_%H%M%S"),
            &suffix[..8]
        );
        Self {
            job_id,
            region,
            generation,
            observed,
            highlights,
            staged_at,
        }
    }

    pub fn rejected_count(&self) -> usize {
        self.observed
            .iter()
            .filter(|o| matches!(o, Observed::Rejected { .. }))
            .count()
    }
}

struct Entry {
    job: Arc<StagedJob>,
    inserted: Instant,
}

pub struct JobStore {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, Entry>>,
}

impl JobStore {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, job: StagedJob) -> Arc<StagedJob> {
        self.insert_at(job, Instant::now())
    }

    fn insert_at(&self, job: StagedJob, now: Instant) -> Arc<StagedJob> {
        let mut entries = self.entries();
        Self::evict(&mut entries, self.ttl, now);

        while entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    debug!("Job table full, evicting {}", id);
                    entries.remove(&id);
                }
                None => break,
            }
        }

        let job = Arc::new(job);
        entries.insert(
            job.job_id.clone(),
            Entry {
                job: job.clone(),
                inserted: now,
            },
        );
        job
    }

    /// A live job, or None if unknown or expired
    pub fn get(&self, job_id: &str) -> Option<Arc<StagedJob>> {
        self.get_at(job_id, Instant::now())
    }

    fn get_at(&self, job_id: &str, now: Instant) -> Option<Arc<StagedJob>> {
        let mut entries = self.entries();
        Self::evict(&mut entries, self.ttl, now);
        entries.get(job_id).map(|e| e.job.clone())
    }

    pub fn remove(&self, job_id: &str) -> Option<Arc<StagedJob>> {
        self.entries().remove(job_id).map(|e| e.job)
    }

    /// Drop expired jobs, returning how many were removed
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.entries();
        Self::evict(&mut entries, self.ttl, Instant::now())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict(entries: &mut HashMap<String, Entry>, ttl: Duration, now: Instant) -> usize {
        let before = entries.len();
        entries.retain(|_, e| now.saturating_duration_since(e.inserted) < ttl);
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Evicted {} expired jobs", removed);
        }
        removed
    }
}
