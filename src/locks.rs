use crate::types::Region;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// One lock per region so at most one reconciliation pass runs per region at a time.
/// Passes for different regions do not block each other.
#[derive(Default)]
pub struct RegionLocks {
    locks: Mutex<HashMap<Region, Arc<AsyncMutex<()>>>>,
}

impl RegionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, region: &Region) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(region.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Wait for exclusive access to a region; released when the guard drops
    pub async fn acquire(&self, region: &Region) -> OwnedMutexGuard<()> {
        let lock = self.lock_for(region);
        debug!("Waiting for region lock {}", region);
        lock.lock_owned().await
    }

    /// Exclusive access if no pass currently holds the region
    pub fn try_acquire(&self, region: &Region) -> Option<OwnedMutexGuard<()>> {
        self.lock_for(region).try_lock_owned().ok()
    }
}
