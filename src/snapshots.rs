//! Archive of fetched snapshots with an explicit per-region pointer to the
//! current generation. The latest snapshot is found through
//! `current_generation`, never by file name ordering.

use crate::error::{Result, SyncError};
use crate::feed::{FeedSnapshot, SourceFeed};
use crate::types::Region;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// Metadata for one archived snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Generation {
    pub generation_id: String,
    pub region: Region,
    pub feed: String,
    pub file: PathBuf,
    pub sha256: String,
    pub listing_count: usize,
    pub captured_at: DateTime<Utc>,
}

type GenerationColumns = (String, String, String, String, String, i64, String);

impl Generation {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<GenerationColumns> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    }

    fn from_columns(
        (generation_id, region, feed, file, sha256, listing_count, captured_at): GenerationColumns,
    ) -> Result<Self> {
        Ok(Self {
            generation_id,
            region: Region::parse(&region)?,
            feed,
            file: PathBuf::from(file),
            sha256,
            listing_count: listing_count.max(0) as usize,
            captured_at: DateTime::parse_from_rfc3339(&captured_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| SyncError::Store(format!("bad captured_at '{captured_at}': {e}")))?,
        })
    }
}

const GENERATION_COLUMNS: &str =
    "g.generation_id, g.region, g.feed, g.file, g.sha256, g.listing_count, g.captured_at";

pub struct SnapshotArchive {
    root: PathBuf,
    conn: Mutex<Connection>,
}

impl SnapshotArchive {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let conn = Connection::open(root.join("generations.db"))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS snapshot_generations (
                generation_id  TEXT PRIMARY KEY,
                region         TEXT NOT NULL,
                feed           TEXT NOT NULL,
                file           TEXT NOT NULL,
                sha256         TEXT NOT NULL,
                listing_count  INTEGER NOT NULL,
                captured_at    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_generations_region ON snapshot_generations(region);
            CREATE TABLE IF NOT EXISTS current_generation (
                region         TEXT PRIMARY KEY,
                generation_id  TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            root,
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SyncError::Store("snapshot archive lock poisoned".to_string()))
    }

    /// Archive a snapshot as a generation without making it current.
    ///
    /// If the region already has a generation with identical listings, that
    /// generation is returned and nothing new is written.
    pub fn archive(&self, snapshot: &FeedSnapshot) -> Result<Generation> {
        let sha256 = content_hash(snapshot)?;

        if let Some(existing) = self.find_by_hash(&snapshot.region, &sha256)? {
            debug!(
                "Snapshot for {} matches archived generation {}",
                snapshot.region, existing.generation_id
            );
            return Ok(existing);
        }

        let generation_id = Uuid::new_v4().to_string();
        let region_dir = self.root.join(snapshot.region.as_str());
        std::fs::create_dir_all(&region_dir)?;
        let file = region_dir.join(format!("{generation_id}.json"));
        std::fs::write(&file, serde_json::to_vec_pretty(snapshot)?)?;

        let generation = Generation {
            generation_id,
            region: snapshot.region.clone(),
            feed: snapshot.feed.clone(),
            file,
            sha256,
            listing_count: snapshot.listings.len(),
            captured_at: snapshot.captured_at,
        };

        self.conn()?.execute(
            "INSERT INTO snapshot_generations
                 (generation_id, region, feed, file, sha256, listing_count, captured_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                generation.generation_id,
                generation.region.as_str(),
                generation.feed,
                generation.file.to_string_lossy(),
                generation.sha256,
                generation.listing_count as i64,
                generation.captured_at.to_rfc3339(),
            ],
        )?;

        info!(
            "Archived {} listings for {} as generation {}",
            generation.listing_count, generation.region, generation.generation_id
        );
        Ok(generation)
    }

    /// Point the region at a generation once its pass has been applied
    pub fn set_current(&self, generation: &Generation) -> Result<()> {
        let changed = self.conn()?.execute(
            "INSERT INTO current_generation (region, generation_id)
             SELECT region, generation_id FROM snapshot_generations WHERE generation_id = ?1
             ON CONFLICT(region) DO UPDATE SET generation_id = excluded.generation_id",
            params![generation.generation_id],
        )?;
        if changed == 0 {
            return Err(SyncError::Store(format!(
                "unknown snapshot generation {}",
                generation.generation_id
            )));
        }
        debug!(
            "Current generation for {} is now {}",
            generation.region, generation.generation_id
        );
        Ok(())
    }

    fn find_by_hash(&self, region: &Region, sha256: &str) -> Result<Option<Generation>> {
        let conn = self.conn()?;
        let columns = conn
            .query_row(
                &format!(
                    "SELECT {GENERATION_COLUMNS} FROM snapshot_generations g
                     WHERE g.region = ?1 AND g.sha256 = ?2
                     ORDER BY g.captured_at DESC LIMIT 1"
                ),
                params![region.as_str(), sha256],
                Generation::from_row,
            )
            .optional()?;
        columns.map(Generation::from_columns).transpose()
    }

    pub fn current(&self, region: &Region) -> Result<Option<Generation>> {
        let conn = self.conn()?;
        let columns = conn
            .query_row(
                &format!(
                    "SELECT {GENERATION_COLUMNS} FROM current_generation c
                     JOIN snapshot_generations g ON g.generation_id = c.generation_id
                     WHERE c.region = ?1"
                ),
                params![region.as_str()],
                Generation::from_row,
            )
            .optional()?;
        columns.map(Generation::from_columns).transpose()
    }

    /// All generations for a region, newest first
    pub fn history(&self, region: &Region) -> Result<Vec<Generation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {GENERATION_COLUMNS} FROM snapshot_generations g
             WHERE g.region = ?1 ORDER BY g.captured_at DESC"
        ))?;
        let rows = stmt.query_map(params![region.as_str()], Generation::from_row)?;
        let mut generations = Vec::new();
        for row in rows {
            generations.push(Generation::from_columns(row?)?);
        }
        Ok(generations)
    }

    pub fn load(&self, generation: &Generation) -> Result<FeedSnapshot> {
        let bytes = std::fs::read(&generation.file)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn load_current(&self, region: &Region) -> Result<Option<FeedSnapshot>> {
        match self.current(region)? {
            Some(generation) => self.load(&generation).map(Some),
            None => Ok(None),
        }
    }
}

fn content_hash(snapshot: &FeedSnapshot) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(snapshot.region.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(serde_json::to_vec(&snapshot.listings)?);
    Ok(hex::encode(hasher.finalize()))
}

/// Replays the current archived generation of a region
pub struct ArchiveFeed {
    archive: Arc<SnapshotArchive>,
}

impl ArchiveFeed {
    pub fn new(archive: Arc<SnapshotArchive>) -> Self {
        Self { archive }
    }
}

#[async_trait]
impl SourceFeed for ArchiveFeed {
    fn name(&self) -> &str {
        "archive"
    }

    async fn fetch(&self, region: &Region) -> Result<FeedSnapshot> {
        self.archive
            .load_current(region)?
            .ok_or_else(|| SyncError::Feed {
                message: format!("no archived snapshot for {region}"),
            })
    }
}
