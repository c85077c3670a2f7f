//! Durable queue of not-yet-synced activities.
//!
//! The queue is a single JSON document per installation. Every mutation is a
//! read-modify-write of the whole document, serialized behind one async
//! mutex so concurrent appends and the sync drain never overwrite each
//! other. Reads tolerate a missing or corrupt file and report it as empty.

mod document;
mod files;


use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::core::ActivityEvent;

pub use document::{StoreDocument, StoreMetadata, STORE_SCHEMA_VERSION};
pub use files::{FileAccess, MemoryFileAccess, TokioFileAccess};

pub const STORE_DIR_NAME: &str = "activity";
pub const STORE_FILE_NAME: &str = "user-activities.json";
pub const DEFAULT_MAX_QUEUED_EVENTS: usize = 10_000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Range filter for reading the queue. `limit` keeps the newest matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityQuery {
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub limit: Option<usize>,
}

impl ActivityQuery {
    pub fn range(from: Option<i64>, to: Option<i64>) -> Self {
        Self {
            from,
            to,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_events: usize,
    pub oldest_event_timestamp: Option<i64>,
    pub last_event_timestamp: Option<i64>,
    /// Size of the on-disk document in bytes.
    pub storage_size: usize,
}

/// Queue contents read for delivery, tagged with the clear generation they
/// were read under.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    pub events: Vec<ActivityEvent>,
    generation: u64,
}

impl QueueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

pub struct ActivityStore {
    path: PathBuf,
    files: Arc<dyn FileAccess>,
    max_events: usize,
    write_lock: Mutex<()>,
    /// Bumped whenever events leave the queue other than by a sync drain.
    generation: AtomicU64,
}

impl ActivityStore {
    pub fn new(path: impl Into<PathBuf>, files: Arc<dyn FileAccess>, max_events: usize) -> Self {
        Self {
            path: path.into(),
            files,
            max_events: max_events.max(1),
            write_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Store rooted at `<data_dir>/activity/user-activities.json` on disk.
    pub fn in_data_dir(data_dir: &Path, max_events: usize) -> Self {
        Self::new(
            data_dir.join(STORE_DIR_NAME).join(STORE_FILE_NAME),
            Arc::new(TokioFileAccess),
            max_events,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_events(&self) -> usize {
        self.max_events
    }

    /// Parse the document. A missing or unreadable file is "no activity yet".
    pub async fn read_document(&self) -> StoreDocument {
        self.load().await.0
    }

    pub async fn read_all(&self) -> Vec<ActivityEvent> {
        self.read_document().await.activities
    }

    /// Read the queue for delivery. Pass the result back to [`drain_synced`].
    ///
    /// [`drain_synced`]: ActivityStore::drain_synced
    pub async fn snapshot(&self) -> QueueSnapshot {
        let _guard = self.write_lock.lock().await;
        QueueSnapshot {
            events: self.read_all().await,
            generation: self.generation.load(Ordering::SeqCst),
        }
    }

    pub async fn len(&self) -> usize {
        self.read_document().await.activities.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn query(&self, query: ActivityQuery) -> Vec<ActivityEvent> {
        let mut matched: Vec<ActivityEvent> = self
            .read_all()
            .await
            .into_iter()
            .filter(|event| event.within(query.from, query.to))
            .collect();
        if let Some(limit) = query.limit {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        matched
    }

    pub async fn stats(&self) -> StoreStats {
        let (document, size) = self.load().await;
        StoreStats {
            total_events: document.activities.len(),
            oldest_event_timestamp: document.activities.first().map(|e| e.timestamp),
            last_event_timestamp: document.activities.last().map(|e| e.timestamp),
            storage_size: size,
        }
    }

    pub async fn append(&self, event: ActivityEvent) -> Result<(), StoreError> {
        self.append_batch(vec![event]).await.map(|_| ())
    }

    /// Append `events` in order, evicting the oldest entries beyond the cap.
    /// Returns how many old events were evicted.
    pub async fn append_batch(&self, events: Vec<ActivityEvent>) -> Result<usize, StoreError> {
        if events.is_empty() {
            return Ok(0);
        }
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await;
        let added = events.len();
        document.activities.extend(events);
        let evicted = document.evict_oldest(self.max_events);
        if evicted > 0 {
            tracing::warn!(
                evicted,
                max_events = self.max_events,
                "activity queue full, dropped oldest events"
            );
        }
        self.write_document(&document).await?;
        tracing::debug!(added, total = document.activities.len(), "activities appended");
        Ok(evicted)
    }

    /// Replace the stored sequence with an empty one. The file is rewritten,
    /// not deleted, and keeps its header.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let document = self.read_document().await.emptied();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.write_document(&document).await
    }

    /// Remove events strictly older than `before_ms`. Returns the count removed.
    pub async fn clear_older_than(&self, before_ms: i64) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await;
        let before = document.activities.len();
        document.activities.retain(|event| event.timestamp >= before_ms);
        let removed = before - document.activities.len();
        if removed > 0 {
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.write_document(&document).await?;
        }
        Ok(removed)
    }

    /// Remove a batch that was delivered to the remote store, keeping
    /// anything appended since the batch was read, and stamp `lastSync`.
    ///
    /// Events are matched by value, so a queue that was cleared after the
    /// snapshot is left alone: whatever it holds now was never sent, even
    /// if it equals a delivered event.
    pub async fn drain_synced(
        &self,
        snapshot: &QueueSnapshot,
        synced_at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let synced = snapshot.events.as_slice();
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await;
        let removed = if self.generation.load(Ordering::SeqCst) == snapshot.generation {
            document.remove_synced_prefix(synced)
        } else {
            tracing::debug!("queue was cleared during sync, nothing to drain");
            0
        };
        document.last_sync = Some(synced_at);
        self.write_document(&document).await?;
        if removed < synced.len() {
            tracing::debug!(
                removed,
                expected = synced.len(),
                "part of the synced batch was already gone from the queue"
            );
        }
        Ok(removed)
    }

    async fn load(&self) -> (StoreDocument, usize) {
        let bytes = match self.files.read_file(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return (StoreDocument::empty(), 0);
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read activity store, treating as empty");
                return (StoreDocument::empty(), 0);
            }
        };
        match serde_json::from_slice::<StoreDocument>(&bytes) {
            Ok(document) => (document, bytes.len()),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "activity store is corrupt, treating as empty");
                (StoreDocument::empty(), bytes.len())
            }
        }
    }

    async fn write_document(&self, document: &StoreDocument) -> Result<(), StoreError> {
        let payload = serde_json::to_vec_pretty(document)?;
        if let Some(parent) = self.path.parent() {
            self.files.create_folder(parent).await?;
        }
        self.files.write_file(&self.path, &payload).await?;
        Ok(())
    }
}
