use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::ActivityEvent;

pub const STORE_SCHEMA_VERSION: &str = "1.0.0";

/// On-disk shape of the durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    #[serde(default)]
    pub activities: Vec<ActivityEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: StoreMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreMetadata {
    pub created_at: DateTime<Utc>,
    pub version: String,
}

impl Default for StoreMetadata {
    fn default() -> Self {
        Self {
            created_at: Utc::now(),
            version: STORE_SCHEMA_VERSION.to_string(),
        }
    }
}

impl StoreDocument {
    pub fn empty() -> Self {
        Self {
            activities: Vec::new(),
            last_sync: None,
            metadata: StoreMetadata::default(),
        }
    }

    /// Same document header with no activities.
    pub fn emptied(&self) -> Self {
        Self {
            activities: Vec::new(),
            last_sync: self.last_sync,
            metadata: self.metadata.clone(),
        }
    }

    /// Drop the oldest entries until at most `max` remain. Returns how many
    /// were dropped.
    pub fn evict_oldest(&mut self, max: usize) -> usize {
        let overflow = self.activities.len().saturating_sub(max);
        if overflow > 0 {
            self.activities.drain(..overflow);
        }
        overflow
    }

    /// Remove the part of `synced` that is still at the head of the queue.
    ///
    /// Appends only ever land at the tail and eviction only trims the head,
    /// so the queue looks like `synced[k..] ++ newer`. Finds the smallest
    /// such `k` and removes `synced.len() - k` entries. Returns the count.
    pub fn remove_synced_prefix(&mut self, synced: &[ActivityEvent]) -> usize {
        for skip in 0..=synced.len() {
            let remaining = &synced[skip..];
            if self.activities.starts_with(remaining) {
                let count = remaining.len();
                self.activities.drain(..count);
                return count;
            }
        }
        0
    }
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self::empty()
    }
}
