//! Shared test doubles: an in-memory pipeline and a scriptable remote table.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::bus::ActivityBus;
use crate::core::{ManualClock, SessionContext};
use crate::store::{ActivityStore, MemoryFileAccess};
use crate::sync::{RemoteError, RemoteTableClient};

pub(crate) const STORE_PATH: &str = "/data/activity/user-activities.json";

/// Remote table that records every accepted batch.
#[derive(Default)]
pub(crate) struct MockRemote {
    batches: Mutex<Vec<(String, Vec<Value>)>>,
    fail: AtomicBool,
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl MockRemote {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing() -> Arc<Self> {
        let remote = Self::new();
        remote.set_failing(true);
        remote
    }

    pub(crate) fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Make every insert take `delay` before answering.
    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every row accepted so far, across batches.
    pub(crate) fn rows(&self) -> Vec<Value> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, rows)| rows.clone())
            .collect()
    }

    pub(crate) fn batches(&self) -> Vec<(String, Vec<Value>)> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteTableClient for MockRemote {
    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(RemoteError::Rejected {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }
        self.batches.lock().unwrap().push((table.to_string(), rows));
        Ok(())
    }
}

/// In-memory store, manual clock and a started bus.
pub(crate) struct Pipeline {
    pub clock: Arc<ManualClock>,
    pub store: Arc<ActivityStore>,
    pub bus: Arc<ActivityBus>,
}

pub(crate) fn pipeline() -> Pipeline {
    let store = Arc::new(ActivityStore::new(
        STORE_PATH,
        Arc::new(MemoryFileAccess::new()),
        10_000,
    ));
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let bus = ActivityBus::start(
        Arc::new(SessionContext::with_id("session-test")),
        clock.clone(),
        store.clone(),
    );
    Pipeline {
        clock,
        store,
        bus,
    }
}
