use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::core::{ActivityData, ActivityEvent, ActivityKind, Clock, SessionContext};
use crate::store::{ActivityQuery, ActivityStore, StoreError};

use super::persister::{PersistCommand, Persister};

const BUS_CAPACITY: usize = 1024;

pub struct ActivityBus {
    session: Arc<SessionContext>,
    clock: Arc<dyn Clock>,
    store: Arc<ActivityStore>,
    tx: broadcast::Sender<ActivityEvent>,
    persist_tx: Mutex<Option<mpsc::UnboundedSender<PersistCommand>>>,
    persister: Mutex<Option<JoinHandle<()>>>,
    tracked: AtomicU64,
}

impl ActivityBus {
    /// Build the bus and spawn its persister. Must run inside a tokio runtime.
    pub fn start(
        session: Arc<SessionContext>,
        clock: Arc<dyn Clock>,
        store: Arc<ActivityStore>,
    ) -> Arc<Self> {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        let persister = Persister::start(persist_rx, store.clone());
        Arc::new(Self {
            session,
            clock,
            store,
            tx,
            persist_tx: Mutex::new(Some(persist_tx)),
            persister: Mutex::new(Some(persister)),
            tracked: AtomicU64::new(0),
        })
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn store(&self) -> &Arc<ActivityStore> {
        &self.store
    }

    /// Current wall-clock time as seen by the bus.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Record an activity.
    ///
    /// Subscribers are notified before this returns; the durable append is
    /// queued and never reports back. Returns `None` once the bus is closed.
    pub fn track_activity(
        &self,
        kind: ActivityKind,
        data: ActivityData,
        metadata: Option<ActivityData>,
    ) -> Option<ActivityEvent> {
        let guard = self.persist_tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(persist_tx) = guard.as_ref() else {
            tracing::debug!(kind = %kind, "activity bus closed, dropping activity");
            return None;
        };

        let event = ActivityEvent {
            kind,
            timestamp: self.clock.now_ms(),
            session_id: self.session.session_id().to_string(),
            user_id: self.session.user_id(),
            data,
            metadata,
        };

        if self.tx.send(event.clone()).is_err() {
            tracing::trace!("no activity subscribers");
        }
        if persist_tx.send(PersistCommand::Append(event.clone())).is_err() {
            tracing::warn!(kind = %kind, "activity persister unavailable, activity not stored");
        }
        self.tracked.fetch_add(1, Ordering::Relaxed);
        Some(event)
    }

    /// Get a new receiver for tracked activities.
    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.tx.subscribe()
    }

    /// Number of activities accepted since start.
    pub fn tracked_count(&self) -> u64 {
        self.tracked.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.persist_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    /// Wait until every activity tracked before this call has reached the store.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        {
            let guard = self.persist_tx.lock().unwrap_or_else(|e| e.into_inner());
            let Some(persist_tx) = guard.as_ref() else {
                return;
            };
            if persist_tx.send(PersistCommand::Flush(done_tx)).is_err() {
                return;
            }
        }
        let _ = done_rx.await;
    }

    /// Stored activities with timestamps in `[from, to]`, in stored order.
    pub async fn get_activities(&self, from: Option<i64>, to: Option<i64>) -> Vec<ActivityEvent> {
        self.store.query(ActivityQuery::range(from, to)).await
    }

    /// Empty the durable queue, including anything tracked before the call.
    pub async fn clear_activities(&self) -> Result<(), StoreError> {
        self.flush().await;
        self.store.clear().await
    }

    /// Stop accepting activities and wait for queued appends to be written.
    pub async fn close(&self) {
        let sender = self
            .persist_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(sender);

        let persister = self
            .persister
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = persister {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "activity persister ended abnormally");
            }
        }
    }
}
