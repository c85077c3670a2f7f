use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::core::Clock;
use crate::store::ActivityStore;

use super::backoff::next_sync_delay;
use super::error::{RemoteError, SyncError};
use super::remote::{remote_row, RemoteTableClient, RestTableClient};
use super::status::{SyncOutcome, SyncPhase, SyncStatus};

pub const DEFAULT_TABLE_NAME: &str = "user_activities";
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_millis(60_000);
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(900_000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub table_name: String,
    pub interval: Duration,
    pub auto_sync: bool,
    /// Upper bound on one remote insert.
    pub attempt_timeout: Duration,
    pub max_backoff: Duration,
    pub include_metadata: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            interval: DEFAULT_SYNC_INTERVAL,
            auto_sync: true,
            attempt_timeout: DEFAULT_SYNC_TIMEOUT,
            max_backoff: DEFAULT_MAX_BACKOFF,
            include_metadata: false,
        }
    }
}

/// Ships the durable queue to the remote table.
///
/// One sync runs at a time: manual and timer-driven calls queue on
/// `sync_lock`, and each re-reads the store, so a batch that was drained by
/// the previous holder is never inserted twice. A successful insert removes
/// only the delivered prefix of the queue; anything appended meanwhile stays
/// for the next round. A failed insert leaves the queue untouched.
pub struct SyncEngine {
    store: Arc<ActivityStore>,
    clock: Arc<dyn Clock>,
    client: RwLock<Option<Arc<dyn RemoteTableClient>>>,
    settings: Mutex<SyncSettings>,
    phase: Mutex<SyncPhase>,
    sync_lock: tokio::sync::Mutex<()>,
    status: watch::Sender<SyncStatus>,
    failures: AtomicU32,
    reconfigure: Arc<Notify>,
    auto_task: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl SyncEngine {
    pub fn new(store: Arc<ActivityStore>, clock: Arc<dyn Clock>, settings: SyncSettings) -> Arc<Self> {
        Arc::new(Self {
            store,
            clock,
            client: RwLock::new(None),
            settings: Mutex::new(settings),
            phase: Mutex::new(SyncPhase::Uninitialized),
            sync_lock: tokio::sync::Mutex::new(()),
            status: watch::channel(SyncStatus::default()).0,
            failures: AtomicU32::new(0),
            reconfigure: Arc::new(Notify::new()),
            auto_task: Mutex::new(None),
            disposed: AtomicBool::new(false),
        })
    }

    /// Attach a remote client and move to `Ready`.
    pub fn connect(&self, client: Arc<dyn RemoteTableClient>) {
        *self.client.write().unwrap_or_else(|e| e.into_inner()) = Some(client);
        self.set_phase(SyncPhase::Ready);
        self.status.send_modify(|status| {
            status.is_online = true;
            status.last_error = None;
        });
        tracing::info!("sync engine connected");
    }

    /// Build the REST client for `endpoint` and connect it. On failure the
    /// engine stays `Uninitialized` (offline) and the error is recorded.
    pub fn connect_rest(&self, endpoint: &str, credential: &str) -> Result<(), RemoteError> {
        let timeout = self.settings().attempt_timeout;
        match RestTableClient::new(endpoint, credential, timeout) {
            Ok(client) => {
                tracing::debug!(endpoint = client.endpoint(), "remote table client ready");
                self.connect(Arc::new(client));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "remote client unavailable, sync stays offline");
                self.status.send_modify(|status| {
                    status.is_online = false;
                    status.last_error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn settings(&self) -> SyncSettings {
        self.settings.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Consecutive failed attempts since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Re-count the queue into `pendingCount`.
    pub async fn refresh_pending(&self) -> SyncStatus {
        let pending = self.store.len().await;
        self.status.send_if_modified(|status| {
            let changed = status.pending_count != pending;
            status.pending_count = pending;
            changed
        });
        self.status()
    }

    /// Deliver everything currently queued in one bulk insert.
    ///
    /// Never fails: errors are reported in the outcome and in the status.
    pub async fn sync_now(&self) -> SyncOutcome {
        let _guard = self.sync_lock.lock().await;
        if self.disposed.load(Ordering::SeqCst) {
            return SyncOutcome::failed(SyncError::Disposed.to_string());
        }
        let Some(client) = self.client() else {
            return SyncOutcome::failed(SyncError::NotInitialized.to_string());
        };

        let snapshot = self.store.snapshot().await;
        let batch = &snapshot.events;
        if batch.is_empty() {
            tracing::debug!("no activities to sync");
            self.refresh_pending().await;
            return SyncOutcome::synced(0);
        }

        self.set_phase(SyncPhase::Syncing);
        let settings = self.settings();
        let created_at = self.clock.now_utc();
        let rows: Vec<Value> = batch
            .iter()
            .map(|event| remote_row(event, settings.include_metadata, created_at))
            .collect();

        let result = match tokio::time::timeout(
            settings.attempt_timeout,
            client.insert(&settings.table_name, rows),
        )
        .await
        {
            Ok(result) => result.map_err(SyncError::from),
            Err(_) => Err(SyncError::Remote(RemoteError::Timeout)),
        };

        let outcome = match result {
            Ok(()) => {
                let synced_at = self.clock.now_utc();
                if let Err(e) = self.store.drain_synced(&snapshot, synced_at).await {
                    // Delivered but still queued; the next round sends it again.
                    tracing::warn!(error = %e, "failed to drain synced activities");
                }
                self.failures.store(0, Ordering::SeqCst);
                let pending = self.store.len().await;
                self.status.send_replace(SyncStatus {
                    is_online: true,
                    last_sync: Some(synced_at),
                    last_error: None,
                    pending_count: pending,
                });
                tracing::info!(synced = batch.len(), pending, "activities synced");
                SyncOutcome::synced(batch.len())
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
                let pending = self.store.len().await;
                let message = e.to_string();
                self.status.send_modify(|status| {
                    status.is_online = false;
                    status.last_error = Some(message.clone());
                    status.pending_count = pending;
                });
                tracing::warn!(error = %message, failures, pending, "activity sync failed");
                SyncOutcome::failed(message)
            }
        };
        self.set_phase(SyncPhase::Ready);
        outcome
    }

    /// Change the auto-sync interval; applies from the next scheduling cycle.
    /// A zero interval is refused and the current one kept. Returns whether
    /// the interval was applied.
    pub fn set_interval(&self, interval: Duration) -> bool {
        if interval.is_zero() {
            tracing::warn!("ignoring zero auto-sync interval");
            return false;
        }
        self.settings.lock().unwrap_or_else(|e| e.into_inner()).interval = interval;
        self.reconfigure.notify_one();
        true
    }

    /// Pause or resume the timer. An in-flight sync is not interrupted.
    pub fn enable_auto_sync(&self, enabled: bool) {
        self.settings.lock().unwrap_or_else(|e| e.into_inner()).auto_sync = enabled;
        self.reconfigure.notify_one();
    }

    /// Spawn the timer loop. Calling it again replaces the previous loop.
    pub fn start_auto_sync(self: &Arc<Self>) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let handle = tokio::spawn(auto_sync_loop(Arc::downgrade(self), self.reconfigure.clone()));
        if let Some(previous) = self
            .auto_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle)
        {
            previous.abort();
        }
    }

    /// Stop the timer, wait for an in-flight sync to settle, and refuse
    /// later syncs.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let task = self.auto_task.lock().unwrap_or_else(|e| e.into_inner()).take();
        let _guard = self.sync_lock.lock().await;
        if let Some(task) = task {
            task.abort();
        }
        tracing::info!("sync engine disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn client(&self) -> Option<Arc<dyn RemoteTableClient>> {
        self.client.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_phase(&self, phase: SyncPhase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    /// `None` while auto-sync is disabled.
    fn next_delay(&self) -> Option<Duration> {
        let settings = self.settings();
        settings.auto_sync.then(|| {
            next_sync_delay(
                settings.interval,
                self.consecutive_failures(),
                settings.max_backoff,
            )
        })
    }
}

async fn auto_sync_loop(engine: Weak<SyncEngine>, reconfigure: Arc<Notify>) {
    loop {
        let delay = match engine.upgrade() {
            Some(engine) if !engine.is_disposed() => engine.next_delay(),
            _ => break,
        };

        let Some(delay) = delay else {
            reconfigure.notified().await;
            continue;
        };
        tracing::trace!(delay_ms = delay.as_millis() as u64, "next auto-sync scheduled");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = reconfigure.notified() => continue,
        }

        let Some(engine) = engine.upgrade() else {
            break;
        };
        let outcome = engine.sync_now().await;
        if !outcome.success {
            tracing::debug!(error = ?outcome.error, "auto-sync attempt failed");
        }
    }
}
