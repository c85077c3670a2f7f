//! The assembled pipeline: contributors, bus, durable queue and sync engine
//! behind one handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::bus::ActivityBus;
use crate::config::{RelayConfig, RelayConfigView};
use crate::contributors::{
    ActivityContributor, AiChatActivityContributor, AutocompleteActivityContributor,
    CommandActivityContributor, ContributorRegistry, ContributorState, EditorActivityContributor,
    InitReport, SignalHub,
};
use crate::core::{ActivityData, ActivityEvent, ActivityKind, Clock, SessionContext, SystemClock};
use crate::store::{ActivityQuery, ActivityStore, StoreStats};
use crate::sync::{RemoteTableClient, SyncEngine, SyncOutcome, SyncStatus};
use crate::RelayError;

pub struct ActivityService {
    config: RelayConfig,
    hub: Arc<SignalHub>,
    bus: Arc<ActivityBus>,
    registry: Arc<ContributorRegistry>,
    sync: Arc<SyncEngine>,
    init_task: Mutex<Option<JoinHandle<InitReport>>>,
    disposed: AtomicBool,
}

impl ActivityService {
    /// Start the pipeline on the on-disk store in the configured data
    /// directory. Must run inside a tokio runtime.
    pub async fn start(config: RelayConfig, hub: Arc<SignalHub>) -> Result<Arc<Self>, RelayError> {
        config.validate()?;
        let store = Arc::new(ActivityStore::in_data_dir(
            &config.resolve_data_dir(),
            config.max_queued_events,
        ));
        Self::start_with(config, hub, store, Arc::new(SystemClock), None).await
    }

    /// Start on an explicit store and clock. `remote` replaces the REST
    /// client that the configured endpoint would otherwise produce.
    pub async fn start_with(
        config: RelayConfig,
        hub: Arc<SignalHub>,
        store: Arc<ActivityStore>,
        clock: Arc<dyn Clock>,
        remote: Option<Arc<dyn RemoteTableClient>>,
    ) -> Result<Arc<Self>, RelayError> {
        config.validate()?;
        let session = Arc::new(SessionContext::new());
        tracing::info!(
            session_id = session.session_id(),
            store = %store.path().display(),
            "starting activity relay"
        );

        let bus = ActivityBus::start(session, clock.clone(), store.clone());

        let sync = SyncEngine::new(store, clock, config.sync_settings());
        match (remote, config.remote_endpoint(), config.remote_credential()) {
            (Some(remote), _, _) => sync.connect(remote),
            (None, Some(endpoint), Some(credential)) => {
                // Failure leaves the engine offline; tracking continues locally.
                let _ = sync.connect_rest(endpoint, credential);
            }
            _ => tracing::info!("no remote store configured, activities stay local"),
        }
        sync.refresh_pending().await;
        sync.start_auto_sync();

        let registry = Arc::new(ContributorRegistry::new(config.contributor_ready_timeout()));
        let builtins: [Arc<dyn ActivityContributor>; 4] = [
            Arc::new(EditorActivityContributor::new(
                bus.clone(),
                hub.clone(),
                config.typing_window(),
                config.file_operation_window(),
            )),
            Arc::new(AiChatActivityContributor::new(bus.clone(), hub.clone())),
            Arc::new(CommandActivityContributor::new(
                bus.clone(),
                hub.clone(),
                config.track_commands,
            )),
            Arc::new(AutocompleteActivityContributor::new(bus.clone(), hub.clone())),
        ];
        for contributor in builtins {
            registry.register(contributor);
        }

        // Readiness waits can take a while; the host is not held up by them.
        let init_task = tokio::spawn({
            let registry = registry.clone();
            async move { registry.initialize_all().await }
        });

        Ok(Arc::new(Self {
            config,
            hub,
            bus,
            registry,
            sync,
            init_task: Mutex::new(Some(init_task)),
            disposed: AtomicBool::new(false),
        }))
    }

    /// Wait for the initial contributor initialization to settle. Later
    /// calls return an empty report.
    pub async fn wait_for_contributors(&self) -> InitReport {
        let task = self.init_task.lock().unwrap_or_else(|e| e.into_inner()).take();
        match task {
            Some(task) => task.await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "contributor initialization task failed");
                InitReport::default()
            }),
            None => InitReport::default(),
        }
    }

    /// Add a producer beyond the built-in ones and initialize it.
    pub async fn register_contributor(&self, contributor: Arc<dyn ActivityContributor>) -> bool {
        if self.is_disposed() || !self.registry.register(contributor) {
            return false;
        }
        self.registry.initialize_all().await;
        true
    }

    pub fn unregister_contributor(&self, id: &str) -> bool {
        self.registry.unregister(id)
    }

    pub fn contributor_states(&self) -> Vec<(String, ContributorState)> {
        self.registry.states()
    }

    pub fn track_activity(
        &self,
        kind: ActivityKind,
        data: ActivityData,
        metadata: Option<ActivityData>,
    ) -> Option<ActivityEvent> {
        self.bus.track_activity(kind, data, metadata)
    }

    /// Stored activities in `[from, to]`, including any still on their way
    /// to the store.
    pub async fn get_activities(&self, from: Option<i64>, to: Option<i64>) -> Vec<ActivityEvent> {
        self.bus.flush().await;
        self.bus.get_activities(from, to).await
    }

    pub async fn query(&self, query: ActivityQuery) -> Vec<ActivityEvent> {
        self.bus.flush().await;
        self.bus.store().query(query).await
    }

    pub async fn stats(&self) -> StoreStats {
        self.bus.flush().await;
        self.bus.store().stats().await
    }

    pub async fn clear_activities(&self) -> Result<(), RelayError> {
        self.bus.clear_activities().await?;
        self.sync.refresh_pending().await;
        Ok(())
    }

    /// Drop stored activities older than `before_ms`.
    pub async fn clear_older_than(&self, before_ms: i64) -> Result<usize, RelayError> {
        self.bus.flush().await;
        let removed = self.bus.store().clear_older_than(before_ms).await?;
        self.sync.refresh_pending().await;
        Ok(removed)
    }

    pub async fn manual_sync(&self) -> SyncOutcome {
        self.bus.flush().await;
        self.sync.sync_now().await
    }

    pub async fn get_sync_status(&self) -> SyncStatus {
        self.bus.flush().await;
        self.sync.refresh_pending().await
    }

    pub fn on_activity_event(&self) -> broadcast::Receiver<ActivityEvent> {
        self.bus.subscribe()
    }

    pub fn on_sync_status_change(&self) -> watch::Receiver<SyncStatus> {
        self.sync.subscribe_status()
    }

    /// Returns false when `interval` is zero and was refused.
    pub fn set_sync_interval(&self, interval: std::time::Duration) -> bool {
        self.sync.set_interval(interval)
    }

    pub fn enable_auto_sync(&self, enabled: bool) {
        self.sync.enable_auto_sync(enabled);
    }

    pub fn set_user_id(&self, user_id: impl Into<String>) {
        self.bus.session().set_user_id(user_id);
    }

    pub fn session_id(&self) -> &str {
        self.bus.session().session_id()
    }

    pub fn hub(&self) -> &Arc<SignalHub> {
        &self.hub
    }

    pub fn config(&self) -> RelayConfigView {
        self.config.to_view()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Shut the pipeline down: stop auto-sync, dispose contributors (pending
    /// typing bursts are flushed), then close the bus and wait for its last
    /// appends. Tracking afterwards is a no-op.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.sync.dispose().await;
        if let Some(task) = self.init_task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
        self.registry.dispose();
        self.bus.close().await;
        tracing::info!(tracked = self.bus.tracked_count(), "activity relay stopped");
    }
}
