//! Scenario tests that drive the assembled pipeline through
//! [`ActivityService`](crate::service::ActivityService).

mod shutdown;

use std::sync::Arc;

use crate::config::RelayConfig;
use crate::contributors::SignalHub;
use crate::core::ManualClock;
use crate::service::ActivityService;
use crate::store::{ActivityStore, MemoryFileAccess};
use crate::testing::{MockRemote, STORE_PATH};

pub(crate) struct Relay {
    pub service: Arc<ActivityService>,
    pub hub: Arc<SignalHub>,
    pub store: Arc<ActivityStore>,
    pub clock: Arc<ManualClock>,
    pub remote: Arc<MockRemote>,
}

/// Service over an in-memory store with every host subsystem ready.
pub(crate) async fn relay(config: RelayConfig) -> Relay {
    let hub = Arc::new(SignalHub::ready());
    let store = Arc::new(ActivityStore::new(
        STORE_PATH,
        Arc::new(MemoryFileAccess::new()),
        config.max_queued_events,
    ));
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let remote = MockRemote::new();
    let service = ActivityService::start_with(
        config,
        hub.clone(),
        store.clone(),
        clock.clone(),
        Some(remote.clone()),
    )
    .await
    .expect("service starts");
    service.wait_for_contributors().await;
    Relay {
        service,
        hub,
        store,
        clock,
        remote,
    }
}
