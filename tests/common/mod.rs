// tests/common/mod.rs
//! Common test utilities for pipeline integration tests.

pub mod mock_remote;

pub use mock_remote::MockRemote;

use std::sync::Arc;

use activity_relay::core::ManualClock;
use activity_relay::store::{ActivityStore, MemoryFileAccess};
use activity_relay::{ActivityService, RelayConfig, SignalHub};

pub const STORE_PATH: &str = "/relay/activity/user-activities.json";

pub struct Harness {
    pub service: Arc<ActivityService>,
    pub hub: Arc<SignalHub>,
    pub store: Arc<ActivityStore>,
    pub clock: Arc<ManualClock>,
    pub remote: Arc<MockRemote>,
}

pub async fn start(config: RelayConfig) -> Harness {
    let hub = Arc::new(SignalHub::ready());
    let store = Arc::new(ActivityStore::new(
        STORE_PATH,
        Arc::new(MemoryFileAccess::new()),
        config.max_queued_events,
    ));
    let clock = Arc::new(ManualClock::new(1_720_000_000_000));
    let remote = Arc::new(MockRemote::default());
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
    Harness {
        service,
        hub,
        store,
        clock,
        remote,
    }
}
