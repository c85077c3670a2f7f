//! Local-first user activity telemetry.
//!
//! Activity contributors observe host signals (editor, commands, chat,
//! completions) and record [`ActivityEvent`]s through the [`ActivityBus`].
//! The bus notifies in-process subscribers immediately and hands every
//! event to a single persister that appends it to the durable JSON queue.
//! The [`SyncEngine`] ships the queue to a remote table on a timer or on
//! demand and reports a [`SyncStatus`].
//!
//! # Architecture
//!
//! - `core`: event model, session identity, clock
//! - `store`: durable queue document and file access
//! - `debounce`: typing burst coalescing and repeat suppression
//! - `bus`: subscriber fan-out and persistence hand-off
//! - `contributors`: signal hub, producers and their registry
//! - `sync`: remote client, backoff and the sync engine
//! - `config` / `service`: configuration and the assembled pipeline

pub mod bus;
pub mod config;
pub mod contributors;
pub mod core;
pub mod debounce;
pub mod service;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

use serde::Serialize;

pub use bus::ActivityBus;
pub use config::{ConfigError, RelayConfig, RelayConfigView};
pub use contributors::{ActivityContributor, ContributorError, ContributorRegistry, SignalHub};
pub use crate::core::{activity_data, ActivityData, ActivityEvent, ActivityKind, SessionContext};
pub use service::ActivityService;
pub use store::{ActivityQuery, ActivityStore, QueueSnapshot, StoreError, StoreStats};
pub use sync::{RemoteError, RemoteTableClient, SyncEngine, SyncError, SyncOutcome, SyncStatus};

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Sync(#[from] SyncError),
    #[error("{0}")]
    Remote(#[from] RemoteError),
    #[error("{0}")]
    Contributor(#[from] ContributorError),
}

impl Serialize for RelayError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Install a `fmt` subscriber filtered by `RUST_LOG`. Does nothing when the
/// host already installed one.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("activity_relay=debug,info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
