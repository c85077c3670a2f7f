//! Reconciliation of the durable queue with the remote analytics table.
//!
//! [`SyncEngine`] drains the queue on demand or on a timer, one batch at a
//! time, and publishes a [`SyncStatus`] after every attempt. Consecutive
//! failures push the next scheduled attempt out with capped, jittered
//! exponential backoff.

mod backoff;
mod engine;
mod error;
mod remote;
mod status;


pub use backoff::next_sync_delay;
pub use engine::{
    SyncEngine, SyncSettings, DEFAULT_MAX_BACKOFF, DEFAULT_SYNC_INTERVAL, DEFAULT_SYNC_TIMEOUT,
    DEFAULT_TABLE_NAME,
};
pub use error::{RemoteError, SyncError};
pub use remote::{remote_row, RemoteTableClient, RestTableClient};
pub use status::{SyncOutcome, SyncPhase, SyncStatus};
