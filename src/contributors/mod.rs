//! Activity contributors: components that turn raw host signals into
//! activities.
//!
//! Each contributor waits for the host subsystem it depends on, then
//! listens to its signal channel on a background task until disposed.
//! The [`ContributorRegistry`] owns their lifecycle.

mod chat;
mod command;
mod completion;
mod editor;
mod registry;
pub mod signals;


use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub use chat::AiChatActivityContributor;
pub use command::CommandActivityContributor;
pub use completion::{guess_completion_type, AutocompleteActivityContributor};
pub use editor::EditorActivityContributor;
pub use registry::{ContributorRegistry, ContributorState, InitReport};
pub use signals::{
    ChatRole, ChatSignal, CommandSignal, EditorSignal, ReadySignal, SignalHub, TextChange,
};

#[derive(Debug, thiserror::Error)]
pub enum ContributorError {
    #[error("host subsystem never became ready: {0}")]
    NotReady(String),
    #[error("initialization timed out after {0} ms")]
    Timeout(u64),
    #[error("contributor disposed during initialization")]
    Disposed,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContributorKind {
    Editing,
    Command,
    Chat,
    Completion,
    Custom,
}

#[async_trait]
pub trait ActivityContributor: Send + Sync {
    fn id(&self) -> &str;
    /// Ordering hint for initialization; never affects correctness.
    fn priority(&self) -> i32;
    fn kind(&self) -> ContributorKind;
    /// Wait for the host and attach signal listeners. May suspend.
    async fn initialize(&self) -> Result<(), ContributorError>;
    /// Stop listening. Must be idempotent.
    fn dispose(&self);
}

/// Listener tasks owned by one contributor.
#[derive(Default)]
pub(crate) struct Subscriptions {
    handles: Mutex<Vec<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl Subscriptions {
    /// Keep `handle` alive until dispose. A late attach after dispose is
    /// aborted on the spot.
    pub(crate) fn attach(&self, handle: JoinHandle<()>) -> Result<(), ContributorError> {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_disposed() {
            handle.abort();
            return Err(ContributorError::Disposed);
        }
        handles.push(handle);
        Ok(())
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Abort every listener. Returns false if already disposed.
    pub(crate) fn dispose(&self) -> bool {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        if self.disposed.swap(true, Ordering::SeqCst) {
            return false;
        }
        for handle in handles.drain(..) {
            handle.abort();
        }
        true
    }
}

/// Forward every signal from `rx` to `on_signal` until the hub goes away or
/// the task is aborted.
pub(crate) fn spawn_listener<T, F>(
    contributor: &'static str,
    mut rx: broadcast::Receiver<T>,
    mut on_signal: F,
) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(signal) => on_signal(signal),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(contributor, skipped = n, "contributor lagged, dropped signals");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
