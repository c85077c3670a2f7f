use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::core::ActivityEvent;
use crate::store::ActivityStore;

const DEFAULT_MAX_BATCH: usize = 50;

pub(crate) enum PersistCommand {
    Append(ActivityEvent),
    /// Resolved once every append queued before it has been written (or dropped).
    Flush(oneshot::Sender<()>),
}

pub(crate) struct Persister;

impl Persister {
    /// Spawn the single writer that owns append access to the store.
    ///
    /// Each wake-up drains whatever is already queued (up to 50 appends) into
    /// one read-modify-write, so bursts cost one document rewrite instead of
    /// one per event. The task exits after the last sender is dropped and the
    /// queue is empty.
    pub(crate) fn start(
        mut rx: mpsc::UnboundedReceiver<PersistCommand>,
        store: Arc<ActivityStore>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut buffer: Vec<ActivityEvent> = Vec::with_capacity(DEFAULT_MAX_BATCH);
            let mut waiters: Vec<oneshot::Sender<()>> = Vec::new();

            while let Some(command) = rx.recv().await {
                absorb(command, &mut buffer, &mut waiters);
                while buffer.len() < DEFAULT_MAX_BATCH {
                    match rx.try_recv() {
                        Ok(command) => absorb(command, &mut buffer, &mut waiters),
                        Err(_) => break,
                    }
                }

                flush(&store, &mut buffer).await;
                for waiter in waiters.drain(..) {
                    let _ = waiter.send(());
                }
            }

            tracing::debug!("activity persister stopped");
        })
    }
}

fn absorb(
    command: PersistCommand,
    buffer: &mut Vec<ActivityEvent>,
    waiters: &mut Vec<oneshot::Sender<()>>,
) {
    match command {
        PersistCommand::Append(event) => buffer.push(event),
        PersistCommand::Flush(waiter) => waiters.push(waiter),
    }
}

async fn flush(store: &ActivityStore, buffer: &mut Vec<ActivityEvent>) {
    if buffer.is_empty() {
        return;
    }
    let batch = std::mem::take(buffer);
    let count = batch.len();
    if let Err(e) = store.append_batch(batch).await {
        tracing::warn!(dropped = count, error = %e, "failed to persist activities");
    }
}
