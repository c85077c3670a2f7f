use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use super::{ActivityContributor, ContributorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributorState {
    Registered,
    Initializing,
    Active,
    /// Initialization failed or timed out. Never retried.
    Failed,
}

struct Entry {
    contributor: Arc<dyn ActivityContributor>,
    state: ContributorState,
    error: Option<String>,
}

/// Result of one [`ContributorRegistry::initialize_all`] pass.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitReport {
    pub initialized: Vec<String>,
    pub failed: Vec<String>,
}

/// Producers keyed by id.
pub struct ContributorRegistry {
    entries: DashMap<String, Entry>,
    ready_timeout: Duration,
    disposed: AtomicBool,
}

impl ContributorRegistry {
    pub fn new(ready_timeout: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ready_timeout,
            disposed: AtomicBool::new(false),
        }
    }

    /// Add a contributor. A duplicate id (or a disposed registry) leaves
    /// the registry untouched and returns false.
    pub fn register(&self, contributor: Arc<dyn ActivityContributor>) -> bool {
        let id = contributor.id().to_string();
        if self.disposed.load(Ordering::SeqCst) {
            tracing::warn!(contributor = %id, "registry disposed, ignoring registration");
            return false;
        }
        match self.entries.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => {
                tracing::warn!(contributor = %occupied.key(), "contributor already registered");
                false
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                tracing::debug!(
                    contributor = %vacant.key(),
                    priority = contributor.priority(),
                    "contributor registered"
                );
                vacant.insert(Entry {
                    contributor,
                    state: ContributorState::Registered,
                    error: None,
                });
                true
            }
        }
    }

    /// Dispose and remove one contributor.
    pub fn unregister(&self, id: &str) -> bool {
        match self.entries.remove(id) {
            Some((_, entry)) => {
                entry.contributor.dispose();
                tracing::debug!(contributor = %id, "contributor unregistered");
                true
            }
            None => false,
        }
    }

    /// Initialize every contributor still in the `registered` state,
    /// concurrently, and wait for all of them to settle.
    ///
    /// Failures and readiness timeouts are logged and leave the contributor
    /// `failed` and disposed; siblings are unaffected.
    pub async fn initialize_all(&self) -> InitReport {
        let mut pending: Vec<(String, Arc<dyn ActivityContributor>)> = Vec::new();
        for mut entry in self.entries.iter_mut() {
            if entry.state == ContributorState::Registered {
                entry.state = ContributorState::Initializing;
                pending.push((entry.key().clone(), entry.contributor.clone()));
            }
        }
        pending.sort_by_key(|(_, contributor)| contributor.priority());

        let timeout = self.ready_timeout;
        let results = futures::future::join_all(pending.into_iter().map(|(id, contributor)| async move {
            let outcome = match tokio::time::timeout(timeout, contributor.initialize()).await {
                Ok(result) => result,
                Err(_) => Err(ContributorError::Timeout(timeout.as_millis() as u64)),
            };
            (id, contributor, outcome)
        }))
        .await;

        let mut report = InitReport::default();
        for (id, contributor, outcome) in results {
            match outcome {
                Ok(()) => {
                    let still_registered = self.set_state(&id, ContributorState::Active, None);
                    if !still_registered || self.disposed.load(Ordering::SeqCst) {
                        // Unregistered or disposed while initializing.
                        contributor.dispose();
                        continue;
                    }
                    tracing::info!(contributor = %id, "contributor initialized");
                    report.initialized.push(id);
                }
                Err(e) => {
                    tracing::warn!(contributor = %id, error = %e, "contributor failed to initialize");
                    contributor.dispose();
                    self.set_state(&id, ContributorState::Failed, Some(e.to_string()));
                    report.failed.push(id);
                }
            }
        }
        report
    }

    /// Current state of every contributor, sorted by id.
    pub fn states(&self) -> Vec<(String, ContributorState)> {
        let mut states: Vec<_> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.state))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    pub fn state(&self, id: &str) -> Option<ContributorState> {
        self.entries.get(id).map(|entry| entry.state)
    }

    /// Why a contributor ended up `failed`.
    pub fn failure(&self, id: &str) -> Option<String> {
        self.entries.get(id).and_then(|entry| entry.error.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Dispose every contributor and empty the registry. Later
    /// registrations are refused.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let ids: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            if let Some((_, entry)) = self.entries.remove(&id) {
                entry.contributor.dispose();
            }
        }
        tracing::info!("contributors disposed");
    }

    fn set_state(&self, id: &str, state: ContributorState, error: Option<String>) -> bool {
        match self.entries.get_mut(id) {
            Some(mut entry) => {
                entry.state = state;
                entry.error = error;
                true
            }
            None => false,
        }
    }
}
