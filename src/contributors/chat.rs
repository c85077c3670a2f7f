use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;

use crate::bus::ActivityBus;
use crate::core::{activity_data, ActivityKind};

use super::signals::{ChatRole, ChatSignal, ReadySignal, SignalHub};
use super::{spawn_listener, ActivityContributor, ContributorError, ContributorKind, Subscriptions};

const ID: &str = "ai-chat-activity";

/// Assistant message on a thread whose stream is still running.
struct PendingResponse {
    started: Instant,
    content: String,
}

struct ChatInner {
    bus: Arc<ActivityBus>,
    /// Answers per thread in arrival order. A turn can add several before
    /// the stream goes idle.
    pending: Mutex<HashMap<String, Vec<PendingResponse>>>,
    subscriptions: Subscriptions,
}

/// Questions asked in the AI chat and the answers they got.
///
/// A question is recorded as soon as the user message appears. An answer is
/// held until its thread stops streaming so only its final text is recorded;
/// every answer added during that stream is recorded separately.
pub struct AiChatActivityContributor {
    hub: Arc<SignalHub>,
    inner: Arc<ChatInner>,
}

impl AiChatActivityContributor {
    pub fn new(bus: Arc<ActivityBus>, hub: Arc<SignalHub>) -> Self {
        Self {
            hub,
            inner: Arc::new(ChatInner {
                bus,
                pending: Mutex::new(HashMap::new()),
                subscriptions: Subscriptions::default(),
            }),
        }
    }

    /// Answers still waiting for their thread to go idle.
    pub fn pending_responses(&self) -> usize {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(Vec::len)
            .sum()
    }
}

#[async_trait]
impl ActivityContributor for AiChatActivityContributor {
    fn id(&self) -> &str {
        ID
    }

    fn priority(&self) -> i32 {
        2
    }

    fn kind(&self) -> ContributorKind {
        ContributorKind::Chat
    }

    async fn initialize(&self) -> Result<(), ContributorError> {
        self.hub.wait_ready(ReadySignal::Extensions).await?;

        let inner = self.inner.clone();
        let handle = spawn_listener(ID, self.hub.subscribe_chat(), move |signal| {
            inner.handle(signal);
        });
        self.inner.subscriptions.attach(handle)?;
        tracing::info!(contributor = ID, "chat tracking active");
        Ok(())
    }

    fn dispose(&self) {
        if self.inner.subscriptions.dispose() {
            // Unfinished answers are dropped; they were never complete.
            self.inner
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clear();
        }
    }
}

impl ChatInner {
    fn handle(&self, signal: ChatSignal) {
        if self.subscriptions.is_disposed() {
            return;
        }
        match signal {
            ChatSignal::MessageAdded {
                role: ChatRole::User,
                content,
                ..
            } => self.question(&content),
            ChatSignal::MessageAdded {
                thread_id,
                role: ChatRole::Assistant,
                content,
            } => {
                let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
                pending.entry(thread_id).or_default().push(PendingResponse {
                    started: Instant::now(),
                    content,
                });
            }
            ChatSignal::ResponseUpdated { thread_id, content } => {
                // Updates stream into the newest answer on the thread.
                let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(response) = pending.get_mut(&thread_id).and_then(|r| r.last_mut()) {
                    response.content = content;
                }
            }
            ChatSignal::StreamStateChanged {
                thread_id,
                running: false,
            } => {
                let finished = self
                    .pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&thread_id)
                    .unwrap_or_default();
                for response in finished {
                    self.response(response);
                }
            }
            ChatSignal::StreamStateChanged { running: true, .. } => {}
        }
    }

    fn question(&self, content: &str) {
        let question = content.trim();
        if question.is_empty() {
            return;
        }
        self.bus.track_activity(
            ActivityKind::AiChatQuestion,
            activity_data(json!({
                "question": question,
                "timestamp": self.bus.now_ms(),
            })),
            None,
        );
    }

    fn response(&self, response: PendingResponse) {
        let text = response.content.trim();
        if text.is_empty() {
            tracing::debug!(contributor = ID, "skipping empty chat response");
            return;
        }
        self.bus.track_activity(
            ActivityKind::AiChatResponse,
            activity_data(json!({
                "response": text,
                "duration": response.started.elapsed().as_millis() as u64,
                "timestamp": self.bus.now_ms(),
            })),
            None,
        );
    }
}
