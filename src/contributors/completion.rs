use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::bus::ActivityBus;
use crate::core::{activity_data, path_parts, ActivityKind};

use super::signals::{EditorSignal, ReadySignal, SignalHub, TextChange};
use super::{spawn_listener, ActivityContributor, ContributorError, ContributorKind, Subscriptions};

const ID: &str = "autocomplete";
const MAX_ACCEPTED_TEXT_CHARS: usize = 100;

struct CompletionInner {
    bus: Arc<ActivityBus>,
    subscriptions: Subscriptions,
}

/// Accepted completions, inferred from content changes: an insertion of
/// more than one character that replaced at most one character.
pub struct AutocompleteActivityContributor {
    hub: Arc<SignalHub>,
    inner: Arc<CompletionInner>,
}

impl AutocompleteActivityContributor {
    pub fn new(bus: Arc<ActivityBus>, hub: Arc<SignalHub>) -> Self {
        Self {
            hub,
            inner: Arc::new(CompletionInner {
                bus,
                subscriptions: Subscriptions::default(),
            }),
        }
    }
}

#[async_trait]
impl ActivityContributor for AutocompleteActivityContributor {
    fn id(&self) -> &str {
        ID
    }

    fn priority(&self) -> i32 {
        40
    }

    fn kind(&self) -> ContributorKind {
        ContributorKind::Completion
    }

    async fn initialize(&self) -> Result<(), ContributorError> {
        self.hub.wait_ready(ReadySignal::Editors).await?;

        let inner = self.inner.clone();
        let handle = spawn_listener(ID, self.hub.subscribe_editor(), move |signal| {
            inner.handle(signal);
        });
        self.inner.subscriptions.attach(handle)?;
        tracing::info!(contributor = ID, "completion tracking active");
        Ok(())
    }

    fn dispose(&self) {
        self.inner.subscriptions.dispose();
    }
}

impl CompletionInner {
    fn handle(&self, signal: EditorSignal) {
        if self.subscriptions.is_disposed() {
            return;
        }
        let EditorSignal::ContentChanged {
            path,
            language_id,
            changes,
        } = signal
        else {
            return;
        };

        for change in changes.iter().filter(|change| looks_like_completion(change)) {
            let (file_name, file_extension) = path_parts(&path);
            let accepted: String = change.text.chars().take(MAX_ACCEPTED_TEXT_CHARS).collect();
            self.bus.track_activity(
                ActivityKind::AutocompleteAccept,
                activity_data(json!({
                    "path": path,
                    "fileName": file_name,
                    "fileExtension": file_extension,
                    "acceptedText": accepted,
                    "completionType": guess_completion_type(&change.text),
                    "languageId": language_id,
                })),
                None,
            );
        }
    }
}

fn looks_like_completion(change: &TextChange) -> bool {
    change.text.chars().count() > 1 && change.range_length <= 1
}

/// Rough classification of accepted completion text.
pub fn guess_completion_type(text: &str) -> &'static str {
    if text.contains('(') && text.contains(')') {
        return "function";
    }
    if text.contains('{') && text.contains('}') {
        return "snippet";
    }
    if is_identifier(text) {
        return "variable";
    }
    if text.contains('.') {
        return "property";
    }
    "text"
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
