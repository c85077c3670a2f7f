use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::bus::ActivityBus;
use crate::core::{activity_data, path_parts, ActivityKind};
use crate::debounce::{OperationGate, TypingDebouncer};

use super::signals::{EditorSignal, ReadySignal, SignalHub};
use super::{spawn_listener, ActivityContributor, ContributorError, ContributorKind, Subscriptions};

const ID: &str = "editor-activity";

struct EditorInner {
    bus: Arc<ActivityBus>,
    typing: TypingDebouncer,
    operations: OperationGate,
    subscriptions: Subscriptions,
}

/// Typing bursts plus open/save/edit/close of files.
pub struct EditorActivityContributor {
    hub: Arc<SignalHub>,
    inner: Arc<EditorInner>,
}

impl EditorActivityContributor {
    pub fn new(
        bus: Arc<ActivityBus>,
        hub: Arc<SignalHub>,
        typing_window: Duration,
        operation_window: Duration,
    ) -> Self {
        Self {
            hub,
            inner: Arc::new(EditorInner {
                typing: TypingDebouncer::new(bus.clone(), typing_window),
                operations: OperationGate::new(operation_window),
                bus,
                subscriptions: Subscriptions::default(),
            }),
        }
    }

    /// Record a discrete file operation (`open`, `save`, `edit`, `close`)
    /// subject to the repeat-suppression window.
    pub fn track_file_operation(&self, operation: &str, path: &str) {
        if !self.inner.subscriptions.is_disposed() {
            self.inner.file_operation(operation, path);
        }
    }

    /// Feed a typing fragment straight into the debouncer.
    pub fn record_typing(&self, path: &str, text: &str) {
        if !self.inner.subscriptions.is_disposed() {
            self.inner.typing.record(path, text);
        }
    }
}

#[async_trait]
impl ActivityContributor for EditorActivityContributor {
    fn id(&self) -> &str {
        ID
    }

    fn priority(&self) -> i32 {
        1
    }

    fn kind(&self) -> ContributorKind {
        ContributorKind::Editing
    }

    async fn initialize(&self) -> Result<(), ContributorError> {
        self.hub.wait_ready(ReadySignal::Editors).await?;

        let inner = self.inner.clone();
        let handle = spawn_listener(ID, self.hub.subscribe_editor(), move |signal| {
            inner.handle(signal);
        });
        self.inner.subscriptions.attach(handle)?;
        tracing::info!(contributor = ID, "editor activity tracking active");
        Ok(())
    }

    fn dispose(&self) {
        if self.inner.subscriptions.dispose() {
            self.inner.typing.dispose();
            self.inner.operations.clear();
        }
    }
}

impl EditorInner {
    fn handle(&self, signal: EditorSignal) {
        if self.subscriptions.is_disposed() {
            return;
        }
        match signal {
            EditorSignal::ContentChanged { path, changes, .. } => {
                if changes.is_empty() {
                    return;
                }
                let added: String = changes.iter().map(|change| change.text.as_str()).collect();
                self.typing.record(&path, &added);
            }
            EditorSignal::ActiveEditorChanged { path: Some(path) } => {
                self.file_operation("open", &path);
            }
            EditorSignal::ActiveEditorChanged { path: None } => {}
            EditorSignal::Saved { path } => self.file_operation("save", &path),
            EditorSignal::DirtyChanged { path, dirty: true } => self.file_operation("edit", &path),
            EditorSignal::DirtyChanged { dirty: false, .. } => {}
            EditorSignal::Closed { path } => self.file_operation("close", &path),
        }
    }

    fn file_operation(&self, operation: &str, path: &str) {
        let kind = match operation {
            "open" => ActivityKind::FileOpen,
            "save" => ActivityKind::FileSave,
            "edit" => ActivityKind::FileEdit,
            "close" => ActivityKind::FileClose,
            _ => return,
        };
        if !self.operations.admit(operation, path) {
            return;
        }

        let (file_name, file_extension) = path_parts(path);
        self.bus.track_activity(
            kind,
            activity_data(json!({
                "path": path,
                "fileName": file_name,
                "fileExtension": file_extension,
                "operation": operation,
                "timestamp": self.bus.now_ms(),
            })),
            None,
        );
    }
}
