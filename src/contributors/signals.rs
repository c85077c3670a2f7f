//! Raw signals published by the host application.
//!
//! The host owns the editor, command and chat subsystems; it forwards what
//! happens there through a [`SignalHub`] and flips readiness gates once each
//! subsystem is usable. Contributors only ever see these types.

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use super::ContributorError;

const SIGNAL_CAPACITY: usize = 1024;

/// One edit inside a content change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChange {
    /// Inserted text (empty for pure deletions).
    pub text: String,
    /// Length of the replaced range, in characters.
    pub range_length: usize,
}

impl TextChange {
    pub fn insert(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            range_length: 0,
        }
    }

    pub fn replace(text: impl Into<String>, range_length: usize) -> Self {
        Self {
            text: text.into(),
            range_length,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditorSignal {
    ContentChanged {
        path: String,
        language_id: Option<String>,
        changes: Vec<TextChange>,
    },
    /// The focused editor changed; `None` when no file editor is focused.
    ActiveEditorChanged { path: Option<String> },
    Saved { path: String },
    DirtyChanged { path: String, dirty: bool },
    Closed { path: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSignal {
    pub command_id: String,
    #[serde(default)]
    pub args: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatSignal {
    MessageAdded {
        thread_id: String,
        role: ChatRole,
        content: String,
    },
    /// Latest streamed content of the newest assistant message on a thread.
    ResponseUpdated { thread_id: String, content: String },
    StreamStateChanged { thread_id: String, running: bool },
}

/// Host subsystems a contributor may have to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadySignal {
    Editors,
    Lifecycle,
    Extensions,
}

impl std::fmt::Display for ReadySignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Editors => "editors",
            Self::Lifecycle => "lifecycle",
            Self::Extensions => "extensions",
        };
        write!(f, "{name}")
    }
}

pub struct SignalHub {
    editor: broadcast::Sender<EditorSignal>,
    commands: broadcast::Sender<CommandSignal>,
    chat: broadcast::Sender<ChatSignal>,
    editors_ready: watch::Sender<bool>,
    lifecycle_ready: watch::Sender<bool>,
    extensions_ready: watch::Sender<bool>,
}

impl SignalHub {
    pub fn new() -> Self {
        let (editor, _) = broadcast::channel(SIGNAL_CAPACITY);
        let (commands, _) = broadcast::channel(SIGNAL_CAPACITY);
        let (chat, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            editor,
            commands,
            chat,
            editors_ready: watch::channel(false).0,
            lifecycle_ready: watch::channel(false).0,
            extensions_ready: watch::channel(false).0,
        }
    }

    /// Hub with every readiness gate already open.
    pub fn ready() -> Self {
        let hub = Self::new();
        hub.mark_ready(ReadySignal::Editors);
        hub.mark_ready(ReadySignal::Lifecycle);
        hub.mark_ready(ReadySignal::Extensions);
        hub
    }

    pub fn emit_editor(&self, signal: EditorSignal) {
        let _ = self.editor.send(signal);
    }

    pub fn emit_command(&self, signal: CommandSignal) {
        let _ = self.commands.send(signal);
    }

    pub fn emit_chat(&self, signal: ChatSignal) {
        let _ = self.chat.send(signal);
    }

    pub fn subscribe_editor(&self) -> broadcast::Receiver<EditorSignal> {
        self.editor.subscribe()
    }

    pub fn subscribe_commands(&self) -> broadcast::Receiver<CommandSignal> {
        self.commands.subscribe()
    }

    pub fn subscribe_chat(&self) -> broadcast::Receiver<ChatSignal> {
        self.chat.subscribe()
    }

    pub fn mark_ready(&self, which: ReadySignal) {
        tracing::debug!(signal = %which, "host subsystem ready");
        self.gate(which).send_replace(true);
    }

    pub fn is_ready(&self, which: ReadySignal) -> bool {
        *self.gate(which).borrow()
    }

    /// Suspend until the host reports `which` as ready.
    pub async fn wait_ready(&self, which: ReadySignal) -> Result<(), ContributorError> {
        let mut rx = self.gate(which).subscribe();
        rx.wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| ContributorError::NotReady(which.to_string()))
    }

    fn gate(&self, which: ReadySignal) -> &watch::Sender<bool> {
        match which {
            ReadySignal::Editors => &self.editors_ready,
            ReadySignal::Lifecycle => &self.lifecycle_ready,
            ReadySignal::Extensions => &self.extensions_ready,
        }
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}
