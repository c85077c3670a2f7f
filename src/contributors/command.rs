use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::bus::ActivityBus;
use crate::core::{activity_data, ActivityKind};

use super::signals::{CommandSignal, ReadySignal, SignalHub};
use super::{spawn_listener, ActivityContributor, ContributorError, ContributorKind, Subscriptions};

const ID: &str = "command-activity";

/// Cursor movement, clipboard and other high-volume commands that carry no
/// signal about what the user is working on.
const EXCLUDED_COMMANDS: &[&str] = &[
    "workbench.action.files.save",
    "workbench.action.files.saveAll",
    "workbench.action.acceptSelectedSuggestion",
    "editor.action.triggerSuggest",
    "editor.action.insertLineAfter",
    "editor.action.insertLineBefore",
    "deleteLeft",
    "deleteRight",
    "cursorMove",
    "cursorEnd",
    "cursorHome",
    "cursorWordLeft",
    "cursorWordRight",
    "cursorUp",
    "cursorDown",
    "cursorLeft",
    "cursorRight",
    "cursorPageDown",
    "cursorPageUp",
    "scrollLineUp",
    "scrollLineDown",
    "scrollPageUp",
    "scrollPageDown",
    "undo",
    "redo",
    "cut",
    "copy",
    "paste",
    "selectAll",
    "find",
    "replace",
    "closeFindWidget",
    "workbench.action.focusActiveEditorGroup",
    "workbench.action.focusSideBar",
    "workbench.action.toggleSidebarVisibility",
    "workbench.action.togglePanel",
    "workbench.action.quickOpen",
    "workbench.action.showCommands",
    "workbench.action.terminal.toggleTerminal",
    "editor.action.format",
    "editor.action.formatDocument",
    "editor.action.formatSelection",
];

struct CommandInner {
    bus: Arc<ActivityBus>,
    excluded: HashSet<&'static str>,
    subscriptions: Subscriptions,
}

/// Executed commands. Off unless explicitly enabled; when off it still
/// initializes but never subscribes.
pub struct CommandActivityContributor {
    hub: Arc<SignalHub>,
    enabled: bool,
    inner: Arc<CommandInner>,
}

impl CommandActivityContributor {
    pub fn new(bus: Arc<ActivityBus>, hub: Arc<SignalHub>, enabled: bool) -> Self {
        Self {
            hub,
            enabled,
            inner: Arc::new(CommandInner {
                bus,
                excluded: EXCLUDED_COMMANDS.iter().copied().collect(),
                subscriptions: Subscriptions::default(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_excluded(&self, command_id: &str) -> bool {
        self.inner.excluded.contains(command_id)
    }
}

#[async_trait]
impl ActivityContributor for CommandActivityContributor {
    fn id(&self) -> &str {
        ID
    }

    fn priority(&self) -> i32 {
        3
    }

    fn kind(&self) -> ContributorKind {
        ContributorKind::Command
    }

    async fn initialize(&self) -> Result<(), ContributorError> {
        self.hub.wait_ready(ReadySignal::Lifecycle).await?;

        if !self.enabled {
            tracing::info!(contributor = ID, "command tracking disabled");
            return Ok(());
        }

        let inner = self.inner.clone();
        let handle = spawn_listener(ID, self.hub.subscribe_commands(), move |signal| {
            inner.handle(signal);
        });
        self.inner.subscriptions.attach(handle)?;
        tracing::info!(contributor = ID, "command tracking active");
        Ok(())
    }

    fn dispose(&self) {
        self.inner.subscriptions.dispose();
    }
}

impl CommandInner {
    fn handle(&self, signal: CommandSignal) {
        if self.subscriptions.is_disposed() {
            return;
        }
        let command = signal.command_id.trim();
        if command.is_empty() || self.excluded.contains(command) {
            return;
        }
        self.bus.track_activity(
            ActivityKind::CommandExecute,
            activity_data(json!({
                "command": command,
                "args": signal.args.unwrap_or(Value::Null),
                "timestamp": self.bus.now_ms(),
            })),
            None,
        );
    }
}
