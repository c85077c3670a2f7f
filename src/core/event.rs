use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// String-keyed payload attached to an activity.
pub type ActivityData = Map<String, Value>;

/// Closed set of activity kinds recorded by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Typing,
    FileOpen,
    FileClose,
    FileSave,
    FileEdit,
    CommandExecute,
    AiChatQuestion,
    AiChatResponse,
    AutocompleteAccept,
}

impl ActivityKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Typing => "typing",
            Self::FileOpen => "file_open",
            Self::FileClose => "file_close",
            Self::FileSave => "file_save",
            Self::FileEdit => "file_edit",
            Self::CommandExecute => "command_execute",
            Self::AiChatQuestion => "ai_chat_question",
            Self::AiChatResponse => "ai_chat_response",
            Self::AutocompleteAccept => "autocomplete_accept",
        }
    }

    pub const fn all() -> &'static [ActivityKind] {
        &[
            ActivityKind::Typing,
            ActivityKind::FileOpen,
            ActivityKind::FileClose,
            ActivityKind::FileSave,
            ActivityKind::FileEdit,
            ActivityKind::CommandExecute,
            ActivityKind::AiChatQuestion,
            ActivityKind::AiChatResponse,
            ActivityKind::AutocompleteAccept,
        ]
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        ActivityKind::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown activity kind: {s}"))
    }
}

/// A single recorded activity. Immutable once built; the bus stamps the
/// session, user and creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    /// Wall-clock creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub data: ActivityData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ActivityData>,
}

impl ActivityEvent {
    /// True when the event falls inside the inclusive `[from, to]` range.
    /// A missing bound leaves that side open.
    pub fn within(&self, from: Option<i64>, to: Option<i64>) -> bool {
        if let Some(from) = from {
            if self.timestamp < from {
                return false;
            }
        }
        if let Some(to) = to {
            if self.timestamp > to {
                return false;
            }
        }
        true
    }
}

/// Build an [`ActivityData`] map from a `json!({...})` object literal.
/// Non-object values are stored under a single `value` key.
pub fn activity_data(value: Value) -> ActivityData {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Split a `/`-separated resource path into its file name and extension.
/// Dotfiles such as `.gitignore` have no extension.
pub fn path_parts(path: &str) -> (String, String) {
    let file_name = path.rsplit('/').next().unwrap_or_default().to_string();
    let extension = match file_name.rfind('.') {
        Some(idx) if idx > 0 => file_name[idx + 1..].to_string(),
        _ => String::new(),
    };
    (file_name, extension)
}
