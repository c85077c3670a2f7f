//! Pipeline configuration.
//!
//! Values come from an optional JSON file, then `ACTIVITY_RELAY_*`
//! environment variables (a `.env` file is honoured by [`RelayConfig::from_env`]).
//! The remote credential is only ever read from configuration, never
//! compiled in.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{DEFAULT_MAX_QUEUED_EVENTS, STORE_DIR_NAME, STORE_FILE_NAME};
use crate::sync::{SyncSettings, DEFAULT_TABLE_NAME};

pub const ENV_REMOTE_ENDPOINT: &str = "ACTIVITY_RELAY_REMOTE_ENDPOINT";
pub const ENV_REMOTE_CREDENTIAL: &str = "ACTIVITY_RELAY_REMOTE_CREDENTIAL";
pub const ENV_TABLE: &str = "ACTIVITY_RELAY_TABLE";
pub const ENV_SYNC_INTERVAL_MS: &str = "ACTIVITY_RELAY_SYNC_INTERVAL_MS";
pub const ENV_AUTO_SYNC: &str = "ACTIVITY_RELAY_AUTO_SYNC";
pub const ENV_DATA_DIR: &str = "ACTIVITY_RELAY_DATA_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("remote credential is required but not configured")]
    MissingCredential,
}

fn default_table_name() -> String {
    DEFAULT_TABLE_NAME.to_string()
}

fn default_sync_interval_ms() -> u64 {
    60_000
}

fn default_true() -> bool {
    true
}

fn default_sync_timeout_ms() -> u64 {
    30_000
}

fn default_max_backoff_ms() -> u64 {
    900_000
}

fn default_max_queued_events() -> usize {
    DEFAULT_MAX_QUEUED_EVENTS
}

fn default_debounce_ms() -> u64 {
    1_000
}

fn default_ready_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    #[serde(default)]
    pub remote_endpoint: Option<String>,
    #[serde(default)]
    pub remote_credential: Option<String>,
    #[serde(default = "default_table_name")]
    pub table_name: String,
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
    #[serde(default = "default_true")]
    pub auto_sync_enabled: bool,
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_max_queued_events")]
    pub max_queued_events: usize,
    #[serde(default = "default_debounce_ms")]
    pub typing_debounce_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub file_operation_debounce_ms: u64,
    #[serde(default = "default_ready_timeout_ms")]
    pub contributor_ready_timeout_ms: u64,
    #[serde(default)]
    pub track_commands: bool,
    #[serde(default)]
    pub include_metadata_in_remote: bool,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            remote_endpoint: None,
            remote_credential: None,
            table_name: default_table_name(),
            sync_interval_ms: default_sync_interval_ms(),
            auto_sync_enabled: true,
            sync_timeout_ms: default_sync_timeout_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_queued_events: default_max_queued_events(),
            typing_debounce_ms: default_debounce_ms(),
            file_operation_debounce_ms: default_debounce_ms(),
            contributor_ready_timeout_ms: default_ready_timeout_ms(),
            track_commands: false,
            include_metadata_in_remote: false,
            data_dir: None,
        }
    }
}

/// Config as shown to users: the credential is reduced to a flag.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfigView {
    pub remote_endpoint: Option<String>,
    pub credential_configured: bool,
    pub table_name: String,
    pub sync_interval_ms: u64,
    pub auto_sync_enabled: bool,
    pub track_commands: bool,
    pub include_metadata_in_remote: bool,
    pub data_dir: String,
}

impl RelayConfig {
    /// Read `path` (a missing file means defaults) and apply environment
    /// overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Defaults plus environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup`. Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(endpoint) = get(ENV_REMOTE_ENDPOINT) {
            self.remote_endpoint = Some(endpoint);
        }
        if let Some(credential) = get(ENV_REMOTE_CREDENTIAL) {
            self.remote_credential = Some(credential);
        }
        if let Some(table) = get(ENV_TABLE) {
            self.table_name = table;
        }
        if let Some(raw) = get(ENV_SYNC_INTERVAL_MS) {
            self.sync_interval_ms = raw.parse().map_err(|_| ConfigError::Env {
                var: ENV_SYNC_INTERVAL_MS,
                value: raw.clone(),
            })?;
        }
        if let Some(raw) = get(ENV_AUTO_SYNC) {
            self.auto_sync_enabled = match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::Env {
                        var: ENV_AUTO_SYNC,
                        value: raw,
                    })
                }
            };
        }
        if let Some(dir) = get(ENV_DATA_DIR) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    /// Reject unusable values. Release builds also require a credential.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.check(cfg!(not(debug_assertions)))
    }

    pub(crate) fn check(&self, require_credential: bool) -> Result<(), ConfigError> {
        let positive = [
            ("syncIntervalMs", self.sync_interval_ms),
            ("syncTimeoutMs", self.sync_timeout_ms),
            ("maxBackoffMs", self.max_backoff_ms),
            ("typingDebounceMs", self.typing_debounce_ms),
            ("fileOperationDebounceMs", self.file_operation_debounce_ms),
            ("contributorReadyTimeoutMs", self.contributor_ready_timeout_ms),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
        }
        if self.max_queued_events == 0 {
            return Err(ConfigError::Invalid(
                "maxQueuedEvents must be greater than zero".to_string(),
            ));
        }
        if self.table_name.trim().is_empty() {
            return Err(ConfigError::Invalid("tableName must not be empty".to_string()));
        }

        let endpoint = self.remote_endpoint();
        if let Some(endpoint) = endpoint {
            let url = reqwest::Url::parse(endpoint)
                .map_err(|e| ConfigError::Invalid(format!("remoteEndpoint {endpoint}: {e}")))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid(format!(
                    "remoteEndpoint must be http(s): {endpoint}"
                )));
            }
        }
        let has_credential = self.remote_credential().is_some();
        if (endpoint.is_some() || require_credential) && !has_credential {
            return Err(ConfigError::MissingCredential);
        }
        Ok(())
    }

    pub fn remote_endpoint(&self) -> Option<&str> {
        self.remote_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn remote_credential(&self) -> Option<&str> {
        self.remote_credential
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Directory holding the activity store.
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        default_data_dir()
    }

    pub fn store_path(&self) -> PathBuf {
        self.resolve_data_dir()
            .join(STORE_DIR_NAME)
            .join(STORE_FILE_NAME)
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            table_name: self.table_name.trim().to_string(),
            interval: Duration::from_millis(self.sync_interval_ms),
            auto_sync: self.auto_sync_enabled,
            attempt_timeout: Duration::from_millis(self.sync_timeout_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            include_metadata: self.include_metadata_in_remote,
        }
    }

    pub fn typing_window(&self) -> Duration {
        Duration::from_millis(self.typing_debounce_ms)
    }

    pub fn file_operation_window(&self) -> Duration {
        Duration::from_millis(self.file_operation_debounce_ms)
    }

    pub fn contributor_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.contributor_ready_timeout_ms)
    }

    pub fn to_view(&self) -> RelayConfigView {
        RelayConfigView {
            remote_endpoint: self.remote_endpoint().map(str::to_string),
            credential_configured: self.remote_credential().is_some(),
            table_name: self.table_name.clone(),
            sync_interval_ms: self.sync_interval_ms,
            auto_sync_enabled: self.auto_sync_enabled,
            track_commands: self.track_commands,
            include_metadata_in_remote: self.include_metadata_in_remote,
            data_dir: self.resolve_data_dir().display().to_string(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(ENV_DATA_DIR) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(app_data) = std::env::var("APPDATA") {
            return PathBuf::from(app_data).join("ActivityRelay");
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".activity-relay");
    }

    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".activity-relay");
    }

    PathBuf::from(".activity-relay")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config: RelayConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.sync_interval_ms, 60_000);
        assert!(config.auto_sync_enabled);
        assert!(!config.track_commands);
        assert_eq!(config.max_queued_events, 10_000);
        assert_eq!(config.table_name, "user_activities");
    }

    #[test]
    fn file_values_use_camel_case() {
        let config: RelayConfig = serde_json::from_str(
            r#"{
                "remoteEndpoint": "https://relay.example.test",
                "remoteCredential": "k",
                "syncIntervalMs": 300000,
                "autoSyncEnabled": false,
                "trackCommands": true,
                "includeMetadataInRemote": true
            }"#,
        )
        .unwrap();
        assert_eq!(config.remote_endpoint(), Some("https://relay.example.test"));
        assert_eq!(config.sync_interval_ms, 300_000);
        assert!(!config.auto_sync_enabled);
        assert!(config.track_commands);
        assert!(config.sync_settings().include_metadata);
    }

    #[test]
    fn load_reads_file_and_missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = RelayConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(missing.table_name, RelayConfig::default().table_name);

        let path = dir.path().join("relay.json");
        std::fs::write(&path, r#"{ "tableName": "events", "typingDebounceMs": 250 }"#).unwrap();
        let config = RelayConfig::load(&path).unwrap();
        assert_eq!(config.table_name, "events");
        assert_eq!(config.typing_window(), Duration::from_millis(250));

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(RelayConfig::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = RelayConfig {
            table_name: "from_file".to_string(),
            ..RelayConfig::default()
        };
        config
            .apply_overrides(lookup(&[
                (ENV_REMOTE_ENDPOINT, "https://relay.example.test"),
                (ENV_REMOTE_CREDENTIAL, " secret "),
                (ENV_TABLE, "from_env"),
                (ENV_SYNC_INTERVAL_MS, "5000"),
                (ENV_AUTO_SYNC, "off"),
                (ENV_DATA_DIR, "/var/lib/relay"),
            ]))
            .unwrap();

        assert_eq!(config.remote_credential(), Some("secret"));
        assert_eq!(config.table_name, "from_env");
        assert_eq!(config.sync_interval_ms, 5_000);
        assert!(!config.auto_sync_enabled);
        assert_eq!(
            config.store_path(),
            PathBuf::from("/var/lib/relay/activity/user-activities.json")
        );
    }

    #[test]
    fn blank_environment_values_are_ignored() {
        let mut config = RelayConfig::default();
        config
            .apply_overrides(lookup(&[(ENV_TABLE, "   "), (ENV_REMOTE_CREDENTIAL, "")]))
            .unwrap();
        assert_eq!(config.table_name, "user_activities");
        assert_eq!(config.remote_credential(), None);
    }

    #[test]
    fn malformed_environment_values_are_errors() {
        let mut config = RelayConfig::default();
        let err = config
            .apply_overrides(lookup(&[(ENV_SYNC_INTERVAL_MS, "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: ENV_SYNC_INTERVAL_MS, .. }));

        let err = config
            .apply_overrides(lookup(&[(ENV_AUTO_SYNC, "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: ENV_AUTO_SYNC, .. }));
    }

    #[test]
    fn validation_rejects_unusable_values() {
        let zero_interval = RelayConfig {
            sync_interval_ms: 0,
            ..RelayConfig::default()
        };
        assert!(matches!(zero_interval.check(false), Err(ConfigError::Invalid(_))));

        let bad_endpoint = RelayConfig {
            remote_endpoint: Some("ftp://relay".to_string()),
            remote_credential: Some("k".to_string()),
            ..RelayConfig::default()
        };
        assert!(matches!(bad_endpoint.check(false), Err(ConfigError::Invalid(_))));

        let endpoint_without_key = RelayConfig {
            remote_endpoint: Some("https://relay.example.test".to_string()),
            ..RelayConfig::default()
        };
        assert!(matches!(
            endpoint_without_key.check(false),
            Err(ConfigError::MissingCredential)
        ));
    }

    #[test]
    fn credential_is_required_when_demanded() {
        let offline = RelayConfig::default();
        assert!(offline.check(false).is_ok());
        assert!(matches!(offline.check(true), Err(ConfigError::MissingCredential)));

        let configured = RelayConfig {
            remote_endpoint: Some("https://relay.example.test".to_string()),
            remote_credential: Some("k".to_string()),
            ..RelayConfig::default()
        };
        assert!(configured.check(true).is_ok());
    }

    #[test]
    fn view_never_exposes_the_credential() {
        let config = RelayConfig {
            remote_credential: Some("super-secret".to_string()),
            data_dir: Some(PathBuf::from("/tmp/relay")),
            ..RelayConfig::default()
        };
        let view = serde_json::to_string(&config.to_view()).unwrap();
        assert!(!view.contains("super-secret"));
        assert!(view.contains("\"credentialConfigured\":true"));
    }
}
