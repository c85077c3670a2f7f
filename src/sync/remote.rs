use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::core::ActivityEvent;

use super::error::RemoteError;

/// Bulk-insert capability of the remote analytics store.
#[async_trait]
pub trait RemoteTableClient: Send + Sync {
    /// Insert every row or none of them.
    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<(), RemoteError>;
}

/// Map one queued activity to the remote row schema:
/// `{type, timestamp, session_id, data, created_at}` plus `user_id` when
/// known and `metadata` only on request.
pub fn remote_row(event: &ActivityEvent, include_metadata: bool, created_at: DateTime<Utc>) -> Value {
    let mut row = json!({
        "type": event.kind.as_str(),
        "timestamp": event.timestamp,
        "session_id": event.session_id,
        "data": event.data,
        "created_at": created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    });
    if let Some(user_id) = &event.user_id {
        row["user_id"] = json!(user_id);
    }
    if include_metadata {
        row["metadata"] = event.metadata.as_ref().map_or(Value::Null, |m| json!(m));
    }
    row
}

/// PostgREST-style table client: `POST <endpoint>/rest/v1/<table>` with the
/// rows as a JSON array.
pub struct RestTableClient {
    endpoint: String,
    credential: String,
    client: reqwest::Client,
}

impl RestTableClient {
    pub fn new(endpoint: &str, credential: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(RemoteError::Config("remote endpoint is empty".to_string()));
        }
        let url = reqwest::Url::parse(endpoint)
            .map_err(|e| RemoteError::Config(format!("invalid remote endpoint {endpoint}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RemoteError::Config(format!(
                "remote endpoint must be http(s): {endpoint}"
            )));
        }
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(RemoteError::Config("remote credential is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Config(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            credential: credential.to_string(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.endpoint, urlencoding::encode(table))
    }
}

impl std::fmt::Debug for RestTableClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestTableClient")
            .field("endpoint", &self.endpoint)
            .field("credential", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl RemoteTableClient for RestTableClient {
    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<(), RemoteError> {
        let count = rows.len();
        let response = self
            .client
            .post(self.table_url(table))
            .header("apikey", &self.credential)
            .bearer_auth(&self.credential)
            .header("Prefer", "return=minimal")
            .json(&rows)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(table, rows = count, %status, "remote insert accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(RemoteError::Auth {
                status: status.as_u16(),
                body,
            });
        }
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
