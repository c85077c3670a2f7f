use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote store misconfigured: {0}")]
    Config(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("auth error ({status}): {body}")]
    Auth { status: u16, body: String },
    #[error("remote call timed out")]
    Timeout,
    #[error("remote store rejected the batch ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("not initialized")]
    NotInitialized,
    #[error("sync engine disposed")]
    Disposed,
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
