// tests/common/mock_remote.rs
//! Scriptable remote table for integration tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use activity_relay::{RemoteError, RemoteTableClient};
use async_trait::async_trait;
use serde_json::Value;

#[derive(Default)]
pub struct MockRemote {
    rows: Mutex<Vec<Value>>,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl MockRemote {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn rows(&self) -> Vec<Value> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteTableClient for MockRemote {
    async fn insert(&self, _table: &str, rows: Vec<Value>) -> Result<(), RemoteError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RemoteError::Request("connection refused".to_string()));
        }
        self.rows.lock().unwrap().extend(rows);
        Ok(())
    }
}
