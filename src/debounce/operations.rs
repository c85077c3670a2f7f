use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Suppresses repeats of `operation:resource` within a fixed window after
/// the first occurrence. Suppressed calls are dropped, not aggregated.
pub struct OperationGate {
    window: Duration,
    recent: Mutex<HashMap<String, Instant>>,
}

impl OperationGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            recent: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns true if this operation should be recorded now.
    pub fn admit(&self, operation: &str, resource: &str) -> bool {
        let key = format!("{operation}:{resource}");
        let now = Instant::now();
        let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        recent.retain(|_, fired_at| now.duration_since(*fired_at) < self.window);

        if recent.contains_key(&key) {
            tracing::trace!(%key, "operation suppressed");
            return false;
        }
        recent.insert(key, now);
        true
    }

    pub fn clear(&self) {
        self.recent.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
