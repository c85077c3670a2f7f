use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::bus::ActivityBus;
use crate::core::{activity_data, path_parts, ActivityKind};

struct PendingBurst {
    started: Instant,
    text: String,
    char_count: usize,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

struct TypingInner {
    window: Duration,
    bus: Arc<ActivityBus>,
    bursts: Mutex<HashMap<String, PendingBurst>>,
    generation: AtomicU64,
    disposed: AtomicBool,
}

/// Coalesces typing fragments per resource.
///
/// Every fragment restarts the resource's quiet-period timer. When the timer
/// runs out one `typing` activity carries the concatenated text and its
/// character count, and the accumulator for that resource starts over.
/// Pending bursts are flushed, not dropped, when the debouncer is disposed.
pub struct TypingDebouncer {
    inner: Arc<TypingInner>,
}

impl TypingDebouncer {
    pub fn new(bus: Arc<ActivityBus>, window: Duration) -> Self {
        Self {
            inner: Arc::new(TypingInner {
                window,
                bus,
                bursts: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Add a fragment typed into `resource`. Must run inside a tokio runtime.
    pub fn record(&self, resource: &str, fragment: &str) {
        // Timer is spawned under the lock so it cannot fire before the burst exists.
        let mut bursts = self.inner.bursts.lock().unwrap_or_else(|e| e.into_inner());
        // dispose() sets the flag before draining under this lock.
        if self.inner.disposed.load(Ordering::SeqCst) {
            return;
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let timer = spawn_timer(
            Arc::downgrade(&self.inner),
            resource.to_string(),
            generation,
            self.inner.window,
        );
        let burst = bursts
            .entry(resource.to_string())
            .or_insert_with(|| PendingBurst {
                started: Instant::now(),
                text: String::new(),
                char_count: 0,
                generation,
                timer: None,
            });
        burst.text.push_str(fragment);
        burst.char_count += fragment.chars().count();
        burst.generation = generation;
        if let Some(previous) = burst.timer.replace(timer) {
            previous.abort();
        }
    }

    /// Resources with a burst still waiting for its quiet period.
    pub fn pending(&self) -> usize {
        self.inner
            .bursts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Cancel every timer and emit what has accumulated so far. Later
    /// fragments are ignored. Safe to call more than once.
    pub fn dispose(&self) -> usize {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return 0;
        }
        let drained: Vec<(String, PendingBurst)> = self
            .inner
            .bursts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();

        let mut flushed = 0;
        for (resource, mut burst) in drained {
            if let Some(timer) = burst.timer.take() {
                timer.abort();
            }
            let elapsed = burst.started.elapsed();
            if self.inner.emit(&resource, &burst, elapsed) {
                flushed += 1;
            }
        }
        if flushed > 0 {
            tracing::debug!(flushed, "flushed pending typing bursts on dispose");
        }
        flushed
    }
}

impl Drop for TypingDebouncer {
    fn drop(&mut self) {
        let bursts = self.inner.bursts.lock().unwrap_or_else(|e| e.into_inner());
        for burst in bursts.values() {
            if let Some(timer) = burst.timer.as_ref() {
                timer.abort();
            }
        }
    }
}

impl TypingInner {
    fn fire(&self, resource: &str, generation: u64) {
        let burst = {
            let mut bursts = self.bursts.lock().unwrap_or_else(|e| e.into_inner());
            let current = bursts
                .get(resource)
                .is_some_and(|burst| burst.generation == generation);
            if current {
                bursts.remove(resource)
            } else {
                None
            }
        };
        if let Some(burst) = burst {
            self.emit(resource, &burst, self.window);
        }
    }

    fn emit(&self, resource: &str, burst: &PendingBurst, duration: Duration) -> bool {
        if burst.char_count == 0 {
            return false;
        }
        let (file_name, file_extension) = path_parts(resource);
        let data = activity_data(json!({
            "path": resource,
            "fileName": file_name,
            "fileExtension": file_extension,
            "duration": duration.as_millis() as u64,
            "characterCount": burst.char_count,
            "textContent": burst.text,
            "timestamp": self.bus.now_ms(),
        }));
        self.bus
            .track_activity(ActivityKind::Typing, data, None)
            .is_some()
    }
}

fn spawn_timer(
    inner: Weak<TypingInner>,
    resource: String,
    generation: u64,
    window: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(window).await;
        if let Some(inner) = inner.upgrade() {
            if inner.disposed.load(Ordering::SeqCst) {
                return;
            }
            inner.fire(&resource, generation);
        }
    })
}
