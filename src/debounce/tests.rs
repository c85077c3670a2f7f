use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::bus::ActivityBus;
use crate::core::{ActivityEvent, ActivityKind, SessionContext, SystemClock};
use crate::debounce::{OperationGate, TypingDebouncer};
use crate::store::{ActivityStore, MemoryFileAccess};

const WINDOW: Duration = Duration::from_millis(1_000);

fn bus() -> Arc<ActivityBus> {
    let store = Arc::new(ActivityStore::new(
        "/data/user-activities.json",
        Arc::new(MemoryFileAccess::new()),
        1_000,
    ));
    ActivityBus::start(Arc::new(SessionContext::new()), Arc::new(SystemClock), store)
}

async fn typing_events(bus: &ActivityBus) -> Vec<ActivityEvent> {
    bus.flush().await;
    bus.get_activities(None, None)
        .await
        .into_iter()
        .filter(|e| e.kind == ActivityKind::Typing)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn burst_of_fragments_becomes_one_event() {
    let bus = bus();
    let debouncer = TypingDebouncer::new(bus.clone(), WINDOW);

    let fragments = ["fn ", "main", "() {", "}"];
    for fragment in fragments {
        debouncer.record("/src/main.rs", fragment);
        sleep(Duration::from_millis(400)).await;
    }
    assert!(typing_events(&bus).await.is_empty(), "nothing before the quiet period");

    sleep(Duration::from_millis(700)).await;
    let events = typing_events(&bus).await;
    assert_eq!(events.len(), 1);
    let data = &events[0].data;
    assert_eq!(data["textContent"], "fn main() {}");
    assert_eq!(data["characterCount"], 12);
    assert_eq!(data["path"], "/src/main.rs");
    assert_eq!(data["fileName"], "main.rs");
    assert_eq!(data["fileExtension"], "rs");
    assert_eq!(data["duration"], 1_000);
    assert_eq!(debouncer.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn separate_bursts_emit_separately_and_reset_accumulator() {
    let bus = bus();
    let debouncer = TypingDebouncer::new(bus.clone(), WINDOW);

    debouncer.record("/a.txt", "hello");
    sleep(Duration::from_millis(1_500)).await;
    debouncer.record("/a.txt", "world");
    sleep(Duration::from_millis(1_500)).await;

    let events = typing_events(&bus).await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].data["textContent"], "hello");
    assert_eq!(events[1].data["textContent"], "world");
    assert_eq!(events[1].data["characterCount"], 5);
}

#[tokio::test(start_paused = true)]
async fn resources_are_debounced_independently() {
    let bus = bus();
    let debouncer = TypingDebouncer::new(bus.clone(), WINDOW);

    debouncer.record("/a.rs", "a");
    debouncer.record("/b.rs", "bb");
    debouncer.record("/a.rs", "aa");
    assert_eq!(debouncer.pending(), 2);

    sleep(Duration::from_millis(1_100)).await;
    let mut events = typing_events(&bus).await;
    events.sort_by(|x, y| x.data["path"].as_str().cmp(&y.data["path"].as_str()));
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].data["textContent"], "aaa");
    assert_eq!(events[1].data["textContent"], "bb");
}

#[tokio::test(start_paused = true)]
async fn empty_fragments_reset_timer_but_emit_nothing() {
    let bus = bus();
    let debouncer = TypingDebouncer::new(bus.clone(), WINDOW);

    debouncer.record("/a.rs", "");
    sleep(Duration::from_millis(1_100)).await;
    assert!(typing_events(&bus).await.is_empty());
    assert_eq!(debouncer.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn character_count_uses_chars_not_bytes() {
    let bus = bus();
    let debouncer = TypingDebouncer::new(bus.clone(), WINDOW);

    debouncer.record("/notes.md", "héllo ");
    debouncer.record("/notes.md", "wörld");
    sleep(Duration::from_millis(1_001)).await;

    let events = typing_events(&bus).await;
    assert_eq!(events[0].data["characterCount"], 11);
}

#[tokio::test(start_paused = true)]
async fn dispose_flushes_pending_bursts_and_ignores_later_fragments() {
    let bus = bus();
    let debouncer = TypingDebouncer::new(bus.clone(), WINDOW);

    debouncer.record("/a.rs", "abc");
    sleep(Duration::from_millis(300)).await;
    debouncer.record("/b.rs", "");

    assert_eq!(debouncer.dispose(), 1);
    assert_eq!(debouncer.dispose(), 0);

    debouncer.record("/a.rs", "late");
    sleep(Duration::from_millis(2_000)).await;

    let events = typing_events(&bus).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data["textContent"], "abc");
    assert_eq!(events[0].data["duration"], 300);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fragments_racing_dispose_are_flushed_or_refused() {
    for _ in 0..20 {
        let bus = bus();
        let debouncer = Arc::new(TypingDebouncer::new(bus.clone(), WINDOW));

        let typist = debouncer.clone();
        let writer = tokio::task::spawn_blocking(move || {
            for _ in 0..500 {
                typist.record("/race.rs", "x");
            }
        });
        tokio::task::yield_now().await;
        debouncer.dispose();
        writer.await.expect("writer");

        // Nothing may be left behind for a timer that will never emit.
        assert_eq!(debouncer.pending(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn operation_gate_suppresses_repeats_inside_window() {
    let gate = OperationGate::new(WINDOW);

    assert!(gate.admit("save", "/a"));
    sleep(Duration::from_millis(500)).await;
    assert!(!gate.admit("save", "/a"));
    assert!(gate.admit("open", "/a"), "different operation is a different key");
    assert!(gate.admit("save", "/b"), "different resource is a different key");

    sleep(Duration::from_millis(500)).await;
    assert!(gate.admit("save", "/a"), "eligible again once the window elapsed");
    assert!(!gate.admit("save", "/a"));
}

#[tokio::test(start_paused = true)]
async fn operation_gate_window_is_anchored_to_first_admission() {
    let gate = OperationGate::new(WINDOW);

    assert!(gate.admit("edit", "/a"));
    for _ in 0..3 {
        sleep(Duration::from_millis(300)).await;
        assert!(!gate.admit("edit", "/a"));
    }
    // Suppressed repeats at 300/600/900ms did not push the window out.
    sleep(Duration::from_millis(300)).await;
    assert!(gate.admit("edit", "/a"));

    gate.clear();
    assert!(gate.admit("edit", "/a"));
}
