use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::sleep;

use crate::config::RelayConfig;
use crate::contributors::{EditorSignal, SignalHub, TextChange};
use crate::core::{activity_data, ActivityKind, SystemClock};
use crate::service::ActivityService;
use crate::store::ActivityStore;

use super::relay;

#[tokio::test(start_paused = true)]
async fn dispose_flushes_pending_typing_then_rejects_activity() {
    let r = relay(RelayConfig::default()).await;
    // Keystrokes one character at a time, so no completion is inferred.
    for ch in "half a sent".chars() {
        r.hub.emit_editor(EditorSignal::ContentChanged {
            path: "/README.md".to_string(),
            language_id: None,
            changes: vec![TextChange::insert(ch.to_string())],
        });
        sleep(Duration::from_millis(20)).await;
    }

    r.service.dispose().await;
    r.service.dispose().await;
    assert!(r.service.is_disposed());

    assert!(r
        .service
        .track_activity(ActivityKind::FileOpen, activity_data(json!({})), None)
        .is_none());
    r.hub.emit_editor(EditorSignal::Saved {
        path: "/README.md".to_string(),
    });
    sleep(Duration::from_secs(5)).await;

    let stored = r.store.read_all().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].kind, ActivityKind::Typing);
    assert_eq!(stored[0].data["textContent"], "half a sent");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nothing_is_appended_after_dispose_returns() {
    let r = relay(RelayConfig::default()).await;
    let accepted = Arc::new(AtomicUsize::new(0));

    let producer = tokio::spawn({
        let service = r.service.clone();
        let accepted = accepted.clone();
        async move {
            for i in 0..2_000 {
                if service
                    .track_activity(ActivityKind::FileEdit, activity_data(json!({ "i": i })), None)
                    .is_some()
                {
                    accepted.fetch_add(1, Ordering::SeqCst);
                }
                tokio::task::yield_now().await;
            }
        }
    });

    sleep(Duration::from_millis(5)).await;
    r.service.dispose().await;
    let at_dispose = r.store.len().await;

    producer.await.unwrap();
    assert_eq!(r.store.len().await, at_dispose);
    assert_eq!(at_dispose, accepted.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn dispose_stops_auto_sync() {
    let r = relay(RelayConfig::default()).await;
    r.service
        .track_activity(ActivityKind::FileSave, activity_data(json!({})), None);
    r.service.dispose().await;

    sleep(Duration::from_secs(600)).await;
    assert_eq!(r.remote.calls(), 0);
    assert_eq!(r.store.len().await, 1);
}

#[tokio::test]
async fn on_disk_queue_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = RelayConfig {
        data_dir: Some(dir.path().to_path_buf()),
        auto_sync_enabled: false,
        ..RelayConfig::default()
    };

    let first = ActivityService::start(config.clone(), Arc::new(SignalHub::ready()))
        .await
        .unwrap();
    first.set_user_id("dev-7");
    first.track_activity(
        ActivityKind::CommandExecute,
        activity_data(json!({ "command": "git.pull", "args": ["--rebase"] })),
        Some(activity_data(json!({ "source": "palette" }))),
    );
    first.track_activity(
        ActivityKind::Typing,
        activity_data(json!({ "textContent": "ünïcødé", "characterCount": 7 })),
        None,
    );
    let written = first.get_activities(None, None).await;
    first.dispose().await;

    assert!(config.store_path().exists());
    let reopened = ActivityStore::in_data_dir(dir.path(), config.max_queued_events);
    assert_eq!(reopened.read_all().await, written);

    let second = ActivityService::start_with(
        config.clone(),
        Arc::new(SignalHub::ready()),
        Arc::new(reopened),
        Arc::new(SystemClock),
        None,
    )
    .await
    .unwrap();
    assert_ne!(second.session_id(), written[0].session_id);
    assert_eq!(second.get_sync_status().await.pending_count, 2);
    second.dispose().await;
}
