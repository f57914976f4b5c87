use super::*;
use std::time::Duration;

use serde_json::json;
use shared::{error::StatusKind, protocol::event};
use tokio::{sync::mpsc, time::timeout};

use crate::fake_remote::FakeRemote;

#[tokio::test]
async fn session_installs_builtin_overrides() {
    let session = PanelSession::with_remote(FakeRemote::new(), PanelLayout::default());

    for name in ["scene", "mute-cam1", "volume-cam1", "gallerysize", "gallerycrop"] {
        assert!(!session.hub.strategy(name).is_default(), "{name} should be overridden");
    }
    for name in ["notes_scroll", "playsound", "mute-", "preset-1-sbox"] {
        assert!(session.hub.strategy(name).is_default(), "{name} should use slots");
    }
    session.shutdown();
}

#[tokio::test]
async fn session_routes_server_events_to_watchers() {
    let remote = FakeRemote::new();
    let session = PanelSession::with_remote(remote.clone(), PanelLayout::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.hub.watch(
        "scene",
        sync_watcher(move |value| {
            let _ = tx.send(value);
            Ok(())
        }),
    );

    remote.emit(RemoteEvent::new(
        event::CURRENT_PROGRAM_SCENE_CHANGED,
        json!({ "sceneName": "BroadcasterScreen" }),
    ));

    let value = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("event in time")
        .expect("value");
    assert_eq!(value, json!("BroadcasterScreen"));
    session.shutdown();
}

#[tokio::test]
async fn disconnected_remote_fails_with_remote_status() {
    let session =
        PanelSession::with_remote(Arc::new(DisconnectedRemote::default()), PanelLayout::default());

    let err = session
        .hub
        .get("notes_scroll")
        .await
        .expect_err("no connection");
    let status = err.status();
    assert_eq!(status.kind, StatusKind::Remote);
    assert!(status.message.contains("closed"), "{}", status.message);
    session.shutdown();
}
