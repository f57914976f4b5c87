use super::*;
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use serde_json::json;
use shared::{error::RemoteCallError, protocol::event};
use tokio::{sync::mpsc, time::timeout};

use crate::{error::SyncError, fake_remote::FakeRemote};

fn recorder() -> (WatchFn, Arc<Mutex<Vec<Value>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback = sync_watcher(move |value| {
        sink.lock().expect("seen").push(value);
        Ok(())
    });
    (callback, seen)
}

fn seen(values: &Arc<Mutex<Vec<Value>>>) -> Vec<Value> {
    values.lock().expect("seen").clone()
}

struct CountingOverride {
    gets: AtomicUsize,
    sets: Mutex<Vec<Value>>,
}

impl CountingOverride {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            gets: AtomicUsize::new(0),
            sets: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ValueOverride for CountingOverride {
    async fn get(&self, _hub: &SyncHub, _name: &str) -> SyncResult<Value> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(json!("from-override"))
    }

    async fn set(&self, _hub: &SyncHub, _name: &str, value: Value) -> SyncResult<()> {
        self.sets.lock().expect("sets").push(value);
        Ok(())
    }
}

struct Tagged(&'static str);

#[async_trait]
impl ValueOverride for Tagged {
    async fn get(&self, _hub: &SyncHub, _name: &str) -> SyncResult<Value> {
        Ok(json!(self.0))
    }
}

#[tokio::test]
async fn watch_init_delivers_current_value_then_every_trigger() {
    let remote = FakeRemote::new();
    remote.put_slot("notes_scroll", json!(3));
    let hub = SyncHub::new(remote.clone());
    let (callback, values) = recorder();

    let handle = hub
        .watch_init("notes_scroll", callback)
        .await
        .expect("watch_init");
    assert_eq!(handle.name(), "notes_scroll");
    assert_eq!(seen(&values), vec![json!(3)]);

    hub.trigger("notes_scroll", json!(4)).await;
    hub.trigger("notes_scroll", json!(-1)).await;
    assert_eq!(seen(&values), vec![json!(3), json!(4), json!(-1)]);
}

#[tokio::test]
async fn watch_init_read_failure_leaves_no_watcher_behind() {
    let remote = FakeRemote::new();
    remote.fail("GetPersistentData", RemoteCallError::Disconnected);
    let hub = SyncHub::new(remote.clone());
    let (callback, values) = recorder();

    let err = hub
        .watch_init("playsound", callback)
        .await
        .expect_err("read must fail");
    assert!(matches!(err, SyncError::Remote(RemoteCallError::Disconnected)));
    assert!(seen(&values).is_empty());
    assert_eq!(hub.watcher_count("playsound"), 0);

    hub.trigger("playsound", json!("high")).await;
    assert!(seen(&values).is_empty());
}

#[tokio::test]
async fn envelope_reaches_exactly_the_named_watchers() {
    let hub = SyncHub::new(FakeRemote::new());
    let (on_a, a) = recorder();
    let (on_b, b) = recorder();
    let (on_c, c) = recorder();
    hub.watch("a", on_a);
    hub.watch("b", on_b);
    hub.watch("c", on_c);

    hub.ingest(&RemoteEvent::new(
        event::CUSTOM_EVENT,
        json!({ "a": 1, "b": 2 }),
    ))
    .await;

    assert_eq!(seen(&a), vec![json!(1)]);
    assert_eq!(seen(&b), vec![json!(2)]);
    assert!(seen(&c).is_empty());
}

#[tokio::test]
async fn malformed_entries_do_not_stop_their_siblings() {
    let hub = SyncHub::new(FakeRemote::new());
    let (on_a, a) = recorder();
    hub.watch("a", on_a);

    hub.ingest(&RemoteEvent::new(event::CUSTOM_EVENT, json!("not an object")))
        .await;
    hub.ingest(&RemoteEvent::new(event::CUSTOM_EVENT, json!({ "": 0, "a": 7 })))
        .await;

    assert_eq!(seen(&a), vec![json!(7)]);
}

#[tokio::test]
async fn override_replaces_slot_storage() {
    let remote = FakeRemote::new();
    let hub = SyncHub::new(remote.clone());
    let custom = CountingOverride::new();
    hub.register("custom", custom.clone());

    assert_eq!(hub.get("custom").await.expect("get"), json!("from-override"));
    hub.set("custom", json!(5)).await.expect("set");

    assert_eq!(custom.gets.load(Ordering::SeqCst), 1);
    assert_eq!(*custom.sets.lock().expect("sets"), vec![json!(5)]);
    assert!(remote.calls_of("GetPersistentData").is_empty());
    assert!(remote.calls_of("SetPersistentData").is_empty());
    assert!(remote.broadcasts().is_empty());
}

#[tokio::test]
async fn unregistered_names_round_trip_through_slots() {
    let remote = FakeRemote::new();
    let hub = SyncHub::new(remote.clone());
    assert!(hub.strategy("ss_resolution").is_default());

    hub.set("ss_resolution", json!("1920x1080")).await.expect("set");

    assert_eq!(hub.get("ss_resolution").await.expect("get"), json!("1920x1080"));
    assert_eq!(remote.slot("ss_resolution"), json!("1920x1080"));
    assert_eq!(
        remote.broadcasts_for("ss_resolution"),
        vec![json!("1920x1080")]
    );
}

#[tokio::test]
async fn exact_registration_beats_family_and_longest_prefix_wins() {
    let hub = SyncHub::new(FakeRemote::new());
    hub.register_family("preset-", Arc::new(Tagged("preset family")));
    hub.register_family("preset-1-", Arc::new(Tagged("preset one")));
    hub.register("preset-1-sbox", Arc::new(Tagged("exact")));

    assert_eq!(hub.get("preset-1-sbox").await.expect("get"), json!("exact"));
    assert_eq!(hub.get("preset-1-rbox").await.expect("get"), json!("preset one"));
    assert_eq!(hub.get("preset-2-rbox").await.expect("get"), json!("preset family"));
    assert!(hub.strategy("preset-").is_default());
}

#[tokio::test]
async fn force_on_unset_value_redelivers_null() {
    let hub = SyncHub::new(FakeRemote::new());
    let (first, a) = recorder();
    let (second, b) = recorder();
    hub.watch("gallery_last_state", first);
    hub.watch("gallery_last_state", second);

    assert_eq!(hub.force("gallery_last_state").await.expect("force"), 2);
    assert_eq!(hub.force("gallery_last_state").await.expect("force"), 2);

    assert_eq!(seen(&a), vec![Value::Null, Value::Null]);
    assert_eq!(seen(&b), vec![Value::Null, Value::Null]);
}

#[tokio::test]
async fn fan_out_runs_in_order_and_survives_failing_watchers() {
    let hub = SyncHub::new(FakeRemote::new());
    let order = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&order);
    hub.watch(
        "scene",
        sync_watcher(move |_| {
            log.lock().expect("order").push("first");
            anyhow::bail!("widget went away")
        }),
    );
    hub.watch(
        "scene",
        sync_watcher(|_| -> anyhow::Result<()> { panic!("watcher bug") }),
    );
    let log = Arc::clone(&order);
    hub.watch(
        "scene",
        watcher(move |_| {
            let log = Arc::clone(&log);
            async move {
                tokio::task::yield_now().await;
                log.lock().expect("order").push("third");
                Ok(())
            }
        }),
    );

    assert_eq!(hub.trigger("scene", json!("Gallery")).await, 3);
    assert_eq!(*order.lock().expect("order"), vec!["first", "third"]);
}

#[tokio::test]
async fn duplicate_registration_fires_twice_and_unwatch_removes_one() {
    let hub = SyncHub::new(FakeRemote::new());
    let (callback, values) = recorder();
    let first = hub.watch("playsound", Arc::clone(&callback));
    let _second = hub.watch("playsound", callback);

    hub.trigger("playsound", json!("low")).await;
    assert_eq!(seen(&values).len(), 2);

    assert!(hub.unwatch(&first));
    assert!(!hub.unwatch(&first));
    hub.trigger("playsound", json!("high")).await;
    assert_eq!(seen(&values), vec![json!("low"), json!("low"), json!("high")]);
    assert_eq!(hub.watcher_count("playsound"), 1);
}

#[tokio::test]
async fn set_notifies_local_watchers_through_the_echo() {
    let remote = FakeRemote::new();
    let hub = SyncHub::new(remote.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    hub.watch(
        "notes_scroll",
        sync_watcher(move |value| {
            let _ = tx.send(value);
            Ok(())
        }),
    );
    let ingestion = hub.spawn_ingestion();

    hub.set("notes_scroll", json!(2)).await.expect("set");

    let value = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("echo in time")
        .expect("value");
    assert_eq!(value, json!(2));
    ingestion.abort();
}

#[tokio::test]
async fn set_without_echo_leaves_local_watchers_untouched() {
    let remote = FakeRemote::new().without_loopback();
    let hub = SyncHub::new(remote.clone());
    let (callback, values) = recorder();
    hub.watch("notes_scroll", callback);
    let ingestion = hub.spawn_ingestion();

    hub.set("notes_scroll", json!(5)).await.expect("set");
    tokio::task::yield_now().await;

    assert_eq!(remote.slot("notes_scroll"), json!(5));
    assert_eq!(remote.broadcasts_for("notes_scroll"), vec![json!(5)]);
    assert!(seen(&values).is_empty());
    ingestion.abort();
}

#[tokio::test]
async fn broadcast_does_not_persist() {
    let remote = FakeRemote::new();
    let hub = SyncHub::new(remote.clone());

    hub.broadcast("playsound", json!("alert-high")).await.expect("broadcast");

    assert_eq!(remote.broadcasts_for("playsound"), vec![json!("alert-high")]);
    assert!(remote.calls_of("SetPersistentData").is_empty());
}
