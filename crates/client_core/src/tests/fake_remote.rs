//! In-memory mixing server. Every call yields, or sleeps the configured
//! latency, before it is answered.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use shared::{error::RemoteCallError, protocol::event};
use tokio::sync::broadcast;

use crate::remote::{RemoteControl, RemoteEvent};

#[derive(Default)]
struct FakeState {
    slots: HashMap<String, Value>,
    calls: Vec<(String, Value)>,
    broadcasts: Vec<Map<String, Value>>,
    scene: String,
    muted: HashMap<String, bool>,
    volume_db: HashMap<String, f64>,
    item_ids: HashMap<(String, String), i64>,
    transforms: HashMap<(String, i64), Map<String, Value>>,
    failures: HashMap<String, RemoteCallError>,
    latency: Option<Duration>,
    loopback: bool,
}

pub(crate) struct FakeRemote {
    state: Mutex<FakeState>,
    events: broadcast::Sender<RemoteEvent>,
}

impl FakeRemote {
    pub(crate) fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            state: Mutex::new(FakeState {
                scene: "Title".into(),
                loopback: true,
                ..FakeState::default()
            }),
            events,
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake remote state")
    }

    pub(crate) fn without_loopback(self: Arc<Self>) -> Arc<Self> {
        self.state().loopback = false;
        self
    }

    pub(crate) fn with_latency(self: Arc<Self>, latency: Duration) -> Arc<Self> {
        self.state().latency = Some(latency);
        self
    }

    pub(crate) fn fail(&self, request_type: &str, err: RemoteCallError) {
        self.state().failures.insert(request_type.to_string(), err);
    }

    pub(crate) fn slot(&self, name: &str) -> Value {
        self.state().slots.get(name).cloned().unwrap_or(Value::Null)
    }

    pub(crate) fn put_slot(&self, name: &str, value: Value) {
        self.state().slots.insert(name.to_string(), value);
    }

    pub(crate) fn calls(&self) -> Vec<(String, Value)> {
        self.state().calls.clone()
    }

    pub(crate) fn calls_of(&self, request_type: &str) -> Vec<Value> {
        self.state()
            .calls
            .iter()
            .filter(|(kind, _)| kind == request_type)
            .map(|(_, data)| data.clone())
            .collect()
    }

    pub(crate) fn broadcasts(&self) -> Vec<Map<String, Value>> {
        self.state().broadcasts.clone()
    }

    pub(crate) fn broadcasts_for(&self, name: &str) -> Vec<Value> {
        self.state()
            .broadcasts
            .iter()
            .filter_map(|payload| payload.get(name).cloned())
            .collect()
    }

    pub(crate) fn scene(&self) -> String {
        self.state().scene.clone()
    }

    pub(crate) fn set_scene(&self, scene: &str) {
        self.state().scene = scene.to_string();
    }

    pub(crate) fn input_muted(&self, input: &str) -> Option<bool> {
        self.state().muted.get(input).copied()
    }

    pub(crate) fn set_input_muted(&self, input: &str, muted: bool) {
        self.state().muted.insert(input.to_string(), muted);
    }

    pub(crate) fn transform(&self, scene: &str, source: &str) -> Option<Map<String, Value>> {
        let state = self.state();
        let id = state.item_ids.get(&(scene.to_string(), source.to_string()))?;
        state.transforms.get(&(scene.to_string(), *id)).cloned()
    }

    pub(crate) fn emit(&self, remote_event: RemoteEvent) {
        let _ = self.events.send(remote_event);
    }

    fn answer(&self, request_type: &str, data: &Value) -> Result<(Value, Vec<RemoteEvent>), RemoteCallError> {
        let mut state = self.state();
        state.calls.push((request_type.to_string(), data.clone()));
        if let Some(err) = state.failures.get(request_type) {
            return Err(err.clone());
        }
        let text = |key: &str| data.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
        let mut emitted = Vec::new();
        let response = match request_type {
            "GetPersistentData" => {
                json!({ "slotValue": state.slots.get(&text("slotName")).cloned().unwrap_or(Value::Null) })
            }
            "SetPersistentData" => {
                let value = data.get("slotValue").cloned().unwrap_or(Value::Null);
                state.slots.insert(text("slotName"), value);
                json!({})
            }
            "BroadcastCustomEvent" => {
                let payload = data
                    .get("eventData")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                state.broadcasts.push(payload.clone());
                if state.loopback {
                    emitted.push(RemoteEvent::new(event::CUSTOM_EVENT, Value::Object(payload)));
                }
                json!({})
            }
            "GetCurrentProgramScene" => {
                json!({ "sceneName": state.scene, "currentProgramSceneName": state.scene })
            }
            "SetCurrentProgramScene" => {
                state.scene = text("sceneName");
                emitted.push(RemoteEvent::new(
                    event::CURRENT_PROGRAM_SCENE_CHANGED,
                    json!({ "sceneName": state.scene }),
                ));
                json!({})
            }
            "GetInputMute" => {
                let muted = state.muted.get(&text("inputName")).copied().unwrap_or(false);
                json!({ "inputMuted": muted })
            }
            "SetInputMute" => {
                let input = text("inputName");
                let muted = data.get("inputMuted").and_then(Value::as_bool).unwrap_or(false);
                state.muted.insert(input.clone(), muted);
                emitted.push(RemoteEvent::new(
                    event::INPUT_MUTE_STATE_CHANGED,
                    json!({ "inputName": input, "inputMuted": muted }),
                ));
                json!({})
            }
            "GetInputVolume" => {
                let db = state.volume_db.get(&text("inputName")).copied().unwrap_or(0.0);
                json!({ "inputVolumeDb": db, "inputVolumeMul": 10f64.powf(db / 20.0) })
            }
            "SetInputVolume" => {
                let input = text("inputName");
                let db = data.get("inputVolumeDb").and_then(Value::as_f64).unwrap_or(0.0);
                state.volume_db.insert(input.clone(), db);
                emitted.push(RemoteEvent::new(
                    event::INPUT_VOLUME_CHANGED,
                    json!({ "inputName": input, "inputVolumeDb": db }),
                ));
                json!({})
            }
            "GetSceneItemId" => {
                let key = (text("sceneName"), text("sourceName"));
                let next_id = state.item_ids.len() as i64 + 1;
                let id = *state.item_ids.entry(key.clone()).or_insert(next_id);
                state.transforms.entry((key.0, id)).or_insert_with(|| {
                    json!({ "scaleX": 1.0, "scaleY": 1.0, "cropTop": 0, "cropBottom": 0, "cropLeft": 0, "cropRight": 0 })
                        .as_object()
                        .cloned()
                        .unwrap_or_default()
                });
                json!({ "sceneItemId": id })
            }
            "GetSceneItemTransform" => {
                let key = (text("sceneName"), data.get("sceneItemId").and_then(Value::as_i64).unwrap_or(0));
                match state.transforms.get(&key) {
                    Some(transform) => json!({ "sceneItemTransform": transform }),
                    None => {
                        return Err(RemoteCallError::Request {
                            request_type: request_type.to_string(),
                            code: 600,
                            comment: "no such scene item".into(),
                        })
                    }
                }
            }
            "SetSceneItemTransform" => {
                let key = (text("sceneName"), data.get("sceneItemId").and_then(Value::as_i64).unwrap_or(0));
                let update = data
                    .get("sceneItemTransform")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                state.transforms.entry(key).or_default().extend(update);
                json!({})
            }
            other => {
                return Err(RemoteCallError::Request {
                    request_type: other.to_string(),
                    code: 204,
                    comment: "unknown request type".into(),
                })
            }
        };
        Ok((response, emitted))
    }
}

#[async_trait]
impl RemoteControl for FakeRemote {
    async fn call(&self, request_type: &str, request_data: Value) -> Result<Value, RemoteCallError> {
        let latency = self.state().latency;
        match latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }
        let (response, emitted) = self.answer(request_type, &request_data)?;
        for remote_event in emitted {
            let _ = self.events.send(remote_event);
        }
        Ok(response)
    }

    fn subscribe_events(&self) -> broadcast::Receiver<RemoteEvent> {
        self.events.subscribe()
    }
}
