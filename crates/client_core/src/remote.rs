use async_trait::async_trait;
use serde_json::{json, Map, Value};
use shared::{error::RemoteCallError, protocol::PROFILE_REALM};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEvent {
    pub event_type: String,
    pub event_data: Value,
}

impl RemoteEvent {
    pub fn new(event_type: impl Into<String>, event_data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            event_data,
        }
    }
}

/// Request/response and event access to the mixing server.
#[async_trait]
pub trait RemoteControl: Send + Sync {
    async fn call(&self, request_type: &str, request_data: Value)
        -> Result<Value, RemoteCallError>;

    fn subscribe_events(&self) -> broadcast::Receiver<RemoteEvent>;

    /// Reads a profile-realm slot. A slot that was never written reads as `Null`.
    async fn get_slot(&self, name: &str) -> Result<Value, RemoteCallError> {
        let response = self
            .call(
                "GetPersistentData",
                json!({ "realm": PROFILE_REALM, "slotName": name }),
            )
            .await?;
        Ok(response.get("slotValue").cloned().unwrap_or(Value::Null))
    }

    async fn set_slot(&self, name: &str, value: Value) -> Result<(), RemoteCallError> {
        self.call(
            "SetPersistentData",
            json!({ "realm": PROFILE_REALM, "slotName": name, "slotValue": value }),
        )
        .await
        .map(|_| ())
    }

    /// Best-effort fan-out to every connected client, the sender included.
    async fn broadcast_event(&self, payload: Map<String, Value>) -> Result<(), RemoteCallError> {
        self.call("BroadcastCustomEvent", json!({ "eventData": payload }))
            .await
            .map(|_| ())
    }
}

/// Stand-in used before a connection exists; every call fails.
pub struct DisconnectedRemote {
    events: broadcast::Sender<RemoteEvent>,
}

impl Default for DisconnectedRemote {
    fn default() -> Self {
        let (events, _) = broadcast::channel(1);
        Self { events }
    }
}

#[async_trait]
impl RemoteControl for DisconnectedRemote {
    async fn call(
        &self,
        _request_type: &str,
        _request_data: Value,
    ) -> Result<Value, RemoteCallError> {
        Err(RemoteCallError::Disconnected)
    }

    fn subscribe_events(&self) -> broadcast::Receiver<RemoteEvent> {
        self.events.subscribe()
    }
}

pub fn envelope(name: &str, value: Value) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert(name.to_string(), value);
    payload
}
