use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use shared::{
    error::RemoteCallError,
    names::{self, split_family, MUTE_PREFIX, VOLUME_PREFIX},
};

use crate::{
    error::{SyncError, SyncResult},
    hub::{SyncHub, ValueOverride},
    layout::PanelLayout,
    race::{settle, GuardToken, GuardedError, RaceGuard},
    remote::RemoteControl,
};

pub fn install_controls(hub: &SyncHub, layout: Arc<PanelLayout>) {
    hub.register(names::SCENE, Arc::new(SceneControl));
    hub.register_family(MUTE_PREFIX, Arc::new(MuteControl));
    hub.register_family(VOLUME_PREFIX, Arc::new(VolumeControl));
    hub.register(
        names::GALLERY_SIZE,
        Arc::new(GallerySizeControl::new(Arc::clone(&layout))),
    );
    hub.register(names::GALLERY_CROP, Arc::new(GalleryCropControl::new(layout)));
}

/// Loose truthiness: `null`, `false`, `0` and `""` are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub fn slider_to_db(position: f64) -> f64 {
    -(10f64.powf(-position)) + 1.0
}

pub fn db_to_slider(db: f64) -> f64 {
    -(-(db - 1.0)).log10()
}

fn member<'a>(name: &'a str, prefix: &str) -> SyncResult<&'a str> {
    split_family(name, prefix)
        .ok_or_else(|| SyncError::value(name, format!("expected a {prefix}<input> name")))
}

fn response_field(response: &Value, request_type: &str, key: &str) -> Result<Value, RemoteCallError> {
    response
        .get(key)
        .cloned()
        .ok_or_else(|| RemoteCallError::unexpected(request_type, format!("missing {key}")))
}

pub struct SceneControl;

#[async_trait]
impl ValueOverride for SceneControl {
    async fn get(&self, hub: &SyncHub, _name: &str) -> SyncResult<Value> {
        let response = hub
            .remote()
            .call("GetCurrentProgramScene", json!({}))
            .await?;
        Ok(response
            .get("sceneName")
            .or_else(|| response.get("currentProgramSceneName"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Notification comes from the server's own scene-changed event.
    async fn set(&self, hub: &SyncHub, name: &str, value: Value) -> SyncResult<()> {
        let scene = value
            .as_str()
            .ok_or_else(|| SyncError::value(name, "expected a scene name"))?;
        hub.remote()
            .call("SetCurrentProgramScene", json!({ "sceneName": scene }))
            .await?;
        Ok(())
    }
}

pub struct MuteControl;

#[async_trait]
impl ValueOverride for MuteControl {
    async fn get(&self, hub: &SyncHub, name: &str) -> SyncResult<Value> {
        let input = member(name, MUTE_PREFIX)?;
        let response = hub
            .remote()
            .call("GetInputMute", json!({ "inputName": input }))
            .await?;
        Ok(response_field(&response, "GetInputMute", "inputMuted")?)
    }

    async fn set(&self, hub: &SyncHub, name: &str, value: Value) -> SyncResult<()> {
        let input = member(name, MUTE_PREFIX)?;
        let muted = truthy(&value);
        hub.remote()
            .call(
                "SetInputMute",
                json!({ "inputName": input, "inputMuted": muted }),
            )
            .await?;
        hub.broadcast(name, Value::Bool(muted)).await
    }
}

pub struct VolumeControl;

#[async_trait]
impl ValueOverride for VolumeControl {
    async fn get(&self, hub: &SyncHub, name: &str) -> SyncResult<Value> {
        let input = member(name, VOLUME_PREFIX)?;
        let response = hub
            .remote()
            .call("GetInputVolume", json!({ "inputName": input }))
            .await?;
        Ok(response_field(&response, "GetInputVolume", "inputVolumeDb")?)
    }

    async fn set(&self, hub: &SyncHub, name: &str, value: Value) -> SyncResult<()> {
        let input = member(name, VOLUME_PREFIX)?;
        let db = value
            .as_f64()
            .ok_or_else(|| SyncError::value(name, "expected a dB number"))?;
        hub.remote()
            .call(
                "SetInputVolume",
                json!({ "inputName": input, "inputVolumeDb": db }),
            )
            .await?;
        hub.broadcast(name, json!(db)).await
    }
}

async fn scene_item_id(
    remote: &dyn RemoteControl,
    scene: &str,
    source: &str,
) -> Result<i64, RemoteCallError> {
    let response = remote
        .call(
            "GetSceneItemId",
            json!({ "sceneName": scene, "sourceName": source }),
        )
        .await?;
    response
        .get("sceneItemId")
        .and_then(Value::as_i64)
        .ok_or_else(|| RemoteCallError::unexpected("GetSceneItemId", "missing sceneItemId"))
}

async fn item_transform(
    remote: &dyn RemoteControl,
    scene: &str,
    item_id: i64,
) -> Result<Map<String, Value>, RemoteCallError> {
    let response = remote
        .call(
            "GetSceneItemTransform",
            json!({ "sceneName": scene, "sceneItemId": item_id }),
        )
        .await?;
    match response.get("sceneItemTransform") {
        Some(Value::Object(transform)) => Ok(transform.clone()),
        _ => Err(RemoteCallError::unexpected(
            "GetSceneItemTransform",
            "missing sceneItemTransform",
        )),
    }
}

async fn set_item_transform(
    remote: &dyn RemoteControl,
    scene: &str,
    item_id: i64,
    transform: Map<String, Value>,
) -> Result<(), RemoteCallError> {
    remote
        .call(
            "SetSceneItemTransform",
            json!({
                "sceneName": scene,
                "sceneItemId": item_id,
                "sceneItemTransform": transform,
            }),
        )
        .await
        .map(|_| ())
}

/// Applies `edit` to the gallery item's transform in each of `scenes`, then
/// persists and broadcasts `value`, all under `token`.
async fn rewrite_gallery<F>(
    hub: &SyncHub,
    token: &GuardToken<'_>,
    name: &str,
    value: Value,
    scenes: &[String],
    source: &str,
    edit: F,
) -> Result<(), GuardedError>
where
    F: Fn(&mut Map<String, Value>) + Send + Sync,
{
    let remote = hub.remote().as_ref();
    for scene in scenes {
        let item_id = token.step(scene_item_id(remote, scene, source)).await?;
        let mut transform = token.step(item_transform(remote, scene, item_id)).await?;
        edit(&mut transform);
        token
            .step(set_item_transform(remote, scene, item_id, transform))
            .await?;
    }
    token.step(hub.persist(name, value.clone())).await?;
    token.ensure_current()?;
    hub.broadcast(name, value).await?;
    Ok(())
}

pub struct GallerySizeControl {
    layout: Arc<PanelLayout>,
    guard: RaceGuard,
}

impl GallerySizeControl {
    pub fn new(layout: Arc<PanelLayout>) -> Self {
        Self {
            layout,
            guard: RaceGuard::new(),
        }
    }
}

#[async_trait]
impl ValueOverride for GallerySizeControl {
    async fn get(&self, hub: &SyncHub, _name: &str) -> SyncResult<Value> {
        let remote = hub.remote().as_ref();
        let scene = &self.layout.notes_scene;
        let item_id = scene_item_id(remote, scene, &self.layout.gallery_source).await?;
        let transform = item_transform(remote, scene, item_id).await?;
        Ok(transform.get("scaleX").cloned().unwrap_or(Value::Null))
    }

    async fn set(&self, hub: &SyncHub, name: &str, value: Value) -> SyncResult<()> {
        let scale = value
            .as_f64()
            .ok_or_else(|| SyncError::value(name, "expected a scale number"))?;
        let token = self.guard.begin();
        let result = rewrite_gallery(
            hub,
            &token,
            name,
            json!(scale),
            &self.layout.resizeable_gallery_scenes,
            &self.layout.gallery_source,
            |transform| {
                transform.insert("scaleX".into(), json!(scale));
                transform.insert("scaleY".into(), json!(scale));
            },
        )
        .await;
        settle(name, result)
    }
}

pub struct GalleryCropControl {
    layout: Arc<PanelLayout>,
    guard: RaceGuard,
}

impl GalleryCropControl {
    pub fn new(layout: Arc<PanelLayout>) -> Self {
        Self {
            layout,
            guard: RaceGuard::new(),
        }
    }
}

#[async_trait]
impl ValueOverride for GalleryCropControl {
    async fn set(&self, hub: &SyncHub, name: &str, value: Value) -> SyncResult<()> {
        let crop = self
            .layout
            .crop_for(&value)
            .ok_or_else(|| SyncError::value(name, format!("no crop factors for {value}")))?;
        let token = self.guard.begin();
        let result = rewrite_gallery(
            hub,
            &token,
            name,
            value,
            &self.layout.gallery_scenes,
            &self.layout.gallery_source,
            |transform| {
                transform.insert("cropTop".into(), json!(crop.top));
                transform.insert("cropBottom".into(), json!(crop.bottom));
                transform.insert("cropLeft".into(), json!(crop.left));
                transform.insert("cropRight".into(), json!(crop.right));
            },
        )
        .await;
        settle(name, result)
    }
}

#[cfg(test)]
#[path = "tests/controls_tests.rs"]
mod tests;
