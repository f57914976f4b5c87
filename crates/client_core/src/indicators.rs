use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
};

use serde_json::{json, Map, Value};
use shared::names::{self, indicator_name, mute_name};
use tracing::{debug, info};

use crate::{
    controls::truthy,
    error::SyncResult,
    hub::{watcher, SyncHub, WatchHandle},
    layout::PanelLayout,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorColor {
    Red,
    Yellow,
    Cyan,
}

impl IndicatorColor {
    pub fn alert_sound(self) -> &'static str {
        match self {
            Self::Red => "alert-high",
            Self::Yellow => "alert-medium",
            Self::Cyan => "alert-low",
        }
    }
}

/// A shared on/off light stored under `indicator-<key>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorLight {
    pub key: &'static str,
    pub color: IndicatorColor,
}

pub const INDICATOR_LIGHTS: [IndicatorLight; 8] = [
    IndicatorLight::new("warning", IndicatorColor::Red),
    IndicatorLight::new("caution", IndicatorColor::Yellow),
    IndicatorLight::new("time", IndicatorColor::Yellow),
    IndicatorLight::new("notes", IndicatorColor::Cyan),
    IndicatorLight::new("question", IndicatorColor::Cyan),
    IndicatorLight::new("chat", IndicatorColor::Cyan),
    IndicatorLight::new("slower", IndicatorColor::Yellow),
    IndicatorLight::new("faster", IndicatorColor::Yellow),
];

impl IndicatorLight {
    pub const fn new(key: &'static str, color: IndicatorColor) -> Self {
        Self { key, color }
    }

    pub fn find(key: &str) -> Option<Self> {
        INDICATOR_LIGHTS.iter().copied().find(|light| light.key == key)
    }

    pub fn value_name(&self) -> String {
        indicator_name(self.key)
    }

    pub async fn is_on(&self, hub: &SyncHub) -> SyncResult<bool> {
        Ok(truthy(&hub.get(&self.value_name()).await?))
    }

    /// Flips the light and returns its new state. Switching it on sounds the
    /// alert for its colour in every panel.
    pub async fn toggle(&self, hub: &SyncHub) -> SyncResult<bool> {
        let on = !self.is_on(hub).await?;
        hub.set(&self.value_name(), json!(on)).await?;
        info!(light = self.key, on, "indicator toggled");
        if on {
            hub.broadcast(names::PLAYSOUND, json!(self.color.alert_sound()))
                .await?;
        }
        Ok(on)
    }
}

/// Aggregates "someone may be on air" sources into the `mirror-live` value.
pub struct LiveIndicator {
    hub: Arc<SyncHub>,
    active: Mutex<BTreeMap<String, Value>>,
}

impl LiveIndicator {
    pub fn new(hub: Arc<SyncHub>) -> Arc<Self> {
        Arc::new(Self {
            hub,
            active: Mutex::new(BTreeMap::new()),
        })
    }

    pub async fn update(&self, source: &str, value: Value) -> SyncResult<()> {
        let next = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            let changed = if truthy(&value) {
                active.insert(source.to_string(), value.clone()) != Some(value)
            } else {
                active.remove(source).is_some()
            };
            if !changed {
                return Ok(());
            }
            aggregate(&active)
        };
        debug!(source, live = %next, "live indicator changed");
        self.hub.set(names::MIRROR_LIVE, next).await
    }

    pub fn is_live(&self) -> bool {
        !self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Treats an unmuted `input` as a live source.
    pub async fn follow_mute(self: &Arc<Self>, input: &str) -> SyncResult<WatchHandle> {
        let name = mute_name(input);
        self.follow(&name, name.clone(), |muted| {
            if truthy(muted) {
                Value::Null
            } else {
                json!("unmuted")
            }
        })
        .await
    }

    pub async fn follow_gallery(self: &Arc<Self>) -> SyncResult<WatchHandle> {
        self.follow(names::GALLERY_SIZE, "gallery-size".into(), |size| {
            if truthy(size) {
                json!("visible")
            } else {
                Value::Null
            }
        })
        .await
    }

    /// Any scene outside the layout's safe scenes is live.
    pub async fn follow_scene(self: &Arc<Self>, layout: Arc<PanelLayout>) -> SyncResult<WatchHandle> {
        self.follow(names::SCENE, "scene-visible".into(), move |scene| match scene {
            Value::String(scene) if !layout.is_safe_scene(scene) => json!(scene),
            _ => Value::Null,
        })
        .await
    }

    async fn follow<F>(self: &Arc<Self>, name: &str, source: String, state: F) -> SyncResult<WatchHandle>
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        let indicator = Arc::downgrade(self);
        let state = Arc::new(state);
        self.hub
            .watch_init(
                name,
                watcher(move |value| {
                    let indicator = indicator.clone();
                    let source = source.clone();
                    let state = Arc::clone(&state);
                    async move {
                        if let Some(indicator) = indicator.upgrade() {
                            indicator.update(&source, state(&value)).await?;
                        }
                        Ok(())
                    }
                }),
            )
            .await
    }
}

fn aggregate(active: &BTreeMap<String, Value>) -> Value {
    if active.is_empty() {
        return Value::Bool(false);
    }
    Value::Object(
        active
            .iter()
            .map(|(source, value)| (source.clone(), value.clone()))
            .collect::<Map<String, Value>>(),
    )
}
