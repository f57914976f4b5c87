use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError, Weak},
    time::Duration,
};

use serde_json::{json, Value};
use shared::names::{
    self, mute_name, preset_label_name, preset_resolution_name, preset_scene_name,
};
use tokio::{task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use crate::{
    error::{SyncError, SyncResult},
    hub::{watcher, SyncHub, WatchFn, WatchHandle},
    layout::PanelLayout,
    race::{settle, GuardToken, GuardedError, RaceGuard},
};

const BREAK_BEEP_GAP: Duration = Duration::from_millis(200);
const COUNTDOWN_BEEPS: u32 = 3;
const COUNTDOWN_INTERVAL: Duration = Duration::from_secs(1);
const RETURN_DELAY: Duration = Duration::from_millis(3500);
const REMOTE_SCENE_SETTLE: Duration = Duration::from_millis(100);
const NO_SCENE: &str = "-";

/// Owning handle of a scheduled task. Dropping the handle aborts the task.
#[derive(Debug)]
pub struct TaskHandle {
    label: &'static str,
    handle: Option<JoinHandle<SyncResult<()>>>,
}

impl TaskHandle {
    pub fn spawn<F>(label: &'static str, task: F) -> Self
    where
        F: Future<Output = SyncResult<()>> + Send + 'static,
    {
        Self {
            label,
            handle: Some(tokio::spawn(task)),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn cancel(&self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    pub async fn wait(mut self) -> SyncResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        match handle.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(SyncError::Cancelled),
            Err(err) => Err(SyncError::Task(format!("{}: {err}", self.label))),
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComeBackOptions {
    pub jingle: bool,
    pub unmute_broadcaster: bool,
}

pub struct Sequencer {
    hub: Arc<SyncHub>,
    layout: Arc<PanelLayout>,
    pending: Mutex<Option<TaskHandle>>,
    preset_guard: RaceGuard,
}

impl Sequencer {
    pub fn new(hub: Arc<SyncHub>, layout: Arc<PanelLayout>) -> Self {
        Self {
            hub,
            layout,
            pending: Mutex::new(None),
            preset_guard: RaceGuard::new(),
        }
    }

    fn replace_pending(&self, task: Option<TaskHandle>) {
        let previous = std::mem::replace(
            &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
            task,
        );
        if let Some(previous) = previous {
            if !previous.is_finished() {
                info!(task = previous.label(), "cancelling pending sequence");
            }
        }
    }

    pub fn cancel_pending(&self) {
        self.replace_pending(None);
    }

    pub async fn wait_pending(&self) -> SyncResult<()> {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pending {
            Some(task) => task.wait().await,
            None => Ok(()),
        }
    }

    pub async fn go_to_break(&self) -> SyncResult<()> {
        info!("going on break");
        let hub = &self.hub;
        hub.set(&mute_name(&self.layout.audio_input), json!(true))
            .await?;
        hub.set(&mute_name(&self.layout.broadcaster_input), json!(true))
            .await?;

        let beeps = Arc::clone(hub);
        self.replace_pending(Some(TaskHandle::spawn("break-beep", async move {
            play(&beeps, "high").await?;
            sleep(BREAK_BEEP_GAP).await;
            play(&beeps, "low").await
        })));

        hub.set(names::SCENE, json!(self.layout.notes_scene)).await?;
        let current = hub.get(names::GALLERY_SIZE).await?;
        if !current.is_null() {
            hub.set(names::GALLERY_LAST_STATE, current).await?;
        }
        hub.set(names::GALLERY_SIZE, json!(0.0)).await
    }

    /// Replaces any pending break or return sequence.
    pub fn come_back(&self, scene: &str, options: ComeBackOptions) -> SyncResult<()> {
        let scene = scene.trim();
        if scene.is_empty() || scene == NO_SCENE {
            warn!(scene, "no scene to come back to");
            return Err(SyncError::value(names::SCENE, "no scene to come back to"));
        }
        info!(scene, ?options, "coming back from break");
        let hub = Arc::clone(&self.hub);
        let layout = Arc::clone(&self.layout);
        let scene = scene.to_string();
        self.replace_pending(Some(TaskHandle::spawn("come-back", async move {
            if options.unmute_broadcaster {
                hub.set(&mute_name(&layout.broadcaster_input), json!(false))
                    .await?;
            }
            if options.jingle {
                let jingle = layout.jingle_file.as_deref().unwrap_or("jingle");
                play(&hub, jingle).await?;
                sleep(RETURN_DELAY).await;
            } else {
                for _ in 0..COUNTDOWN_BEEPS {
                    play(&hub, "low").await?;
                    sleep(COUNTDOWN_INTERVAL).await;
                }
                play(&hub, "high").await?;
                sleep(RETURN_DELAY - COUNTDOWN_INTERVAL * COUNTDOWN_BEEPS).await;
            }
            hub.set(&mute_name(&layout.audio_input), json!(false))
                .await?;
            hub.set(names::SCENE, json!(scene)).await?;
            restore_gallery(&hub, &layout).await
        })));
        Ok(())
    }

    /// Sets the screenshare resolution, then the scene. A newer switch
    /// supersedes an older one still in flight.
    pub async fn switch_preset(&self, preset: &str) -> SyncResult<()> {
        let token = self.preset_guard.begin();
        let result = self.apply_preset(&token, preset).await;
        settle(&preset_scene_name(preset), result)
    }

    async fn apply_preset(&self, token: &GuardToken<'_>, preset: &str) -> Result<(), GuardedError> {
        let hub = &self.hub;
        let scene_slot = preset_scene_name(preset);
        let scene = token.step(hub.get(&scene_slot)).await?;
        let Some(scene) = scene.as_str().filter(|scene| !scene.is_empty()) else {
            return Err(SyncError::value(scene_slot, "preset has no scene").into());
        };
        let resolution = token
            .step(hub.get(&preset_resolution_name(preset)))
            .await?;
        let label = token.step(hub.get(&preset_label_name(preset))).await?;
        debug!(preset, scene, %resolution, "switching preset");

        if !resolution.is_null() {
            let current = token.step(hub.get(names::SCENE)).await?;
            let entering_remote = self.layout.is_remote_scene(scene)
                && !current
                    .as_str()
                    .is_some_and(|current| self.layout.is_remote_scene(current));
            token
                .step(hub.set(names::SCREENSHARE_RESOLUTION, resolution))
                .await?;
            // the screenshare window must be resized before it is captured
            if entering_remote {
                sleep(REMOTE_SCENE_SETTLE).await;
            }
        }
        token.step(hub.set(names::SCENE, json!(scene))).await?;
        let humanname = match label {
            Value::String(label) if !label.is_empty() => label,
            _ => scene.to_string(),
        };
        token.ensure_current()?;
        hub.set(names::SCENE_HUMANNAME, json!(humanname)).await?;
        Ok(())
    }
}

async fn play(hub: &SyncHub, sound: &str) -> SyncResult<()> {
    hub.broadcast(names::PLAYSOUND, json!(sound)).await
}

async fn restore_gallery(hub: &SyncHub, layout: &PanelLayout) -> SyncResult<()> {
    let last = hub.get(names::GALLERY_LAST_STATE).await?;
    let size = if last.is_null() {
        debug!(size = layout.default_gallery_size, "no saved gallery size");
        json!(layout.default_gallery_size)
    } else {
        last
    };
    hub.set(names::GALLERY_SIZE, size).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetState {
    Inactive,
    ActiveSafe,
    ActiveLive,
}

impl PresetState {
    pub fn is_active(self) -> bool {
        self != Self::Inactive
    }
}

pub struct PresetMatcher {
    hub: Arc<SyncHub>,
    layout: Arc<PanelLayout>,
}

impl PresetMatcher {
    pub fn new(hub: Arc<SyncHub>, layout: Arc<PanelLayout>) -> Self {
        Self { hub, layout }
    }

    pub async fn state(&self, preset: &str) -> SyncResult<PresetState> {
        preset_state(&self.hub, &self.layout, preset).await
    }

    pub async fn is_active(&self, preset: &str) -> SyncResult<bool> {
        Ok(self.state(preset).await?.is_active())
    }

    /// Calls `on_change` now and after every change of the scene, the
    /// resolution or the preset itself.
    pub async fn watch_state<F>(&self, preset: &str, on_change: F) -> SyncResult<Vec<WatchHandle>>
    where
        F: Fn(PresetState) + Send + Sync + 'static,
    {
        let on_change = Arc::new(on_change);
        let hub = Arc::downgrade(&self.hub);
        let inputs = [
            names::SCENE.to_string(),
            names::SCREENSHARE_RESOLUTION.to_string(),
            preset_scene_name(preset),
            preset_resolution_name(preset),
        ];
        let mut handles = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let callback = state_watcher(
                hub.clone(),
                Arc::clone(&self.layout),
                preset.to_string(),
                Arc::clone(&on_change),
            );
            handles.push(self.hub.watch(input.clone(), callback));
        }
        on_change(self.state(preset).await?);
        Ok(handles)
    }
}

fn state_watcher<F>(
    hub: Weak<SyncHub>,
    layout: Arc<PanelLayout>,
    preset: String,
    on_change: Arc<F>,
) -> WatchFn
where
    F: Fn(PresetState) + Send + Sync + 'static,
{
    watcher(move |_| {
        let hub = hub.clone();
        let layout = Arc::clone(&layout);
        let preset = preset.clone();
        let on_change = Arc::clone(&on_change);
        async move {
            if let Some(hub) = hub.upgrade() {
                on_change(preset_state(&hub, &layout, &preset).await?);
            }
            Ok(())
        }
    })
}

async fn preset_state(hub: &SyncHub, layout: &PanelLayout, preset: &str) -> SyncResult<PresetState> {
    let wanted_scene = hub.get(&preset_scene_name(preset)).await?;
    if wanted_scene.is_null() {
        return Ok(PresetState::Inactive);
    }
    let wanted_resolution = hub.get(&preset_resolution_name(preset)).await?;
    let scene = hub.get(names::SCENE).await?;
    let resolution = hub.get(names::SCREENSHARE_RESOLUTION).await?;
    if scene != wanted_scene || resolution != wanted_resolution {
        return Ok(PresetState::Inactive);
    }
    Ok(match scene.as_str() {
        Some(scene) if layout.is_safe_scene(scene) => PresetState::ActiveSafe,
        _ => PresetState::ActiveLive,
    })
}

#[cfg(test)]
#[path = "tests/sequences_tests.rs"]
mod tests;
