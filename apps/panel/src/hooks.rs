use std::{
    process::ExitStatus,
    sync::{Arc, Mutex, PoisonError, Weak},
    time::Duration,
};

use client_core::controls::truthy;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::{process::Command, task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use crate::config::HookSettings;

pub const SCROLL_KEYS: [&str; 5] = ["Up", "Down", "Prior", "Next", "End"];
pub const AUTO_SCROLL_KEY: &str = "Next";

pub const NO_RESOLUTION: &str = "-";

#[derive(Debug, Error)]
pub enum HookError {
    #[error("malformed resolution {0:?}")]
    MalformedResolution(String),
    #[error("invalid width: {0}")]
    Width(u32),
    #[error("invalid height: {0}")]
    Height(u32),
    #[error("unknown sound {0:?}")]
    UnknownSound(String),
    #[error("unsupported scroll key {0:?}")]
    ScrollKey(String),
    #[error("expected a string, got {0}")]
    NotAString(Value),
    #[error("failed to start {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command:?} exited with {status}")]
    Failed { command: String, status: ExitStatus },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Parses `WIDTHxHEIGHT`; [`NO_RESOLUTION`] and `null` parse to `None`.
pub fn parse_resolution(value: &Value) -> Result<Option<Resolution>, HookError> {
    let raw = match value {
        Value::Null => return Ok(None),
        Value::String(raw) => raw.trim(),
        other => return Err(HookError::NotAString(other.clone())),
    };
    if raw == NO_RESOLUTION {
        return Ok(None);
    }
    let malformed = || HookError::MalformedResolution(raw.to_string());
    let (width, height) = raw.split_once('x').ok_or_else(malformed)?;
    Ok(Some(Resolution {
        width: width.parse().map_err(|_| malformed())?,
        height: height.parse().map_err(|_| malformed())?,
    }))
}

pub fn window_size(
    resolution: Resolution,
    border_width: u32,
    border_height: u32,
) -> Result<Resolution, HookError> {
    let width = resolution.width.saturating_add(border_width);
    let height = resolution.height.saturating_add(border_height);
    if !(201..5000).contains(&width) {
        return Err(HookError::Width(width));
    }
    if !(201..3000).contains(&height) {
        return Err(HookError::Height(height));
    }
    Ok(Resolution { width, height })
}

pub fn resolution_command(template: &str, size: Resolution) -> String {
    template
        .replace("WIDTH", &size.width.to_string())
        .replace("HEIGHT", &size.height.to_string())
}

pub fn notes_command(template: &str, key: &str) -> Result<String, HookError> {
    if !SCROLL_KEYS.contains(&key) {
        return Err(HookError::ScrollKey(key.to_string()));
    }
    Ok(template.replace("KEY", key))
}

pub fn sound_command(settings: &HookSettings, template: &str, sound: &str) -> Result<String, HookError> {
    let file = settings
        .sounds
        .get(sound)
        .ok_or_else(|| HookError::UnknownSound(sound.to_string()))?;
    Ok(template.replace("SOUND", file))
}

fn as_str(value: &Value) -> Result<&str, HookError> {
    value
        .as_str()
        .ok_or_else(|| HookError::NotAString(value.clone()))
}

async fn run(command: &str) -> Result<(), HookError> {
    debug!(command, "running hook");
    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .status()
        .await
        .map_err(|source| HookError::Spawn {
            command: command.to_string(),
            source,
        })?;
    if !status.success() {
        return Err(HookError::Failed {
            command: command.to_string(),
            status,
        });
    }
    Ok(())
}

/// Notes scrolling and window resizing only happen on the broadcaster's
/// machine.
pub struct HookRunner {
    settings: HookSettings,
    broadcaster: bool,
    muted: bool,
    auto_scroll: Mutex<Option<JoinHandle<()>>>,
}

impl HookRunner {
    pub fn new(settings: HookSettings, broadcaster: bool, muted: bool) -> Self {
        Self {
            settings,
            broadcaster,
            muted,
            auto_scroll: Mutex::new(None),
        }
    }

    pub async fn play_sound(&self, value: &Value) -> Result<(), HookError> {
        let sound = as_str(value)?;
        info!(sound, muted = self.muted, "play");
        let Some(template) = self.settings.sound_command.as_deref() else {
            warn!(sound, "no sound command configured");
            return Ok(());
        };
        let command = sound_command(&self.settings, template, sound)?;
        if self.muted {
            return Ok(());
        }
        run(&command).await
    }

    pub async fn scroll_notes(&self, value: &Value) -> Result<(), HookError> {
        if !self.broadcaster {
            return Ok(());
        }
        let key = as_str(value)?;
        let Some(template) = self.settings.notes_command.as_deref() else {
            warn!(key, "no notes command configured");
            return Ok(());
        };
        let command = notes_command(template, key)?;
        info!(key, "scrolling notes");
        run(&command).await
    }

    pub async fn change_resolution(&self, value: &Value) -> Result<(), HookError> {
        if !self.broadcaster {
            return Ok(());
        }
        let Some(resolution) = parse_resolution(value)? else {
            info!("ignoring empty resolution");
            return Ok(());
        };
        let Some(template) = self.settings.resolution_command.as_deref() else {
            warn!(
                width = resolution.width,
                height = resolution.height,
                "no resolution command configured"
            );
            return Ok(());
        };
        let size = window_size(
            resolution,
            self.settings.border_width,
            self.settings.border_height,
        )?;
        info!(width = size.width, height = size.height, "changing resolution");
        run(&resolution_command(template, size)).await
    }

    /// Starts or stops paging the notes down. Every update replaces the
    /// running scroller, so at most one is active.
    pub fn auto_scroll(self: &Arc<Self>, value: &Value) {
        let next = (self.broadcaster && truthy(value)).then(|| {
            let every = Duration::from_millis(self.settings.auto_scroll_ms);
            info!(every = ?every, "auto-scrolling notes");
            tokio::spawn(scroll_forever(Arc::downgrade(self), every))
        });
        let previous = std::mem::replace(
            &mut *self.auto_scroll.lock().unwrap_or_else(PoisonError::into_inner),
            next,
        );
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn is_auto_scrolling(&self) -> bool {
        self.auto_scroll
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for HookRunner {
    fn drop(&mut self) {
        if let Some(task) = self
            .auto_scroll
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

async fn scroll_forever(runner: Weak<HookRunner>, every: Duration) {
    loop {
        let Some(hooks) = runner.upgrade() else {
            return;
        };
        if let Err(err) = hooks.scroll_notes(&json!(AUTO_SCROLL_KEY)).await {
            warn!(error = %err, "auto-scroll failed");
        }
        drop(hooks);
        sleep(every).await;
    }
}

#[cfg(test)]
#[path = "tests/hooks_tests.rs"]
mod tests;
