use std::{collections::BTreeMap, fs, io::ErrorKind, path::Path};

use anyhow::{Context, Result};
use client_core::PanelLayout;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HookSettings {
    /// Plays one sound file; `SOUND` is replaced by its path.
    pub sound_command: Option<String>,
    pub sounds: BTreeMap<String, String>,
    /// Sends one key to the notes window; `KEY` is replaced by the key name.
    pub notes_command: Option<String>,
    /// Resizes the screenshare window; `WIDTH` and `HEIGHT` are replaced.
    pub resolution_command: Option<String>,
    pub border_width: u32,
    pub border_height: u32,
    /// Pause between notes pages while auto-scroll is on.
    pub auto_scroll_ms: u64,
}

impl Default for HookSettings {
    fn default() -> Self {
        Self {
            sound_command: Some("paplay SOUND".into()),
            sounds: BTreeMap::from([
                ("high".into(), "sound/beep-high.wav".into()),
                ("low".into(), "sound/beep-low.wav".into()),
                ("jingle".into(), "sound/jingle.wav".into()),
                ("alert-high".into(), "sound/alert-high.wav".into()),
                ("alert-medium".into(), "sound/alert-medium.wav".into()),
                ("alert-low".into(), "sound/alert-low.wav".into()),
            ]),
            notes_command: None,
            resolution_command: None,
            border_width: 0,
            border_height: 0,
            auto_scroll_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PanelSettings {
    pub layout: PanelLayout,
    pub hooks: HookSettings,
}

pub fn load_settings(path: &Path) -> Result<PanelSettings> {
    load_settings_from(path, |key| std::env::var(key).ok())
}

/// A missing file yields the built-in settings; the environment overrides
/// the hook commands either way.
pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<PanelSettings> {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<PanelSettings>(&raw)
            .with_context(|| format!("invalid panel config {}", path.display()))?,
        Err(err) if err.kind() == ErrorKind::NotFound => PanelSettings::default(),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };

    if let Some(v) = env("APP__SOUND_COMMAND") {
        settings.hooks.sound_command = Some(v);
    }
    if let Some(v) = env("APP__NOTES_COMMAND") {
        settings.hooks.notes_command = Some(v);
    }
    if let Some(v) = env("APP__RESOLUTION_COMMAND") {
        settings.hooks.resolution_command = Some(v);
    }

    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
