use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropFactors {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl CropFactors {
    const fn new(top: u32, bottom: u32, left: u32, right: u32) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }
}

/// Scene and source names of the production the panel controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelLayout {
    pub notes_scene: String,
    pub gallery_source: String,
    pub resizeable_gallery_scenes: Vec<String>,
    pub gallery_scenes: Vec<String>,
    pub safe_scenes: Vec<String>,
    pub remote_scenes: Vec<String>,
    pub audio_input: String,
    pub broadcaster_input: String,
    pub jingle_file: Option<String>,
    pub default_gallery_size: f64,
    /// Keyed by layout: the number of people in the gallery, or `none`.
    pub crop_factors: BTreeMap<String, CropFactors>,
}

impl Default for PanelLayout {
    fn default() -> Self {
        let resizeable: Vec<String> = [
            "Screenshare",
            "ScreenshareCrop",
            "ScreenshareLandscape",
            "BroadcasterScreen",
            "Notes",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        let mut gallery_scenes = resizeable.clone();
        gallery_scenes.push("Gallery".into());

        Self {
            notes_scene: "Notes".into(),
            gallery_source: "ZoomGalleryCapture".into(),
            resizeable_gallery_scenes: resizeable,
            gallery_scenes,
            safe_scenes: vec!["Title".into(), "Notes".into(), "Empty".into()],
            remote_scenes: vec!["Screenshare".into(), "ScreenshareCrop".into()],
            audio_input: "Instructors".into(),
            broadcaster_input: "BroadcasterMic".into(),
            jingle_file: None,
            default_gallery_size: 0.25,
            crop_factors: BTreeMap::from([
                ("none".into(), CropFactors::new(0, 0, 0, 0)),
                ("1".into(), CropFactors::new(0, 0, 59, 59)),
                ("2".into(), CropFactors::new(90, 0, 12, 12)),
                ("3".into(), CropFactors::new(4, 0, 60, 60)),
                ("5".into(), CropFactors::new(50, 0, 11, 11)),
            ]),
        }
    }
}

impl PanelLayout {
    pub fn from_toml_str(raw: &str) -> Result<Self, SyncError> {
        toml::from_str(raw).map_err(|err| SyncError::Config(err.to_string()))
    }

    pub fn is_safe_scene(&self, scene: &str) -> bool {
        self.safe_scenes.iter().any(|s| s == scene)
    }

    pub fn is_remote_scene(&self, scene: &str) -> bool {
        self.remote_scenes.iter().any(|s| s == scene)
    }

    /// Crop factors for a gallery-crop value (`null`, a person count, or a key).
    pub fn crop_for(&self, value: &Value) -> Option<CropFactors> {
        let key = match value {
            Value::Null => "none".to_string(),
            Value::Number(n) => n
                .as_i64()
                .map(|n| n.to_string())
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| (f as i64).to_string()))?,
            Value::String(s) => s.clone(),
            _ => return None,
        };
        self.crop_factors.get(&key).copied()
    }
}
