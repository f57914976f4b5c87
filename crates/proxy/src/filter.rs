use std::collections::HashSet;

use serde_json::Value;
use shared::protocol::{op, RawFrame};
use thiserror::Error;

pub const DEFAULT_ALLOWED_REQUESTS: &[&str] = &[
    "GetVersion",
    "GetRecordStatus",
    "GetStreamStatus",
    "GetPersistentData",
    "SetPersistentData",
    "BroadcastCustomEvent",
    "GetSceneList",
    "GetCurrentProgramScene",
    "SetCurrentProgramScene",
    "GetSceneItemId",
    "GetSceneItemList",
    "SetSceneItemEnabled",
    "GetInputMute",
    "SetInputMute",
    "GetInputVolume",
    "SetInputVolume",
    "GetMediaInputStatus",
    "GetInputSettings",
    "SetInputSettings",
    "TriggerMediaInputAction",
    "GetSceneItemTransform",
    "SetSceneItemTransform",
    "GetSourceScreenshot",
];

/// `SetInputSettings` may only touch these keys.
pub const INPUT_SETTINGS_KEYS: &[&str] = &["local_file", "overlay", "text", "font"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error("unparseable frame: {0}")]
    Unparseable(String),
    #[error("request {0} is not allowed")]
    RequestNotAllowed(String),
    #[error("SetInputSettings touches disallowed keys {0:?}")]
    InputSettingsNotAllowed(Vec<String>),
    #[error("request batches are not supported")]
    Batch,
    #[error("op {0} is not accepted from clients")]
    UnexpectedOp(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Forward,
    Drop(DropReason),
}

#[derive(Debug, Clone)]
pub struct RequestFilter {
    allowed: HashSet<String>,
}

impl Default for RequestFilter {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_REQUESTS.iter().copied())
    }
}

impl RequestFilter {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, request_type: &str) -> bool {
        self.allowed.contains(request_type)
    }

    pub fn filter_forwarded(&self, text: &str) -> Verdict {
        let frame = match RawFrame::parse(text) {
            Ok(frame) => frame,
            Err(err) => return Verdict::Drop(DropReason::Unparseable(err.to_string())),
        };
        match frame.op {
            op::HELLO | op::IDENTIFY | op::IDENTIFIED | op::REIDENTIFY => Verdict::Forward,
            op::REQUEST => self.check_request(&frame.d),
            op::REQUEST_BATCH => Verdict::Drop(DropReason::Batch),
            other => Verdict::Drop(DropReason::UnexpectedOp(other)),
        }
    }

    fn check_request(&self, d: &Value) -> Verdict {
        let request_type = d
            .get("requestType")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !self.allows(request_type) {
            return Verdict::Drop(DropReason::RequestNotAllowed(request_type.to_string()));
        }
        if request_type == "SetInputSettings" {
            let Some(settings) = d
                .pointer("/requestData/inputSettings")
                .and_then(Value::as_object)
            else {
                return Verdict::Drop(DropReason::InputSettingsNotAllowed(Vec::new()));
            };
            let rejected: Vec<String> = settings
                .keys()
                .filter(|key| !INPUT_SETTINGS_KEYS.contains(&key.as_str()))
                .cloned()
                .collect();
            if !rejected.is_empty() {
                return Verdict::Drop(DropReason::InputSettingsNotAllowed(rejected));
            }
        }
        Verdict::Forward
    }
}

#[cfg(test)]
#[path = "tests/filter_tests.rs"]
mod tests;
