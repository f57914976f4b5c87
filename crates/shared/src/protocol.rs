use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const SUBPROTOCOL: &str = "obswebsocket.json";
pub const RPC_VERSION: u32 = 1;
pub const DEFAULT_PORT: u16 = 4455;
pub const PROFILE_REALM: &str = "OBS_WEBSOCKET_DATA_REALM_PROFILE";

pub mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const REIDENTIFY: u8 = 3;
    pub const EVENT: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
    pub const REQUEST_BATCH: u8 = 8;
    pub const REQUEST_BATCH_RESPONSE: u8 = 9;
}

/// Bitmask values for `Identify.eventSubscriptions`.
pub mod subscription {
    pub const GENERAL: u32 = 1 << 0;
    pub const CONFIG: u32 = 1 << 1;
    pub const SCENES: u32 = 1 << 2;
    pub const INPUTS: u32 = 1 << 3;
    pub const TRANSITIONS: u32 = 1 << 4;
    pub const FILTERS: u32 = 1 << 5;
    pub const OUTPUTS: u32 = 1 << 6;
    pub const SCENE_ITEMS: u32 = 1 << 7;
    pub const MEDIA_INPUTS: u32 = 1 << 8;

    pub const PANEL_DEFAULT: u32 = GENERAL | SCENES | INPUTS | MEDIA_INPUTS;
}

pub mod event {
    pub const CUSTOM_EVENT: &str = "CustomEvent";
    pub const CURRENT_PROGRAM_SCENE_CHANGED: &str = "CurrentProgramSceneChanged";
    pub const INPUT_MUTE_STATE_CHANGED: &str = "InputMuteStateChanged";
    pub const INPUT_VOLUME_CHANGED: &str = "InputVolumeChanged";
    pub const MEDIA_INPUT_PLAYBACK_STARTED: &str = "MediaInputPlaybackStarted";
}

/// One websocket text message: `{"op": <u8>, "d": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
}

impl RawFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub obs_web_socket_version: String,
    pub rpc_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    pub event_subscriptions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub negotiated_rpc_version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reidentify {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_subscriptions: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub event_intent: u32,
    #[serde(default)]
    pub event_data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub request_type: String,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub request_data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatus {
    pub result: bool,
    pub code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObsMessage {
    Hello(Hello),
    Identify(Identify),
    Identified(Identified),
    Reidentify(Reidentify),
    Event(Event),
    Request(Request),
    RequestResponse(RequestResponse),
    /// Batches and future op codes, kept verbatim.
    Other(RawFrame),
}

fn decode<T: DeserializeOwned>(d: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(d)
}

impl ObsMessage {
    pub fn from_frame(frame: RawFrame) -> Result<Self, serde_json::Error> {
        Ok(match frame.op {
            op::HELLO => Self::Hello(decode(frame.d)?),
            op::IDENTIFY => Self::Identify(decode(frame.d)?),
            op::IDENTIFIED => Self::Identified(decode(frame.d)?),
            op::REIDENTIFY => Self::Reidentify(decode(frame.d)?),
            op::EVENT => Self::Event(decode(frame.d)?),
            op::REQUEST => Self::Request(decode(frame.d)?),
            op::REQUEST_RESPONSE => Self::RequestResponse(decode(frame.d)?),
            _ => Self::Other(frame),
        })
    }

    pub fn into_frame(self) -> Result<RawFrame, serde_json::Error> {
        let (op, d) = match self {
            Self::Hello(m) => (op::HELLO, serde_json::to_value(m)?),
            Self::Identify(m) => (op::IDENTIFY, serde_json::to_value(m)?),
            Self::Identified(m) => (op::IDENTIFIED, serde_json::to_value(m)?),
            Self::Reidentify(m) => (op::REIDENTIFY, serde_json::to_value(m)?),
            Self::Event(m) => (op::EVENT, serde_json::to_value(m)?),
            Self::Request(m) => (op::REQUEST, serde_json::to_value(m)?),
            Self::RequestResponse(m) => (op::REQUEST_RESPONSE, serde_json::to_value(m)?),
            Self::Other(frame) => return Ok(frame),
        };
        Ok(RawFrame { op, d })
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        Self::from_frame(RawFrame::parse(text)?)
    }

    pub fn to_text(self) -> Result<String, serde_json::Error> {
        self.into_frame()?.to_text()
    }
}

/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
pub fn authentication_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = STANDARD.encode(Sha256::digest(format!("{password}{salt}").as_bytes()));
    STANDARD.encode(Sha256::digest(format!("{secret}{challenge}").as_bytes()))
}
