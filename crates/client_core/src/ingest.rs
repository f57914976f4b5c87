use serde_json::Value;
use shared::{
    error::MalformedEnvelope,
    names::{self, mute_name, volume_name},
    protocol::event,
};

use crate::remote::RemoteEvent;

pub type Routed = Result<(String, Value), MalformedEnvelope>;

/// Maps one remote event onto `(logical name, value)` updates.
pub fn route_event(remote_event: &RemoteEvent) -> Vec<Routed> {
    let data = &remote_event.event_data;
    match remote_event.event_type.as_str() {
        event::CUSTOM_EVENT => route_envelope(data),
        event::CURRENT_PROGRAM_SCENE_CHANGED => vec![field(data, "sceneName", names::SCENE)
            .map(|value| (names::SCENE.to_string(), value))],
        event::INPUT_MUTE_STATE_CHANGED => vec![input_update(data, "inputMuted", mute_name)],
        event::INPUT_VOLUME_CHANGED => vec![input_update(data, "inputVolumeDb", volume_name)],
        _ => Vec::new(),
    }
}

fn route_envelope(data: &Value) -> Vec<Routed> {
    let Some(entries) = data.as_object() else {
        return vec![Err(MalformedEnvelope::new(
            "",
            format!("custom event payload is not an object: {data}"),
        ))];
    };
    entries
        .iter()
        .map(|(name, value)| {
            if name.is_empty() {
                Err(MalformedEnvelope::new(name, "empty value name"))
            } else {
                Ok((name.clone(), value.clone()))
            }
        })
        .collect()
}

fn field(data: &Value, key: &str, name: &str) -> Result<Value, MalformedEnvelope> {
    data.get(key)
        .cloned()
        .ok_or_else(|| MalformedEnvelope::new(name, format!("missing field {key}")))
}

fn input_update(data: &Value, key: &str, to_name: fn(&str) -> String) -> Routed {
    let input = data
        .get("inputName")
        .and_then(Value::as_str)
        .filter(|input| !input.is_empty())
        .ok_or_else(|| MalformedEnvelope::new(to_name("?"), "missing inputName"))?;
    let name = to_name(input);
    let value = field(data, key, &name)?;
    Ok((name, value))
}

#[cfg(test)]
#[path = "tests/ingest_tests.rs"]
mod tests;
