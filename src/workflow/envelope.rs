use serde_json::Value;
use tracing::debug;

use super::{GatewayError, Payload};
use crate::TARGET_WORKFLOW_REQUEST;

type Strategy = fn(&Payload) -> Option<Payload>;

/// Extraction strategies, tried in order. The first one that yields an object wins.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("top_level", top_level),
    ("content", content),
    ("data", data),
];

/// Pulls the workflow payload out of a response body.
///
/// The payload may be the body itself, or a JSON document encoded as a string
/// under `content` or `data`. A non-zero numeric `code` marks an engine-side error.
pub fn extract_payload(body: &Value) -> Result<Payload, GatewayError> {
    let envelope = body
        .as_object()
        .ok_or_else(|| GatewayError::Envelope("response body is not a JSON object".to_string()))?;

    if let Some(code) = envelope.get("code").and_then(Value::as_i64) {
        if code != 0 {
            let message = envelope
                .get("msg")
                .or_else(|| envelope.get("message"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(GatewayError::Upstream { code, message });
        }
    }

    STRATEGIES
        .iter()
        .find_map(|(name, strategy)| {
            let payload = strategy(envelope)?;
            debug!(target: TARGET_WORKFLOW_REQUEST, "workflow payload extracted from {}", name);
            Some(payload)
        })
        .ok_or_else(|| {
            GatewayError::Envelope("no structured payload in top level, content or data".to_string())
        })
}

/// The body is the payload unless it carries one of the wrapper keys.
fn top_level(envelope: &Payload) -> Option<Payload> {
    if envelope.contains_key("content") || envelope.contains_key("data") {
        return None;
    }
    Some(envelope.clone())
}

fn content(envelope: &Payload) -> Option<Payload> {
    embedded(envelope.get("content")?)
}

fn data(envelope: &Payload) -> Option<Payload> {
    embedded(envelope.get("data")?)
}

fn embedded(value: &Value) -> Option<Payload> {
    match value {
        Value::Object(map) => Some(map.clone()),
        Value::String(raw) => match serde_json::from_str::<Value>(raw).ok()? {
            Value::Object(map) => Some(map),
            // Some workflows encode their output twice.
            Value::String(inner) => match serde_json::from_str::<Value>(&inner).ok()? {
                Value::Object(map) => Some(map),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}
