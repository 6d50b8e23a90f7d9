use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::workflow::WorkflowGateway;
use crate::TARGET_WORKFLOW_REQUEST;

/// Phrases the identification workflow returns when the input does not name an event.
pub const REJECTION_PHRASES: &[&str] = &[
    "您输入的内容与事件无关，请输入事件名称。",
    "您输入的内容与事件无关，请输入事件名称",
    "输入内容与事件无关，请重新输入。",
];

/// Reason given when identification fails without a specific phrase.
pub const GENERIC_REJECTION: &str = "Unable to identify an event from the input, please try again.";

/// Why an input was not accepted as an event name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejected(pub String);

/// Stage 1: normalizes free text into a canonical event name.
#[derive(Clone)]
pub struct EventNameResolver {
    gateway: Arc<dyn WorkflowGateway>,
    workflow_id: String,
    timeout: Duration,
}

impl EventNameResolver {
    pub fn new(gateway: Arc<dyn WorkflowGateway>, workflow_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            gateway,
            workflow_id: workflow_id.into(),
            timeout,
        }
    }

    pub async fn resolve(&self, raw_input: &str) -> Result<String, Rejected> {
        let payload = match self
            .gateway
            .call(&self.workflow_id, json!({ "input": raw_input }), self.timeout)
            .await
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!(target: TARGET_WORKFLOW_REQUEST, "event identification failed for '{}': {}", raw_input, e);
                return Err(Rejected(GENERIC_REJECTION.to_string()));
            }
        };

        // The sentinel may arrive in event_name or in any other text field.
        let sentinel = payload
            .values()
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|text| REJECTION_PHRASES.contains(text));
        if let Some(phrase) = sentinel {
            info!(target: TARGET_WORKFLOW_REQUEST, "input '{}' rejected as unrelated to any event", raw_input);
            return Err(Rejected(phrase.to_string()));
        }

        match payload
            .get("event_name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            Some(name) => {
                info!(target: TARGET_WORKFLOW_REQUEST, "input '{}' identified as '{}'", raw_input, name);
                Ok(name.to_string())
            }
            None => {
                warn!(target: TARGET_WORKFLOW_REQUEST, "identification payload for '{}' has no event_name", raw_input);
                Err(Rejected(GENERIC_REJECTION.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{object, ScriptedGateway};
    use crate::workflow::GatewayError;

    fn resolver(gateway: ScriptedGateway) -> EventNameResolver {
        EventNameResolver::new(Arc::new(gateway), "identify", Duration::from_secs(1))
    }

    #[tokio::test]
    async fn returns_canonical_name() {
        let gateway = ScriptedGateway::new()
            .on("identify", |_| Ok(object(json!({"event_name": " 北京暴雨 "}))));
        assert_eq!(resolver(gateway).resolve("北京 暴雨").await, Ok("北京暴雨".to_string()));
    }

    #[tokio::test]
    async fn sends_input_parameter() {
        let gateway = Arc::new(
            ScriptedGateway::new().on("identify", |_| Ok(object(json!({"event_name": "x"})))),
        );
        let resolver = EventNameResolver::new(gateway.clone(), "identify", Duration::from_secs(1));
        resolver.resolve("raw text").await.unwrap();
        assert_eq!(gateway.calls(), vec![("identify".to_string(), json!({"input": "raw text"}))]);
    }

    #[tokio::test]
    async fn sentinel_phrase_is_returned_verbatim() {
        let gateway = ScriptedGateway::new().on("identify", |_| {
            Ok(object(json!({"event_name": "您输入的内容与事件无关，请输入事件名称。"})))
        });
        assert_eq!(
            resolver(gateway).resolve("随便输入的内容").await,
            Err(Rejected("您输入的内容与事件无关，请输入事件名称。".to_string()))
        );
    }

    #[tokio::test]
    async fn sentinel_in_another_field_is_recognized() {
        let gateway = ScriptedGateway::new()
            .on("identify", |_| Ok(object(json!({"output": "输入内容与事件无关，请重新输入。"}))));
        assert_eq!(
            resolver(gateway).resolve("hello").await,
            Err(Rejected("输入内容与事件无关，请重新输入。".to_string()))
        );
    }

    #[tokio::test]
    async fn gateway_failure_is_a_generic_rejection() {
        let gateway = ScriptedGateway::new()
            .on("identify", |_| Err(GatewayError::Timeout(Duration::from_secs(1))));
        assert_eq!(
            resolver(gateway).resolve("x").await,
            Err(Rejected(GENERIC_REJECTION.to_string()))
        );
    }

    #[tokio::test]
    async fn missing_event_name_is_a_generic_rejection() {
        let gateway = ScriptedGateway::new().on("identify", |_| Ok(object(json!({"name": "x"}))));
        assert_eq!(
            resolver(gateway).resolve("x").await,
            Err(Rejected(GENERIC_REJECTION.to_string()))
        );
    }
}
