use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::types::NewsCollection;
use crate::workflow::{GatewayError, WorkflowGateway};
use crate::TARGET_WORKFLOW_REQUEST;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("collection payload has no event_name")]
    MissingEventName,
    #[error("collection payload has no news")]
    EmptyNewsList,
}

/// Stage 2: fetches the ordered news list for a canonical event name.
#[derive(Clone)]
pub struct NewsCollector {
    gateway: Arc<dyn WorkflowGateway>,
    workflow_id: String,
    timeout: Duration,
}

impl NewsCollector {
    pub fn new(gateway: Arc<dyn WorkflowGateway>, workflow_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            gateway,
            workflow_id: workflow_id.into(),
            timeout,
        }
    }

    /// The returned event name may be further normalized than `event_name`;
    /// later stages should use it.
    pub async fn collect(&self, event_name: &str) -> Result<NewsCollection, CollectError> {
        let mut payload = self
            .gateway
            .call(&self.workflow_id, json!({ "keyword": event_name }), self.timeout)
            .await?;

        let canonical = payload
            .get("event_name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or(CollectError::MissingEventName)?;

        let news_list = match payload.remove("news_list") {
            Some(Value::Array(items)) if !items.is_empty() => items,
            _ => {
                warn!(target: TARGET_WORKFLOW_REQUEST, "no news collected for '{}'", event_name);
                return Err(CollectError::EmptyNewsList);
            }
        };

        info!(target: TARGET_WORKFLOW_REQUEST, "collected {} news items for '{}'", news_list.len(), canonical);
        Ok(NewsCollection {
            event_name: canonical,
            news_list,
        })
    }
}
