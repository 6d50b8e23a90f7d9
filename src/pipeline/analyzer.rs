use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::types::{AnalysisResult, NewsItem};
use crate::workflow::{GatewayError, WorkflowGateway};
use crate::TARGET_WORKFLOW_REQUEST;

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("analysis payload has no event_name")]
    MissingEventName,
}

/// Stage 3: summarizes an event from its news. Runs with the longest timeout.
#[derive(Clone)]
pub struct EventAnalyzer {
    gateway: Arc<dyn WorkflowGateway>,
    workflow_id: String,
    timeout: Duration,
}

impl EventAnalyzer {
    pub fn new(gateway: Arc<dyn WorkflowGateway>, workflow_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            gateway,
            workflow_id: workflow_id.into(),
            timeout,
        }
    }

    /// Always yields a result. When the workflow cannot be used the result
    /// carries only the inputs and a placeholder overview.
    pub async fn analyze(&self, event_name: &str, news_list: Vec<NewsItem>) -> AnalysisResult {
        match self.try_analyze(event_name, &news_list).await {
            Ok(mut result) => {
                result.news_list = news_list;
                result
            }
            Err(e) => {
                warn!(target: TARGET_WORKFLOW_REQUEST, "analysis of '{}' degraded: {}", event_name, e);
                AnalysisResult::degraded(event_name, news_list)
            }
        }
    }

    async fn try_analyze(
        &self,
        event_name: &str,
        news_list: &[NewsItem],
    ) -> Result<AnalysisResult, AnalyzeError> {
        let payload = self
            .gateway
            .call(
                &self.workflow_id,
                json!({ "event_name": event_name, "news_list": news_list }),
                self.timeout,
            )
            .await?;

        let result = AnalysisResult::from_payload(&payload).ok_or(AnalyzeError::MissingEventName)?;
        info!(target: TARGET_WORKFLOW_REQUEST, "analysis of '{}' completed", result.event_name);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{object, ScriptedGateway};
    use serde_json::Value;

    fn analyzer(gateway: ScriptedGateway) -> EventAnalyzer {
        EventAnalyzer::new(Arc::new(gateway), "analyze", Duration::from_secs(1))
    }

    fn news() -> Vec<Value> {
        vec![json!("headline 1"), json!("headline 2")]
    }

    #[tokio::test]
    async fn full_payload_is_used_with_input_news() {
        let gateway = ScriptedGateway::new().on("analyze", |params| {
            assert_eq!(params["event_name"], json!("北京暴雨"));
            assert_eq!(params["news_list"], json!(["headline 1", "headline 2"]));
            Ok(object(json!({
                "event_name": "北京暴雨",
                "key_men": "应急管理部",
                "event_overview": "overview",
                "key_point": "point",
                "latest": "latest",
                "event_cause": "cause",
                "event_process": "process",
                "event_result": "result",
                "timeline": [{"time": "7月29日", "event": "暴雨开始"}],
                "news_list": ["something else"]
            })))
        });

        let result = analyzer(gateway).analyze("北京暴雨", news()).await;
        assert!(!result.is_degraded());
        assert_eq!(result.event_cause.as_deref(), Some("cause"));
        assert_eq!(result.timeline, Some(json!([{"time": "7月29日", "event": "暴雨开始"}])));
        assert_eq!(result.news_list, news());
    }

    #[tokio::test]
    async fn partial_payload_leaves_fields_empty() {
        let gateway = ScriptedGateway::new().on("analyze", |_| {
            Ok(object(json!({"event_name": "北京暴雨", "event_overview": "only this"})))
        });

        let result = analyzer(gateway).analyze("北京暴雨", news()).await;
        assert!(!result.is_degraded());
        assert_eq!(result.event_overview.as_deref(), Some("only this"));
        assert!(result.key_point.is_none());
        assert!(result.timeline.is_none());
    }

    #[tokio::test]
    async fn timeout_degrades() {
        let gateway = ScriptedGateway::new()
            .on("analyze", |_| Err(GatewayError::Timeout(Duration::from_secs(1))));

        let result = analyzer(gateway).analyze("北京暴雨", news()).await;
        assert!(result.is_degraded());
        assert_eq!(result.event_name, "北京暴雨");
        assert_eq!(result.news_list, news());
    }

    #[tokio::test]
    async fn malformed_payload_degrades() {
        let gateway = ScriptedGateway::new().on("analyze", |_| Ok(object(json!({"unexpected": true}))));

        let result = analyzer(gateway).analyze("北京暴雨", news()).await;
        assert!(result.is_degraded());
        assert_eq!(result.news_list, news());
    }
}
