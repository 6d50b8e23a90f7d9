use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::envelope::extract_payload;
use super::{GatewayError, Payload, WorkflowGateway};
use crate::TARGET_WORKFLOW_REQUEST;

/// Longest slice of an error body kept in logs and errors.
const MAX_ERROR_BODY: usize = 512;

/// Calls the workflow engine's single run endpoint over HTTPS.
#[derive(Clone, Debug)]
pub struct HttpWorkflowGateway {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpWorkflowGateway {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        })
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}

#[async_trait]
impl WorkflowGateway for HttpWorkflowGateway {
    async fn call(
        &self,
        workflow_id: &str,
        parameters: Value,
        timeout: Duration,
    ) -> Result<Payload, GatewayError> {
        let start = Instant::now();
        let request = json!({
            "workflow_id": workflow_id,
            "parameters": parameters,
        });

        debug!(target: TARGET_WORKFLOW_REQUEST, "workflow {}: sending request {}", workflow_id, request);

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.token)
            .json(&request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!(target: TARGET_WORKFLOW_REQUEST, "workflow {}: timed out after {:?}", workflow_id, timeout);
                    GatewayError::Timeout(timeout)
                } else {
                    error!(target: TARGET_WORKFLOW_REQUEST, "workflow {}: request failed: {}", workflow_id, e);
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(timeout)
            } else {
                GatewayError::Transport(e.to_string())
            }
        })?;

        if status != StatusCode::OK {
            error!(target: TARGET_WORKFLOW_REQUEST, "workflow {}: status {} - {}", workflow_id, status, truncate(&body));
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        let envelope: Value = serde_json::from_str(&body).map_err(|e| {
            error!(target: TARGET_WORKFLOW_REQUEST, "workflow {}: response is not JSON: {}", workflow_id, e);
            GatewayError::Envelope(format!("response is not JSON: {}", e))
        })?;

        let payload = extract_payload(&envelope).inspect_err(|e| {
            error!(target: TARGET_WORKFLOW_REQUEST, "workflow {}: {}", workflow_id, e);
        })?;

        info!(target: TARGET_WORKFLOW_REQUEST, "workflow {}: completed in {:?}", workflow_id, start.elapsed());
        Ok(payload)
    }
}
