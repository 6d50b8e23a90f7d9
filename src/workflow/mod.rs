//! Access to the external workflow engine.
//!
//! Every pipeline stage talks to the engine through [`WorkflowGateway`], which
//! hides transport details and the variably-shaped response envelope. Stages
//! only ever see a JSON object payload or a [`GatewayError`].

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

mod client;
pub mod envelope;

pub use client::HttpWorkflowGateway;

/// A workflow's structured result.
pub type Payload = Map<String, Value>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("workflow request timed out after {0:?}")]
    Timeout(Duration),
    #[error("workflow transport error: {0}")]
    Transport(String),
    #[error("workflow endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("workflow reported error {code}: {message}")]
    Upstream { code: i64, message: String },
    #[error("unusable workflow response: {0}")]
    Envelope(String),
}

#[async_trait]
pub trait WorkflowGateway: Send + Sync {
    /// Runs `workflow_id` with `parameters`, giving up after `timeout`.
    async fn call(
        &self,
        workflow_id: &str,
        parameters: Value,
        timeout: Duration,
    ) -> Result<Payload, GatewayError>;
}
