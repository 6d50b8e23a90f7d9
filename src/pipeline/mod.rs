//! The three-stage event pipeline: identify, collect, analyze.

pub mod analyzer;
pub mod collector;
pub mod dispatch;
pub mod orchestrator;
pub mod resolver;
pub mod types;

pub use analyzer::EventAnalyzer;
pub use collector::{CollectError, NewsCollector};
pub use dispatch::AnalysisDispatcher;
pub use orchestrator::{SearchError, SearchOrchestrator, TrackedSearch, UPSTREAM_UNAVAILABLE};
pub use resolver::{EventNameResolver, Rejected};
pub use types::{AnalysisResult, NewsCollection, NewsItem, ANALYSIS_UNAVAILABLE};

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::workflow::{GatewayError, Payload, WorkflowGateway};

    type Handler = Box<dyn Fn(&Value) -> Result<Payload, GatewayError> + Send + Sync>;

    pub(crate) fn object(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            other => panic!("expected a JSON object, got {}", other),
        }
    }

    /// Answers workflow calls from per-workflow closures and records every call.
    #[derive(Default)]
    pub(crate) struct ScriptedGateway {
        handlers: HashMap<String, Handler>,
        delays: HashMap<String, Duration>,
        calls: Mutex<Vec<(String, Value)>>,
        timeouts: Mutex<Vec<(String, Duration)>>,
    }

    impl ScriptedGateway {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn on<F>(mut self, workflow_id: &str, handler: F) -> Self
        where
            F: Fn(&Value) -> Result<Payload, GatewayError> + Send + Sync + 'static,
        {
            self.handlers.insert(workflow_id.to_string(), Box::new(handler));
            self
        }

        pub(crate) fn with_delay(mut self, workflow_id: &str, delay: Duration) -> Self {
            self.delays.insert(workflow_id.to_string(), delay);
            self
        }

        pub(crate) fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }

        /// The timeout each call was made with, in call order.
        pub(crate) fn timeouts(&self) -> Vec<(String, Duration)> {
            self.timeouts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WorkflowGateway for ScriptedGateway {
        async fn call(
            &self,
            workflow_id: &str,
            parameters: Value,
            timeout: Duration,
        ) -> Result<Payload, GatewayError> {
            self.timeouts
                .lock()
                .unwrap()
                .push((workflow_id.to_string(), timeout));
            self.calls
                .lock()
                .unwrap()
                .push((workflow_id.to_string(), parameters.clone()));
            if let Some(delay) = self.delays.get(workflow_id) {
                tokio::time::sleep(*delay).await;
            }
            match self.handlers.get(workflow_id) {
                Some(handler) => handler(&parameters),
                None => Err(GatewayError::Status {
                    status: 404,
                    body: format!("no script for workflow {}", workflow_id),
                }),
            }
        }
    }
}
