use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::analyzer::EventAnalyzer;
use super::collector::NewsCollector;
use super::dispatch::AnalysisDispatcher;
use super::resolver::EventNameResolver;
use super::types::{AnalysisResult, NewsCollection, NewsItem};
use crate::analysis_store::{AnalysisResultStore, StoreError, TaskOutcome};
use crate::db::TaskStatus;
use crate::environment::WorkflowSettings;
use crate::workflow::WorkflowGateway;
use crate::TARGET_WORKFLOW_REQUEST;

/// Failure message for a collection stage that produced nothing usable.
pub const UPSTREAM_UNAVAILABLE: &str = "Failed to collect news for this event, please try again later.";

#[derive(Debug, Error)]
pub enum SearchError {
    /// The input does not name an event; carries the reason shown to the user.
    #[error("{0}")]
    RejectedInput(String),
    #[error("news collection is unavailable")]
    UpstreamUnavailable,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Immediate answer of a split search; the analysis continues under `task_id`.
#[derive(Clone, Debug, Serialize)]
pub struct TrackedSearch {
    pub task_id: String,
    pub event_name: String,
    pub news_list: Vec<NewsItem>,
    pub status: TaskStatus,
}

/// Composes the three stages for synchronous and split searches.
pub struct SearchOrchestrator {
    resolver: EventNameResolver,
    collector: NewsCollector,
    analyzer: EventAnalyzer,
    store: Arc<AnalysisResultStore>,
    dispatcher: AnalysisDispatcher,
}

impl SearchOrchestrator {
    pub fn new(
        gateway: Arc<dyn WorkflowGateway>,
        settings: &WorkflowSettings,
        store: Arc<AnalysisResultStore>,
        dispatcher: AnalysisDispatcher,
    ) -> Self {
        Self {
            resolver: EventNameResolver::new(
                gateway.clone(),
                settings.ids.identify.clone(),
                settings.stage_timeout,
            ),
            collector: NewsCollector::new(
                gateway.clone(),
                settings.ids.collect.clone(),
                settings.stage_timeout,
            ),
            analyzer: EventAnalyzer::new(gateway, settings.ids.analyze.clone(), settings.analysis_timeout),
            store,
            dispatcher,
        }
    }

    pub fn store(&self) -> &AnalysisResultStore {
        &self.store
    }

    pub fn collector(&self) -> &NewsCollector {
        &self.collector
    }

    pub fn analyzer(&self) -> &EventAnalyzer {
        &self.analyzer
    }

    /// Stages 1 and 2. Either failure ends the search.
    async fn identify_and_collect(&self, raw_input: &str) -> Result<NewsCollection, SearchError> {
        let event_name = self
            .resolver
            .resolve(raw_input)
            .await
            .map_err(|rejected| SearchError::RejectedInput(rejected.0))?;

        self.collector.collect(&event_name).await.map_err(|e| {
            warn!(target: TARGET_WORKFLOW_REQUEST, "collection for '{}' failed: {}", event_name, e);
            SearchError::UpstreamUnavailable
        })
    }

    /// Full search: resolve, collect, then analyze, all before returning.
    pub async fn search_and_analyze(&self, raw_input: &str) -> Result<AnalysisResult, SearchError> {
        let collection = self.identify_and_collect(raw_input).await?;
        let mut result = self
            .analyzer
            .analyze(&collection.event_name, collection.news_list.clone())
            .await;
        result.news_list = collection.news_list;
        Ok(result)
    }

    /// Split search: returns the news as soon as it is collected and leaves
    /// analysis to a background worker that reports through the result store.
    ///
    /// The pending task is stored before the worker is dispatched.
    pub async fn search_then_track(&self, raw_input: &str) -> Result<TrackedSearch, SearchError> {
        let collection = self.identify_and_collect(raw_input).await?;
        let task = self.store.create_pending(&collection.event_name).await?;

        let analyzer = self.analyzer.clone();
        let store = self.store.clone();
        let task_id = task.id.clone();
        let event_name = collection.event_name.clone();
        let news_list = collection.news_list.clone();

        self.dispatcher.submit(async move {
            let analysis_name = event_name.clone();
            // A panic in analysis surfaces here as a JoinError.
            let outcome = match tokio::spawn(async move {
                analyzer.analyze(&analysis_name, news_list).await
            })
            .await
            {
                Ok(result) => TaskOutcome::Completed(result),
                Err(e) => {
                    error!(target: TARGET_WORKFLOW_REQUEST, "analysis task {} for '{}' aborted: {}", task_id, event_name, e);
                    TaskOutcome::Failed(format!("analysis aborted: {}", e))
                }
            };

            match store.put(&task_id, outcome).await {
                Ok(_) => info!(target: TARGET_WORKFLOW_REQUEST, "analysis task {} for '{}' finished", task_id, event_name),
                Err(e) => error!(target: TARGET_WORKFLOW_REQUEST, "could not record analysis task {}: {}", task_id, e),
            }
        });

        Ok(TrackedSearch {
            task_id: task.id,
            event_name: collection.event_name,
            news_list: collection.news_list,
            status: task.status,
        })
    }
}
