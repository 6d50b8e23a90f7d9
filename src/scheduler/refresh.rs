use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::db::favorite::FavoriteError;
use crate::db::{Database, FavoriteRecord};
use crate::pipeline::{SearchError, SearchOrchestrator};
use crate::{TARGET_DB, TARGET_WORKFLOW_REQUEST};

#[derive(Debug, Error)]
enum RefreshError {
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error("analysis unavailable, keeping previous summary")]
    Degraded,
    #[error(transparent)]
    Favorite(#[from] FavoriteError),
}

/// Outcome counts of one batch run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub total: usize,
    pub refreshed: usize,
    pub failed: usize,
}

/// Re-runs the full pipeline for every favorite, one at a time.
pub struct RefreshScheduler {
    db: Database,
    orchestrator: Arc<SearchOrchestrator>,
}

impl RefreshScheduler {
    pub fn new(db: Database, orchestrator: Arc<SearchOrchestrator>) -> Self {
        Self { db, orchestrator }
    }

    /// Refreshes every favorite. A failing favorite is logged and skipped;
    /// updates already committed in the same run are kept.
    pub async fn run_once(&self) -> RefreshSummary {
        let favorites = match self.db.list_all_favorites().await {
            Ok(favorites) => favorites,
            Err(e) => {
                error!(target: TARGET_DB, "favorite refresh could not list favorites: {}", e);
                return RefreshSummary::default();
            }
        };

        let mut summary = RefreshSummary {
            total: favorites.len(),
            ..Default::default()
        };
        info!(target: TARGET_WORKFLOW_REQUEST, "refreshing {} favorites", summary.total);

        for favorite in &favorites {
            match self.refresh(favorite).await {
                Ok(()) => {
                    summary.refreshed += 1;
                    info!(target: TARGET_WORKFLOW_REQUEST, "refreshed favorite {} '{}'", favorite.id, favorite.event_name);
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(target: TARGET_WORKFLOW_REQUEST, "refresh of favorite {} '{}' failed: {}", favorite.id, favorite.event_name, e);
                }
            }
        }

        info!(
            target: TARGET_WORKFLOW_REQUEST,
            total = summary.total,
            refreshed = summary.refreshed,
            failed = summary.failed,
            "favorite refresh finished"
        );
        summary
    }

    async fn refresh(&self, favorite: &FavoriteRecord) -> Result<(), RefreshError> {
        let result = self.orchestrator.search_and_analyze(&favorite.event_name).await?;
        if result.is_degraded() {
            return Err(RefreshError::Degraded);
        }
        self.db
            .apply_favorite_refresh(favorite.id, &result, Utc::now())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis_store::AnalysisResultStore;
    use crate::db::NewFavorite;
    use crate::environment::{WorkflowIds, WorkflowSettings};
    use crate::pipeline::testing::{object, ScriptedGateway};
    use crate::pipeline::AnalysisDispatcher;
    use crate::workflow::GatewayError;
    use serde_json::json;
    use std::time::Duration;

    fn gateway() -> ScriptedGateway {
        ScriptedGateway::new()
            .on("identify", |params| Ok(object(json!({"event_name": params["input"]}))))
            .on("collect", |params| {
                if params["keyword"] == json!("broken event") {
                    return Err(GatewayError::Timeout(Duration::from_secs(1)));
                }
                Ok(object(json!({"event_name": params["keyword"], "news_list": ["n1"]})))
            })
            .on("analyze", |params| {
                if params["event_name"] == json!("slow event") {
                    return Err(GatewayError::Timeout(Duration::from_secs(2)));
                }
                Ok(object(json!({
                    "event_name": params["event_name"],
                    "event_overview": "fresh overview",
                    "timeline": [{"time": "today", "event": "update"}]
                })))
            })
    }

    async fn scheduler(db: &Database) -> RefreshScheduler {
        let settings = WorkflowSettings {
            base_url: "http://unused".to_string(),
            token: "unused".to_string(),
            ids: WorkflowIds {
                identify: "identify".to_string(),
                collect: "collect".to_string(),
                analyze: "analyze".to_string(),
            },
            stage_timeout: Duration::from_secs(1),
            analysis_timeout: Duration::from_secs(1),
        };
        let store = Arc::new(AnalysisResultStore::new(db.clone()));
        let orchestrator =
            SearchOrchestrator::new(Arc::new(gateway()), &settings, store, AnalysisDispatcher::new(1));
        RefreshScheduler::new(db.clone(), Arc::new(orchestrator))
    }

    async fn seed(db: &Database, names: &[&str]) -> Vec<FavoriteRecord> {
        let user = db.create_user("13800000000", Utc::now()).await.unwrap();
        let mut seeded = Vec::new();
        for name in names {
            let favorite = NewFavorite {
                event_name: name.to_string(),
                event_overview: Some("stale overview".to_string()),
                ..Default::default()
            };
            seeded.push(db.add_favorite(user.id, &favorite).await.unwrap());
        }
        seeded
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_batch() {
        let db = Database::in_memory().await.unwrap();
        let seeded = seed(&db, &["first event", "broken event", "third event"]).await;

        let summary = scheduler(&db).await.run_once().await;
        assert_eq!(
            summary,
            RefreshSummary {
                total: 3,
                refreshed: 2,
                failed: 1
            }
        );

        for (before, expect_refreshed) in seeded.iter().zip([true, false, true]) {
            let after = db.get_favorite(before.user_id, before.id).await.unwrap();
            let overview = after.event_overview.as_deref();
            if expect_refreshed {
                assert_eq!(overview, Some("fresh overview"));
                assert_eq!(after.timeline, Some(json!([{"time": "today", "event": "update"}])));
                assert!(after.last_refresh >= before.last_refresh);
            } else {
                assert_eq!(overview, Some("stale overview"));
                assert_eq!(after.last_refresh, before.last_refresh);
            }
        }
    }

    #[tokio::test]
    async fn degraded_analysis_keeps_previous_summary() {
        let db = Database::in_memory().await.unwrap();
        let seeded = seed(&db, &["slow event"]).await;

        let summary = scheduler(&db).await.run_once().await;
        assert_eq!(summary.failed, 1);

        let favorite = db.get_favorite(seeded[0].user_id, seeded[0].id).await.unwrap();
        assert_eq!(favorite.event_overview.as_deref(), Some("stale overview"));
        assert_eq!(favorite.last_refresh, seeded[0].last_refresh);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let db = Database::in_memory().await.unwrap();
        assert_eq!(scheduler(&db).await.run_once().await, RefreshSummary::default());
    }
}
