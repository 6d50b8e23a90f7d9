use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{ApiError, AppState};
use crate::db::TaskStatus;
use crate::pipeline::{NewsItem, UPSTREAM_UNAVAILABLE};
use crate::util::timestamp;
use crate::TARGET_WEB_REQUEST;

pub fn mount(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/api/events/search", post(search))
        .route("/api/events/analyze", post(analyze))
        .route("/api/events/news", post(news))
        .route("/api/events/analysis/{task_id}", get(analysis_status))
}

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    input: String,
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    event_name: String,
    #[serde(default)]
    news_list: Vec<NewsItem>,
}

#[derive(Deserialize)]
struct NewsRequest {
    #[serde(default)]
    event_name: String,
}

/// Returns collected news right away; analysis continues under `event_id`.
async fn search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let input = request.input.trim();
    if input.is_empty() {
        return Err(ApiError::bad_request("please enter an event name"));
    }
    info!(target: TARGET_WEB_REQUEST, "search for '{}'", input);

    let tracked = state.orchestrator.search_then_track(input).await?;
    Ok(Json(json!({
        "message": "search succeeded",
        "event_id": tracked.task_id,
        "event_name": tracked.event_name,
        "news_list": tracked.news_list,
        "analysis_status": tracked.status,
    })))
}

async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let event_name = request.event_name.trim();
    if event_name.is_empty() {
        return Err(ApiError::bad_request("event_name must not be empty"));
    }
    if request.news_list.is_empty() {
        return Err(ApiError::bad_request("news_list must not be empty"));
    }

    let result = state
        .orchestrator
        .analyzer()
        .analyze(event_name, request.news_list)
        .await;
    Ok(Json(json!({ "message": "analysis succeeded", "data": result })))
}

async fn news(
    State(state): State<AppState>,
    payload: Result<Json<NewsRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let event_name = request.event_name.trim();
    if event_name.is_empty() {
        return Err(ApiError::bad_request("event_name must not be empty"));
    }

    let collection = state
        .orchestrator
        .collector()
        .collect(event_name)
        .await
        .map_err(|e| {
            warn!(target: TARGET_WEB_REQUEST, "news for '{}' unavailable: {}", event_name, e);
            ApiError::internal(UPSTREAM_UNAVAILABLE)
        })?;
    Ok(Json(json!({ "message": "news collected", "data": collection })))
}

/// `{status, data|error, timestamp}`; the timestamp is when the task finished,
/// or when it was created while still pending.
async fn analysis_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let Some(task) = state.orchestrator.store().get(&task_id).await? else {
        return Err(ApiError::not_found("analysis task not found"));
    };

    let at = timestamp(task.completed_at.unwrap_or(task.created_at));
    let body = match task.status {
        TaskStatus::Pending => json!({ "status": task.status, "timestamp": at }),
        TaskStatus::Completed => json!({ "status": task.status, "data": task.result, "timestamp": at }),
        TaskStatus::Failed => json!({ "status": task.status, "error": task.error, "timestamp": at }),
    };
    Ok(Json(body))
}
