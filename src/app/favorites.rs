use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use super::{ApiError, AppState};
use crate::auth::AuthUser;
use crate::db::NewFavorite;
use crate::pipeline::AnalysisResult;
use crate::TARGET_WEB_REQUEST;

pub fn mount(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/api/favorites", get(list).post(add))
        .route("/api/favorites/{favorite_id}", delete(remove))
        .route("/api/favorites/{favorite_id}/refresh", post(refresh))
}

async fn list(State(state): State<AppState>, user: AuthUser) -> Result<Json<Value>, ApiError> {
    let favorites = state.db.list_favorites(user.user_id).await?;
    Ok(Json(json!({ "message": "ok", "data": favorites })))
}

/// Accepts a search result as-is; only `event_name` is required.
async fn add(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(body) = payload?;
    let result = body
        .as_object()
        .and_then(AnalysisResult::from_payload)
        .ok_or_else(|| ApiError::bad_request("event_name is required"))?;

    let favorite = state
        .db
        .add_favorite(user.user_id, &NewFavorite::from(&result))
        .await?;
    info!(target: TARGET_WEB_REQUEST, "user {} added favorite '{}'", user.user_id, favorite.event_name);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "favorite added", "data": favorite })),
    ))
}

async fn remove(
    State(state): State<AppState>,
    user: AuthUser,
    Path(favorite_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.db.delete_favorite(user.user_id, favorite_id).await?;
    Ok(Json(json!({ "message": "favorite deleted" })))
}

/// Re-runs the full pipeline for one favorite. An analysis that comes back
/// degraded leaves the stored summary untouched.
async fn refresh(
    State(state): State<AppState>,
    user: AuthUser,
    Path(favorite_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let favorite = state.db.get_favorite(user.user_id, favorite_id).await?;

    let result = state
        .orchestrator
        .search_and_analyze(&favorite.event_name)
        .await?;
    if result.is_degraded() {
        return Ok(Json(json!({ "message": "no new analysis available", "data": favorite })));
    }

    state
        .db
        .apply_favorite_refresh(favorite.id, &result, Utc::now())
        .await?;
    let favorite = state.db.get_favorite(user.user_id, favorite_id).await?;
    info!(target: TARGET_WEB_REQUEST, "user {} refreshed favorite '{}'", user.user_id, favorite.event_name);

    Ok(Json(json!({ "message": "favorite refreshed", "data": favorite })))
}
