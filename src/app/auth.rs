use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{ApiError, AppState};
use crate::auth::AuthUser;
use crate::db::{DbConstraintErrorExt, UserRecord};
use crate::util::is_valid_phone;
use crate::TARGET_WEB_REQUEST;

const PHONE_TAKEN: &str = "phone number is already registered";

pub fn mount(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/api/auth/send-code", post(send_code))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/profile", get(profile))
}

#[derive(Deserialize)]
struct SendCodeRequest {
    #[serde(default)]
    phone: String,
}

#[derive(Deserialize)]
struct CredentialsRequest {
    #[serde(default)]
    phone: String,
    #[serde(default)]
    code: String,
}

impl CredentialsRequest {
    fn validated(&self) -> Result<(&str, &str), ApiError> {
        let (phone, code) = (self.phone.trim(), self.code.trim());
        if phone.is_empty() || code.is_empty() {
            return Err(ApiError::bad_request("phone and code are required"));
        }
        if !is_valid_phone(phone) {
            return Err(ApiError::bad_request("invalid phone number"));
        }
        Ok((phone, code))
    }
}

fn session_body(message: &str, token: String, user: &UserRecord) -> Json<Value> {
    Json(json!({
        "message": message,
        "token": token,
        "user": { "id": user.id, "phone": user.phone },
    }))
}

async fn send_code(
    State(state): State<AppState>,
    payload: Result<Json<SendCodeRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let phone = request.phone.trim();
    if phone.is_empty() {
        return Err(ApiError::bad_request("phone is required"));
    }
    state.verification.send_code(phone).await?;
    Ok(Json(json!({ "message": "verification code sent" })))
}

async fn register(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(request) = payload?;
    let (phone, code) = request.validated()?;
    state.verification.verify(phone, code).await?;

    if state.db.find_user_by_phone(phone).await?.is_some() {
        return Err(ApiError::conflict(PHONE_TAKEN));
    }
    let now = Utc::now();
    let user = match state.db.create_user(phone, now).await {
        Ok(user) => user,
        Err(e) if e.is_unique_violation() => return Err(ApiError::conflict(PHONE_TAKEN)),
        Err(e) => return Err(e.into()),
    };

    let token = state.sessions.open(user.id, now).await?;
    info!(target: TARGET_WEB_REQUEST, "user {} registered", user.id);
    Ok((StatusCode::CREATED, session_body("registered", token, &user)))
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let (phone, code) = request.validated()?;
    state.verification.verify(phone, code).await?;

    let Some(user) = state.db.find_user_by_phone(phone).await? else {
        return Err(ApiError::not_found("user not found, please register first"));
    };
    let token = state.sessions.open(user.id, Utc::now()).await?;
    info!(target: TARGET_WEB_REQUEST, "user {} logged in", user.id);
    Ok(session_body("logged in", token, &user))
}

async fn logout(State(state): State<AppState>, user: AuthUser) -> Result<Json<Value>, ApiError> {
    state.sessions.revoke(&user.session_id).await?;
    Ok(Json(json!({ "message": "logged out" })))
}

async fn profile(State(state): State<AppState>, user: AuthUser) -> Result<Json<Value>, ApiError> {
    let Some(record) = state.db.find_user(user.user_id).await? else {
        return Err(ApiError::not_found("user not found"));
    };
    Ok(Json(json!({ "user": record })))
}
