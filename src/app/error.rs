use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use crate::analysis_store::StoreError;
use crate::auth::{SessionError, VerificationError};
use crate::db::favorite::FavoriteError;
use crate::pipeline::{SearchError, UPSTREAM_UNAVAILABLE};
use crate::TARGET_WEB_REQUEST;

/// An error response rendered as `{"error": msg}`.
#[derive(Debug)]
pub struct ApiError {
    pub code: StatusCode,
    pub msg: String,
}

impl ApiError {
    #[must_use]
    pub fn new(code: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.code.is_server_error() {
            error!(target: TARGET_WEB_REQUEST, code = self.code.as_u16(), "{}", self.msg);
        } else {
            warn!(target: TARGET_WEB_REQUEST, code = self.code.as_u16(), "{}", self.msg);
        }
        (self.code, Json(json!({ "error": self.msg }))).into_response()
    }
}

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::RejectedInput(reason) => ApiError::bad_request(reason),
            SearchError::UpstreamUnavailable => {
                ApiError::internal(UPSTREAM_UNAVAILABLE)
            }
            SearchError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        error!(target: TARGET_WEB_REQUEST, "task store failure: {}", e);
        ApiError::internal("server error")
    }
}

impl From<FavoriteError> for ApiError {
    fn from(e: FavoriteError) -> Self {
        match e {
            FavoriteError::Conflict => ApiError::conflict(e.to_string()),
            FavoriteError::NotFound => ApiError::not_found(e.to_string()),
            FavoriteError::Database(e) => e.into(),
        }
    }
}

impl From<VerificationError> for ApiError {
    fn from(e: VerificationError) -> Self {
        match e {
            VerificationError::RateLimited { .. } => ApiError::new(StatusCode::TOO_MANY_REQUESTS, e.to_string()),
            VerificationError::InvalidPhone
            | VerificationError::InvalidCode
            | VerificationError::Expired => ApiError::bad_request(e.to_string()),
            VerificationError::Database(e) => e.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Invalid | SessionError::Revoked => ApiError::unauthorized(e.to_string()),
            SessionError::Encode(e) => {
                error!(target: TARGET_WEB_REQUEST, "token encoding failed: {}", e);
                ApiError::internal("server error")
            }
            SessionError::Database(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(rejection.status(), rejection.body_text())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        error!(target: TARGET_WEB_REQUEST, "database failure: {}", e);
        ApiError::internal("server error")
    }
}
