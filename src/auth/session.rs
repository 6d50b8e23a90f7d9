use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum_extra::extract::TypedHeader;
use axum_extra::headers::{authorization::Bearer, Authorization};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::app::ApiError;
use crate::db::Database;
use crate::TARGET_WEB_REQUEST;

/// Represents the claims stored in a session token.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String, // user id
    jti: String, // session id, matches a row in `sessions`
    exp: usize,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid or expired token")]
    Invalid,
    #[error("session has been revoked")]
    Revoked,
    #[error("token encoding failed: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The authenticated caller of a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
    pub session_id: String,
}

/// Signs session tokens and checks them against the `sessions` table.
pub struct SessionManager {
    db: Database,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
}

impl SessionManager {
    pub fn new(db: Database, secret_key: &str, lifetime_hours: i64) -> Self {
        Self {
            db,
            encoding_key: EncodingKey::from_secret(secret_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret_key.as_bytes()),
            lifetime: Duration::hours(lifetime_hours),
        }
    }

    /// Opens a session for `user_id` and returns its bearer token.
    pub async fn open(&self, user_id: i64, now: DateTime<Utc>) -> Result<String, SessionError> {
        let jti = Uuid::new_v4().to_string();
        let expires_at = now + self.lifetime;
        let claims = Claims {
            sub: user_id.to_string(),
            jti: jti.clone(),
            exp: expires_at.timestamp().max(0) as usize,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        self.db.create_session(&jti, user_id, now, expires_at).await?;
        debug!(target: TARGET_WEB_REQUEST, "session {} opened for user {}", jti, user_id);
        Ok(token)
    }

    /// Validates the signature and expiry, then requires the session row to be live.
    pub async fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<AuthUser, SessionError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                debug!(target: TARGET_WEB_REQUEST, "token rejected: {}", e);
                SessionError::Invalid
            })?
            .claims;
        let user_id: i64 = claims.sub.parse().map_err(|_| SessionError::Invalid)?;

        if !self.db.session_is_active(&claims.jti, user_id, now).await? {
            return Err(SessionError::Revoked);
        }
        Ok(AuthUser {
            user_id,
            session_id: claims.jti,
        })
    }

    pub async fn revoke(&self, session_id: &str) -> Result<bool, SessionError> {
        Ok(self.db.delete_session(session_id).await?)
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<SessionManager>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::unauthorized("missing bearer token"))?;

        let sessions = Arc::<SessionManager>::from_ref(state);
        sessions
            .authenticate(bearer.token(), Utc::now())
            .await
            .map_err(|e| match e {
                SessionError::Invalid | SessionError::Revoked => {
                    ApiError::unauthorized(e.to_string())
                }
                other => {
                    warn!(target: TARGET_WEB_REQUEST, "session lookup failed: {}", other);
                    ApiError::internal("session lookup failed")
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn manager() -> (SessionManager, i64) {
        let db = Database::in_memory().await.unwrap();
        let user = db.create_user("13800000000", Utc::now()).await.unwrap();
        (SessionManager::new(db, "test-secret", 24), user.id)
    }

    #[tokio::test]
    async fn token_round_trips_to_user() {
        let (sessions, user_id) = manager().await;
        let token = sessions.open(user_id, Utc::now()).await.unwrap();
        let user = sessions.authenticate(&token, Utc::now()).await.unwrap();
        assert_eq!(user.user_id, user_id);
    }

    #[tokio::test]
    async fn revoked_session_is_rejected() {
        let (sessions, user_id) = manager().await;
        let token = sessions.open(user_id, Utc::now()).await.unwrap();
        let user = sessions.authenticate(&token, Utc::now()).await.unwrap();

        assert!(sessions.revoke(&user.session_id).await.unwrap());
        assert!(matches!(
            sessions.authenticate(&token, Utc::now()).await,
            Err(SessionError::Revoked)
        ));
    }

    #[tokio::test]
    async fn foreign_signature_is_invalid() {
        let (sessions, user_id) = manager().await;
        let claims = Claims {
            sub: user_id.to_string(),
            jti: "forged".to_string(),
            exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
        };
        let forged = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"other-secret"),
        )
        .unwrap();

        assert!(matches!(
            sessions.authenticate(&forged, Utc::now()).await,
            Err(SessionError::Invalid)
        ));
        assert!(matches!(
            sessions.authenticate("not-a-token", Utc::now()).await,
            Err(SessionError::Invalid)
        ));
    }
}
