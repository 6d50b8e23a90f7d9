use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::Database;
use crate::environment::VerificationSettings;
use crate::util::is_valid_phone;
use crate::TARGET_WEB_REQUEST;

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("invalid phone number")]
    InvalidPhone,
    #[error("verification code requested too often, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: i64 },
    #[error("invalid verification code")]
    InvalidCode,
    #[error("verification code expired")]
    Expired,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Issues and checks single-use numeric codes sent to a phone.
#[derive(Clone, Debug)]
pub struct VerificationService {
    db: Database,
    settings: VerificationSettings,
}

fn random_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

impl VerificationService {
    pub fn new(db: Database, settings: VerificationSettings) -> Self {
        Self { db, settings }
    }

    pub async fn send_code(&self, phone: &str) -> Result<String, VerificationError> {
        self.send_code_at(phone, Utc::now()).await
    }

    /// Issues a new code unless one was issued within the rate-limit window.
    ///
    /// There is no SMS provider; delivery is a log line.
    pub async fn send_code_at(&self, phone: &str, now: DateTime<Utc>) -> Result<String, VerificationError> {
        if !is_valid_phone(phone) {
            return Err(VerificationError::InvalidPhone);
        }

        let window = Duration::seconds(self.settings.rate_limit_secs);
        if self.db.has_code_issued_since(phone, now - window).await? {
            warn!(target: TARGET_WEB_REQUEST, "verification code for {} requested within {}s", phone, self.settings.rate_limit_secs);
            return Err(VerificationError::RateLimited {
                retry_after_secs: self.settings.rate_limit_secs,
            });
        }

        let code = random_code(self.settings.code_length);
        let expires_at = now + Duration::minutes(self.settings.expire_minutes);
        self.db
            .insert_verification_code(phone, &code, now, expires_at)
            .await?;

        info!(target: TARGET_WEB_REQUEST, "SMS to {}: verification code {} (valid {} minutes)", phone, code, self.settings.expire_minutes);
        Ok(code)
    }

    pub async fn verify(&self, phone: &str, code: &str) -> Result<(), VerificationError> {
        self.verify_at(phone, code, Utc::now()).await
    }

    /// Accepts only the newest unused code for `phone`, once.
    pub async fn verify_at(&self, phone: &str, code: &str, now: DateTime<Utc>) -> Result<(), VerificationError> {
        let Some((id, expected, expires_at)) = self.db.latest_unused_code(phone).await? else {
            return Err(VerificationError::InvalidCode);
        };

        if expected != code.trim() {
            return Err(VerificationError::InvalidCode);
        }
        if !matches!(expires_at, Some(expires_at) if expires_at > now) {
            return Err(VerificationError::Expired);
        }

        // Losing a race with a concurrent verify means the code is already spent.
        if !self.db.consume_code(id).await? {
            return Err(VerificationError::InvalidCode);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PHONE: &str = "13800138000";

    async fn service() -> VerificationService {
        let db = Database::in_memory().await.unwrap();
        VerificationService::new(db, VerificationSettings::default())
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn codes_are_numeric_with_requested_length() {
        let code = random_code(6);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn code_lifecycle() {
        let service = service().await;
        let code = service.send_code_at(PHONE, t0()).await.unwrap();

        let again = service.send_code_at(PHONE, t0() + Duration::seconds(30)).await;
        assert!(matches!(again, Err(VerificationError::RateLimited { .. })));

        let almost_expired = t0() + Duration::minutes(4) + Duration::seconds(59);
        service.verify_at(PHONE, &code, almost_expired).await.unwrap();

        let reused = service.verify_at(PHONE, &code, almost_expired).await;
        assert!(matches!(reused, Err(VerificationError::InvalidCode)));
    }

    #[tokio::test]
    async fn expired_code_is_rejected() {
        let service = service().await;
        let code = service.send_code_at(PHONE, t0()).await.unwrap();
        let late = service.verify_at(PHONE, &code, t0() + Duration::minutes(5)).await;
        assert!(matches!(late, Err(VerificationError::Expired)));
    }

    #[tokio::test]
    async fn wrong_code_does_not_consume() {
        let service = service().await;
        let code = service.send_code_at(PHONE, t0()).await.unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        assert!(matches!(
            service.verify_at(PHONE, wrong, t0()).await,
            Err(VerificationError::InvalidCode)
        ));
        service.verify_at(PHONE, &code, t0()).await.unwrap();
    }

    #[tokio::test]
    async fn new_code_after_window_replaces_old() {
        let service = service().await;
        let first = service.send_code_at(PHONE, t0()).await.unwrap();
        let later = t0() + Duration::seconds(61);
        let second = service.send_code_at(PHONE, later).await.unwrap();

        if first != second {
            assert!(service.verify_at(PHONE, &first, later).await.is_err());
        }
        service.verify_at(PHONE, &second, later).await.unwrap();
    }

    #[tokio::test]
    async fn malformed_phone_is_rejected() {
        let service = service().await;
        assert!(matches!(
            service.send_code_at("12345", t0()).await,
            Err(VerificationError::InvalidPhone)
        ));
    }
}
