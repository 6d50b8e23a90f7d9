use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;

use super::core::Database;
use crate::db::Row;
use crate::util::{parse_timestamp, timestamp};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub phone: String,
    pub created_at: Option<DateTime<Utc>>,
}

fn user_from_row(row: &SqliteRow) -> UserRecord {
    let created_at: String = row.get("created_at");
    UserRecord {
        id: row.get("id"),
        phone: row.get("phone"),
        created_at: parse_timestamp(&created_at),
    }
}

impl Database {
    /// Inserts a user. Fails with a unique violation if the phone is taken.
    pub async fn create_user(&self, phone: &str, now: DateTime<Utc>) -> Result<UserRecord, sqlx::Error> {
        let now = timestamp(now);
        let id = sqlx::query(
            r#"
            INSERT INTO users (phone, created_at, updated_at)
            VALUES (?1, ?2, ?2)
            "#,
        )
        .bind(phone)
        .bind(&now)
        .execute(self.pool())
        .await?
        .last_insert_rowid();

        Ok(UserRecord {
            id,
            phone: phone.to_string(),
            created_at: parse_timestamp(&now),
        })
    }

    pub async fn find_user_by_phone(&self, phone: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        let row = sqlx::query("SELECT id, phone, created_at FROM users WHERE phone = ?1")
            .bind(phone)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    pub async fn find_user(&self, user_id: i64) -> Result<Option<UserRecord>, sqlx::Error> {
        let row = sqlx::query("SELECT id, phone, created_at FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    /// Stores a freshly issued verification code.
    pub async fn insert_verification_code(
        &self,
        phone: &str,
        code: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO verification_codes (phone, code, created_at, expires_at, used)
            VALUES (?1, ?2, ?3, ?4, 0)
            "#,
        )
        .bind(phone)
        .bind(code)
        .bind(timestamp(created_at))
        .bind(timestamp(expires_at))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// True if a code was issued to `phone` strictly after `since`.
    pub async fn has_code_issued_since(
        &self,
        phone: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM verification_codes WHERE phone = ?1 AND created_at > ?2",
        )
        .bind(phone)
        .bind(timestamp(since))
        .fetch_one(self.pool())
        .await?;
        Ok(count > 0)
    }

    /// The newest unused code for `phone`: `(id, code, expires_at)`.
    pub async fn latest_unused_code(
        &self,
        phone: &str,
    ) -> Result<Option<(i64, String, Option<DateTime<Utc>>)>, sqlx::Error> {
        let row = sqlx::query_as::<_, (i64, String, String)>(
            r#"
            SELECT id, code, expires_at
            FROM verification_codes
            WHERE phone = ?1 AND used = 0
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(phone)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|(id, code, expires_at)| (id, code, parse_timestamp(&expires_at))))
    }

    /// Marks a code used. Returns false if it was already consumed.
    pub async fn consume_code(&self, code_id: i64) -> Result<bool, sqlx::Error> {
        let rows_affected =
            sqlx::query("UPDATE verification_codes SET used = 1 WHERE id = ?1 AND used = 0")
                .bind(code_id)
                .execute(self.pool())
                .await?
                .rows_affected();
        Ok(rows_affected > 0)
    }

    pub async fn create_session(
        &self,
        jti: &str,
        user_id: i64,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO sessions (jti, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(jti)
        .bind(user_id)
        .bind(timestamp(created_at))
        .bind(timestamp(expires_at))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// True if the session exists, belongs to `user_id` and has not expired at `now`.
    pub async fn session_is_active(
        &self,
        jti: &str,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sessions WHERE jti = ?1 AND user_id = ?2 AND expires_at > ?3",
        )
        .bind(jti)
        .bind(user_id)
        .bind(timestamp(now))
        .fetch_one(self.pool())
        .await?;
        Ok(count > 0)
    }

    pub async fn delete_session(&self, jti: &str) -> Result<bool, sqlx::Error> {
        let rows_affected = sqlx::query("DELETE FROM sessions WHERE jti = ?1")
            .bind(jti)
            .execute(self.pool())
            .await?
            .rows_affected();
        Ok(rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConstraintErrorExt;
    use chrono::Duration;

    #[tokio::test]
    async fn phone_is_unique() {
        let db = Database::in_memory().await.unwrap();
        db.create_user("13800000000", Utc::now()).await.unwrap();
        let err = db.create_user("13800000000", Utc::now()).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn sessions_expire_and_can_be_revoked() {
        let db = Database::in_memory().await.unwrap();
        let user = db.create_user("13800000000", Utc::now()).await.unwrap();
        let now = Utc::now();
        db.create_session("abc", user.id, now, now + Duration::hours(1))
            .await
            .unwrap();

        assert!(db.session_is_active("abc", user.id, now).await.unwrap());
        assert!(!db.session_is_active("abc", user.id + 1, now).await.unwrap());
        assert!(!db
            .session_is_active("abc", user.id, now + Duration::hours(2))
            .await
            .unwrap());

        assert!(db.delete_session("abc").await.unwrap());
        assert!(!db.session_is_active("abc", user.id, now).await.unwrap());
    }
}
