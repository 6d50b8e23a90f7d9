use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use thiserror::Error;
use tracing::{debug, instrument};

use super::core::{Database, DbConstraintErrorExt};
use crate::db::Row;
use crate::pipeline::AnalysisResult;
use crate::util::{parse_timestamp, timestamp};
use crate::TARGET_DB;

#[derive(Debug, Error)]
pub enum FavoriteError {
    #[error("event is already in favorites")]
    Conflict,
    #[error("favorite not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A user's subscription to an event and its latest summary.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FavoriteRecord {
    pub id: i64,
    #[serde(skip)]
    pub user_id: i64,
    pub event_name: String,
    pub key_men: Option<String>,
    pub event_overview: Option<String>,
    pub key_point: Option<String>,
    pub latest: Option<String>,
    pub event_cause: Option<String>,
    pub event_process: Option<String>,
    pub event_result: Option<String>,
    pub timeline: Option<Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_refresh: Option<DateTime<Utc>>,
}

/// Fields supplied when a favorite is created, normally copied from a search result.
#[derive(Clone, Debug, Default)]
pub struct NewFavorite {
    pub event_name: String,
    pub key_men: Option<String>,
    pub event_overview: Option<String>,
    pub key_point: Option<String>,
    pub latest: Option<String>,
    pub event_cause: Option<String>,
    pub event_process: Option<String>,
    pub event_result: Option<String>,
    pub timeline: Option<Value>,
}

impl From<&AnalysisResult> for NewFavorite {
    fn from(result: &AnalysisResult) -> Self {
        NewFavorite {
            event_name: result.event_name.clone(),
            key_men: result.key_men.clone(),
            event_overview: result.event_overview.clone(),
            key_point: result.key_point.clone(),
            latest: result.latest.clone(),
            event_cause: result.event_cause.clone(),
            event_process: result.event_process.clone(),
            event_result: result.event_result.clone(),
            timeline: result.timeline.clone(),
        }
    }
}

const FAVORITE_COLUMNS: &str = "id, user_id, event_name, key_men, event_overview, key_point, latest, \
     event_cause, event_process, event_result, timeline, created_at, updated_at, last_refresh";

fn favorite_from_row(row: &SqliteRow) -> FavoriteRecord {
    let timeline: Option<String> = row.get("timeline");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let last_refresh: String = row.get("last_refresh");

    FavoriteRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        event_name: row.get("event_name"),
        key_men: row.get("key_men"),
        event_overview: row.get("event_overview"),
        key_point: row.get("key_point"),
        latest: row.get("latest"),
        event_cause: row.get("event_cause"),
        event_process: row.get("event_process"),
        event_result: row.get("event_result"),
        timeline: timeline.and_then(|raw| serde_json::from_str(&raw).ok()),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
        last_refresh: parse_timestamp(&last_refresh),
    }
}

fn timeline_json(timeline: &Option<Value>) -> Option<String> {
    timeline.as_ref().map(|t| t.to_string())
}

impl Database {
    /// Creates a favorite. A second favorite for the same (user, event_name) is a conflict.
    #[instrument(target = "db", level = "debug", skip(self, favorite), fields(event_name = %favorite.event_name))]
    pub async fn add_favorite(
        &self,
        user_id: i64,
        favorite: &NewFavorite,
    ) -> Result<FavoriteRecord, FavoriteError> {
        let now = timestamp(Utc::now());
        let result = sqlx::query(
            r#"
            INSERT INTO favorites (
                user_id, event_name, key_men, event_overview, key_point, latest,
                event_cause, event_process, event_result, timeline,
                created_at, updated_at, last_refresh
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, ?11)
            "#,
        )
        .bind(user_id)
        .bind(&favorite.event_name)
        .bind(&favorite.key_men)
        .bind(&favorite.event_overview)
        .bind(&favorite.key_point)
        .bind(&favorite.latest)
        .bind(&favorite.event_cause)
        .bind(&favorite.event_process)
        .bind(&favorite.event_result)
        .bind(timeline_json(&favorite.timeline))
        .bind(&now)
        .execute(self.pool())
        .await;

        let id = match result {
            Ok(done) => done.last_insert_rowid(),
            Err(e) if e.is_unique_violation() => {
                debug!(target: TARGET_DB, "favorite already exists for user {}", user_id);
                return Err(FavoriteError::Conflict);
            }
            Err(e) => return Err(e.into()),
        };

        self.get_favorite(user_id, id).await
    }

    /// Fetches one favorite owned by `user_id`.
    pub async fn get_favorite(
        &self,
        user_id: i64,
        favorite_id: i64,
    ) -> Result<FavoriteRecord, FavoriteError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM favorites WHERE id = ?1 AND user_id = ?2",
            FAVORITE_COLUMNS
        ))
        .bind(favorite_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref()
            .map(favorite_from_row)
            .ok_or(FavoriteError::NotFound)
    }

    /// Lists a user's favorites, newest first.
    pub async fn list_favorites(&self, user_id: i64) -> Result<Vec<FavoriteRecord>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM favorites WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
            FAVORITE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(favorite_from_row).collect())
    }

    /// Every favorite across all users, in creation order. Used by the refresh batch.
    pub async fn list_all_favorites(&self) -> Result<Vec<FavoriteRecord>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM favorites ORDER BY id ASC",
            FAVORITE_COLUMNS
        ))
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(favorite_from_row).collect())
    }

    pub async fn delete_favorite(&self, user_id: i64, favorite_id: i64) -> Result<(), FavoriteError> {
        let rows_affected = sqlx::query("DELETE FROM favorites WHERE id = ?1 AND user_id = ?2")
            .bind(favorite_id)
            .bind(user_id)
            .execute(self.pool())
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(FavoriteError::NotFound);
        }
        Ok(())
    }

    /// Overwrites a favorite's summary with a fresh analysis and bumps `last_refresh`.
    ///
    /// Runs in its own transaction: nothing is written unless the update commits.
    #[instrument(target = "db", level = "debug", skip(self, result))]
    pub async fn apply_favorite_refresh(
        &self,
        favorite_id: i64,
        result: &AnalysisResult,
        refreshed_at: DateTime<Utc>,
    ) -> Result<(), FavoriteError> {
        let now = timestamp(refreshed_at);
        let mut transaction = self.pool().begin().await?;

        let rows_affected = sqlx::query(
            r#"
            UPDATE favorites SET
                key_men = ?2,
                event_overview = ?3,
                key_point = ?4,
                latest = ?5,
                event_cause = ?6,
                event_process = ?7,
                event_result = ?8,
                timeline = ?9,
                updated_at = ?10,
                last_refresh = ?10
            WHERE id = ?1
            "#,
        )
        .bind(favorite_id)
        .bind(&result.key_men)
        .bind(&result.event_overview)
        .bind(&result.key_point)
        .bind(&result.latest)
        .bind(&result.event_cause)
        .bind(&result.event_process)
        .bind(&result.event_result)
        .bind(timeline_json(&result.timeline))
        .bind(&now)
        .execute(&mut *transaction)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            transaction.rollback().await?;
            return Err(FavoriteError::NotFound);
        }

        transaction.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    async fn db_with_user() -> (Database, i64) {
        let db = Database::in_memory().await.unwrap();
        let user = db.create_user("13800000000", Utc::now()).await.unwrap();
        (db, user.id)
    }

    fn favorite(name: &str) -> NewFavorite {
        NewFavorite {
            event_name: name.to_string(),
            event_overview: Some("overview".to_string()),
            timeline: Some(json!([{"time": "2024-07-30", "event": "start"}])),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn duplicate_favorite_is_a_conflict() {
        let (db, user_id) = db_with_user().await;
        db.add_favorite(user_id, &favorite("北京暴雨")).await.unwrap();

        let second = db.add_favorite(user_id, &favorite("北京暴雨")).await;
        assert!(matches!(second, Err(FavoriteError::Conflict)));
        assert_eq!(db.list_favorites(user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_event_for_different_users_is_allowed() {
        let (db, user_id) = db_with_user().await;
        let other = db.create_user("13900000000", Utc::now()).await.unwrap();
        db.add_favorite(user_id, &favorite("e")).await.unwrap();
        db.add_favorite(other.id, &favorite("e")).await.unwrap();
        assert_eq!(db.list_all_favorites().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn timeline_round_trips_as_json() {
        let (db, user_id) = db_with_user().await;
        let stored = db.add_favorite(user_id, &favorite("e")).await.unwrap();
        assert_eq!(stored.timeline, Some(json!([{"time": "2024-07-30", "event": "start"}])));
        assert_eq!(stored.event_overview.as_deref(), Some("overview"));
        assert!(stored.key_men.is_none());
    }

    #[tokio::test]
    async fn delete_only_touches_own_favorites() {
        let (db, user_id) = db_with_user().await;
        let other = db.create_user("13900000000", Utc::now()).await.unwrap();
        let stored = db.add_favorite(user_id, &favorite("e")).await.unwrap();

        let wrong_owner = db.delete_favorite(other.id, stored.id).await;
        assert!(matches!(wrong_owner, Err(FavoriteError::NotFound)));

        db.delete_favorite(user_id, stored.id).await.unwrap();
        let again = db.delete_favorite(user_id, stored.id).await;
        assert!(matches!(again, Err(FavoriteError::NotFound)));
    }

    #[tokio::test]
    async fn refresh_overwrites_summary_and_bumps_last_refresh() {
        let (db, user_id) = db_with_user().await;
        let stored = db.add_favorite(user_id, &favorite("e")).await.unwrap();
        let later = Utc.with_ymd_and_hms(2030, 1, 2, 6, 0, 0).unwrap();

        let fresh = AnalysisResult {
            event_name: "e".to_string(),
            latest: Some("new development".to_string()),
            ..Default::default()
        };
        db.apply_favorite_refresh(stored.id, &fresh, later).await.unwrap();

        let updated = db.get_favorite(user_id, stored.id).await.unwrap();
        assert_eq!(updated.latest.as_deref(), Some("new development"));
        assert!(updated.event_overview.is_none());
        assert!(updated.timeline.is_none());
        assert_eq!(updated.last_refresh, Some(later));
    }

    #[tokio::test]
    async fn refresh_of_missing_favorite_is_not_found() {
        let (db, _) = db_with_user().await;
        let result = db
            .apply_favorite_refresh(999, &AnalysisResult::default(), Utc::now())
            .await;
        assert!(matches!(result, Err(FavoriteError::NotFound)));
    }
}
