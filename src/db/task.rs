use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use super::core::Database;
use crate::db::Row;
use crate::pipeline::AnalysisResult;
use crate::util::{parse_timestamp, timestamp};
use crate::TARGET_DB;

/// Lifecycle of a split-search analysis. `Pending` moves to exactly one terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status '{}'", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskRecord {
    pub id: String,
    pub event_name: String,
    pub status: TaskStatus,
    pub result: Option<AnalysisResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn pending(id: String, event_name: String, created_at: DateTime<Utc>) -> Self {
        TaskRecord {
            id,
            event_name,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at,
            completed_at: None,
        }
    }
}

impl Database {
    pub async fn insert_task(&self, task: &TaskRecord) -> Result<(), sqlx::Error> {
        let result_json = task
            .result
            .as_ref()
            .and_then(|r| serde_json::to_string(r).ok());

        sqlx::query(
            r#"
            INSERT INTO analysis_tasks (id, event_name, status, result, error, created_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&task.id)
        .bind(&task.event_name)
        .bind(task.status.as_str())
        .bind(result_json)
        .bind(&task.error)
        .bind(timestamp(task.created_at))
        .bind(task.completed_at.map(timestamp))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Moves a pending task to a terminal state. Returns false when the task is
    /// missing or already terminal, in which case nothing is written.
    pub async fn finish_task(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<&AnalysisResult>,
        error: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result_json = match result {
            Some(r) => Some(
                serde_json::to_string(r).map_err(|e| sqlx::Error::Encode(Box::new(e)))?,
            ),
            None => None,
        };

        let rows_affected = sqlx::query(
            r#"
            UPDATE analysis_tasks
            SET status = ?2, result = ?3, error = ?4, completed_at = ?5
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(task_id)
        .bind(status.as_str())
        .bind(result_json)
        .bind(error)
        .bind(timestamp(completed_at))
        .execute(self.pool())
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    pub async fn fetch_task(&self, task_id: &str) -> Result<Option<TaskRecord>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, event_name, status, result, error, created_at, completed_at
            FROM analysis_tasks
            WHERE id = ?1
            "#,
        )
        .bind(task_id)
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status_raw: String = row.get("status");
        let status = status_raw
            .parse::<TaskStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;
        let result_raw: Option<String> = row.get("result");
        let result = match result_raw {
            Some(raw) => match serde_json::from_str::<AnalysisResult>(&raw) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!(target: TARGET_DB, "stored result for task {} is unreadable: {}", task_id, e);
                    None
                }
            },
            None => None,
        };
        let created_at: String = row.get("created_at");
        let created_at = decode_timestamp(task_id, "created_at", &created_at)?;
        let completed_at: Option<String> = row.get("completed_at");
        let completed_at = completed_at
            .map(|raw| decode_timestamp(task_id, "completed_at", &raw))
            .transpose()?;

        Ok(Some(TaskRecord {
            id: row.get("id"),
            event_name: row.get("event_name"),
            status,
            result,
            error: row.get("error"),
            created_at,
            completed_at,
        }))
    }
}

fn decode_timestamp(task_id: &str, column: &str, raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    parse_timestamp(raw).ok_or_else(|| {
        sqlx::Error::Decode(format!("task {} has an unreadable {} '{}'", task_id, column, raw).into())
    })
}
