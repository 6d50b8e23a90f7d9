//! Status and results of split-search analyses, keyed by task id.
//!
//! The durable `analysis_tasks` table is authoritative. A process-local map
//! fronts it so status polling rarely touches the database; a miss falls back
//! to the table, which also covers tasks created before a restart.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::{Database, TaskRecord, TaskStatus};
use crate::pipeline::AnalysisResult;
use crate::TARGET_DB;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task storage failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// How a background analysis ended.
#[derive(Clone, Debug)]
pub enum TaskOutcome {
    Completed(AnalysisResult),
    Failed(String),
}

impl TaskOutcome {
    fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Completed(_) => TaskStatus::Completed,
            TaskOutcome::Failed(_) => TaskStatus::Failed,
        }
    }
}

pub struct AnalysisResultStore {
    cache: DashMap<String, TaskRecord>,
    db: Database,
}

impl AnalysisResultStore {
    pub fn new(db: Database) -> Self {
        Self {
            cache: DashMap::new(),
            db,
        }
    }

    /// Persists a new pending task under a fresh id and caches it.
    pub async fn create_pending(&self, event_name: &str) -> Result<TaskRecord, StoreError> {
        let record = TaskRecord::pending(
            Uuid::new_v4().to_string(),
            event_name.to_string(),
            Utc::now(),
        );
        self.db.insert_task(&record).await?;
        self.cache.insert(record.id.clone(), record.clone());
        debug!(target: TARGET_DB, "task {} created for '{}'", record.id, event_name);
        Ok(record)
    }

    /// Records the terminal state of a task.
    ///
    /// Returns false, writing nothing, if the task is unknown or already terminal.
    /// The database write is retried once. If it still fails, a task this process
    /// is tracking is finished in memory only, so pollers still see it end.
    pub async fn put(&self, task_id: &str, outcome: TaskOutcome) -> Result<bool, StoreError> {
        let completed_at = Utc::now();
        let status = outcome.status();
        let (result, error) = match &outcome {
            TaskOutcome::Completed(result) => (Some(result), None),
            TaskOutcome::Failed(error) => (None, Some(error.as_str())),
        };

        let written = match self
            .db
            .finish_task(task_id, status, result, error, completed_at)
            .await
        {
            Ok(transitioned) => Ok(transitioned),
            Err(e) => {
                warn!(target: TARGET_DB, "recording task {} failed, retrying: {}", task_id, e);
                self.db
                    .finish_task(task_id, status, result, error, completed_at)
                    .await
            }
        };

        let transitioned = match written {
            Ok(transitioned) => transitioned,
            Err(e) => {
                let finished = self.finish_cached(task_id, status, result, error, completed_at);
                if !finished {
                    return Err(e.into());
                }
                error!(
                    target: TARGET_DB,
                    "task {} is {} in memory only, database write failed: {}", task_id, status, e
                );
                return Ok(true);
            }
        };

        if !transitioned {
            warn!(target: TARGET_DB, "task {} is unknown or already finished; ignoring {} outcome", task_id, status);
            return Ok(false);
        }

        if !self.finish_cached(task_id, status, result, error, completed_at) {
            if let Some(record) = self.db.fetch_task(task_id).await? {
                self.cache.insert(task_id.to_string(), record);
            }
        }

        info!(target: TARGET_DB, "task {} is now {}", task_id, status);
        Ok(true)
    }

    /// Moves a cached pending record to its terminal state.
    fn finish_cached(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<&AnalysisResult>,
        error: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> bool {
        let Some(mut record) = self.cache.get_mut(task_id) else {
            return false;
        };
        if record.status.is_terminal() {
            return false;
        }
        record.status = status;
        record.result = result.cloned();
        record.error = error.map(str::to_string);
        record.completed_at = Some(completed_at);
        true
    }

    /// Looks a task up in memory, then in the durable table.
    pub async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        if let Some(record) = self.cache.get(task_id) {
            return Ok(Some(record.clone()));
        }

        let record = self.db.fetch_task(task_id).await?;
        if let Some(record) = &record {
            debug!(target: TARGET_DB, "task {} loaded from database", task_id);
            // Pending tasks owned by this process are always cached already, so only
            // terminal records are worth remembering here.
            if record.status.is_terminal() {
                self.cache.insert(task_id.to_string(), record.clone());
            }
        }
        Ok(record)
    }

    #[cfg(test)]
    fn evict(&self, task_id: &str) {
        self.cache.remove(task_id);
    }
}
