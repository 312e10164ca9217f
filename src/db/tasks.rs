//! Task record CRUD with cache coherence.
//!
//! Every mutating operation takes the store-wide write lock, commits the
//! change durably, then refreshes the cached entry from the row. A
//! concurrent `find` therefore sees either the old record or the new one,
//! never a partial update.

use crate::error::DatabaseError;
use crate::types::{TaskId, TaskState};
use crate::{Error, Result};

use super::{NewTask, Store, TaskRecord};

const TASK_COLUMNS: &str = "id, tag, source_uri, title, description, dest_uri, temp_uri, \
     max_retry, retry_count, state, content_length, fingerprint, created_at";

impl Store {
    /// Insert a new task, assigning its id
    ///
    /// The id comes from the durable counter. Any stale row left under a
    /// reused id (possible only after a counter overflow reset) is
    /// overwritten, matching the documented orphan policy.
    pub async fn insert(&self, task: &NewTask) -> Result<TaskId> {
        let _guard = self.write_lock.lock().await;
        let id = self.next_task_id().await?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear stale task row: {}",
                    e
                )))
            })?;

        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, tag, source_uri, title, description, dest_uri, temp_uri,
                max_retry, retry_count, state, content_length, fingerprint,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&task.tag)
        .bind(&task.source_uri)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.dest_uri)
        .bind(&task.temp_uri)
        .bind(task.max_retry)
        .bind(0i32) // retry_count
        .bind(task.state)
        .bind(0i64) // content_length
        .bind(Option::<String>::None) // fingerprint
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert task: {}",
                e
            )))
        })?;

        self.refresh_cache(id).await?;
        Ok(id)
    }

    /// Get a task by id, through the cache
    ///
    /// A cache hit returns immediately; a miss loads from the database and
    /// populates the cache. An absent row is `Ok(None)`, not an error.
    pub async fn find(&self, id: TaskId) -> Result<Option<TaskRecord>> {
        {
            let mut cache = self.cache.lock().await;
            if let Some(record) = cache.get(&id.0) {
                return Ok(Some(record));
            }
        }

        let record = self.load(id).await?;
        if let Some(ref record) = record {
            self.cache.lock().await.put(id.0, record.clone());
        }
        Ok(record)
    }

    /// List tasks sharing a tag, oldest id first
    pub async fn find_by_tag(&self, tag: &str) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query_as::<_, TaskRecord>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE tag = ? ORDER BY id ASC"
        ))
        .bind(tag)
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list tasks by tag: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// List tasks in a given state, oldest id first
    pub async fn list_by_state(&self, state: TaskState) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query_as::<_, TaskRecord>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE state = ? ORDER BY id ASC"
        ))
        .bind(state.to_i32())
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list tasks by state: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Update a task's state
    pub async fn update_state(&self, id: TaskId, state: TaskState) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("UPDATE tasks SET state = ? WHERE id = ?")
            .bind(state.to_i32())
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update state: {}",
                    e
                )))
            })?;

        self.refresh_cache(id).await
    }

    /// Record the content length and fingerprint captured for this attempt
    ///
    /// Written once per fresh attempt (byte offset 0) or when an
    /// interceptor supplies the file; never overwritten mid-transfer.
    pub async fn update_transfer_meta(
        &self,
        id: TaskId,
        content_length: u64,
        fingerprint: Option<&str>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("UPDATE tasks SET content_length = ?, fingerprint = ? WHERE id = ?")
            .bind(content_length as i64)
            .bind(fingerprint)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update transfer metadata: {}",
                    e
                )))
            })?;

        self.refresh_cache(id).await
    }

    /// Record the destination the published file actually landed at
    ///
    /// Differs from the requested destination when a collision forced an
    /// auto-rename.
    pub async fn update_dest_uri(&self, id: TaskId, dest_uri: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("UPDATE tasks SET dest_uri = ? WHERE id = ?")
            .bind(dest_uri)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update destination: {}",
                    e
                )))
            })?;

        self.refresh_cache(id).await
    }

    /// Record a failed attempt, transitioning to OutOfRetry at the budget
    ///
    /// A forced task (negative `max_retry`) increments forever. Otherwise,
    /// once `retry_count` reaches `max_retry` the state flips to
    /// `OutOfRetry` instead of incrementing further, so the count never
    /// exceeds the budget. Returns the state after the update so callers
    /// can decide whether to reschedule.
    pub async fn increase_retry_count(&self, id: TaskId) -> Result<TaskState> {
        let _guard = self.write_lock.lock().await;
        let record = self.load(id).await?.ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!("task {} not found", id)))
        })?;

        if !record.is_forced() && record.retry_count >= record.max_retry {
            if record.task_state() != TaskState::OutOfRetry {
                sqlx::query("UPDATE tasks SET state = ? WHERE id = ?")
                    .bind(TaskState::OutOfRetry.to_i32())
                    .bind(id)
                    .execute(self.pool())
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::QueryFailed(format!(
                            "Failed to mark task out of retries: {}",
                            e
                        )))
                    })?;
                self.refresh_cache(id).await?;
            }
            return Ok(TaskState::OutOfRetry);
        }

        sqlx::query("UPDATE tasks SET retry_count = retry_count + 1 WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to increase retry count: {}",
                    e
                )))
            })?;

        self.refresh_cache(id).await?;
        Ok(record.task_state())
    }

    /// Delete a task row
    ///
    /// Physical deletion is caller policy; the core never removes rows on
    /// its own.
    pub async fn remove(&self, id: TaskId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete task: {}",
                    e
                )))
            })?;

        self.cache.lock().await.remove(&id.0);
        Ok(())
    }

    /// Load a record straight from the database, bypassing the cache
    async fn load(&self, id: TaskId) -> Result<Option<TaskRecord>> {
        let row = sqlx::query_as::<_, TaskRecord>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get task: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Drop the cached entry and re-populate it from the row
    async fn refresh_cache(&self, id: TaskId) -> Result<()> {
        let record = self.load(id).await?;
        let mut cache = self.cache.lock().await;
        cache.remove(&id.0);
        if let Some(record) = record {
            cache.put(id.0, record);
        }
        Ok(())
    }
}
