//! Durable monotonic id generation.

use crate::error::DatabaseError;
use crate::types::TaskId;
use crate::{Error, Result};

use super::Store;

impl Store {
    /// Return the next task id, persisting the counter before returning
    ///
    /// The increment commits durably first, so a crash after this call
    /// returns cannot hand the same id out again. On signed overflow the
    /// counter resets to 1 - a rare, documented safety valve: ids handed
    /// out before the reset are treated as orphaned and may be overwritten
    /// by a later insert, so callers keeping terminal rows long-term must
    /// prune them.
    pub async fn next_task_id(&self) -> Result<TaskId> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin counter transaction: {}",
                e
            )))
        })?;

        let current: i64 = sqlx::query_scalar("SELECT value FROM task_counter WHERE id = 0")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to read task counter: {}",
                    e
                )))
            })?;

        let mut next = current.wrapping_add(1);
        if next < 0 {
            tracing::warn!(
                previous = current,
                "Task counter overflowed, resetting to 1; historical rows with reused ids will be overwritten"
            );
            next = 1;
        }

        sqlx::query("UPDATE task_counter SET value = ? WHERE id = 0")
            .bind(next)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to advance task counter: {}",
                    e
                )))
            })?;

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit task counter: {}",
                e
            )))
        })?;

        Ok(TaskId(next))
    }

    /// Force the counter to a specific value (tests only)
    #[cfg(test)]
    pub(crate) async fn set_task_counter(&self, value: i64) -> Result<()> {
        sqlx::query("UPDATE task_counter SET value = ? WHERE id = 0")
            .bind(value)
            .execute(self.pool())
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set task counter: {}",
                    e
                )))
            })?;
        Ok(())
    }
}
