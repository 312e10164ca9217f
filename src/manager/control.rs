//! Task lifecycle control — pause and resume, by id and by tag.

use crate::error::{Error, Result};
use crate::fsutil;
use crate::types::{TaskEvent, TaskId, TaskState};

use super::HttpDownloader;

impl HttpDownloader {
    /// Pause a task
    ///
    /// Stops any pending scheduled run, then flips the record to inactive;
    /// a transfer currently streaming observes the flip at its next chunk
    /// boundary and stops cleanly, keeping the working file for resume.
    ///
    /// Pausing an already paused task is a no-op. Pausing a terminal task
    /// returns [`Error::StateConflict`].
    pub async fn pause(&self, id: TaskId) -> Result<()> {
        let task = self
            .store
            .find(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        match task.task_state() {
            TaskState::Inactive => return Ok(()),
            state @ (TaskState::OutOfRetry | TaskState::Success) => {
                return Err(Error::StateConflict {
                    id: id.0,
                    operation: "pause".to_string(),
                    current_state: state.to_string(),
                });
            }
            TaskState::Active => {}
        }

        self.scheduler.cancel_all_for(id).await;
        self.store.update_state(id, TaskState::Inactive).await?;

        let bytes_read = fsutil::file_len(&task.temp_path()).await;
        self.bus
            .emit(TaskEvent::Pausing {
                id,
                bytes_read,
                content_length: task.content_length as u64,
            })
            .await;
        tracing::info!(task_id = id.0, bytes_read, "Task paused");
        Ok(())
    }

    /// Resume a paused task
    ///
    /// Flips the record back to active and re-schedules it. The retry
    /// count is left as it was: resume is not a fresh start, only a
    /// continuation. The next attempt resumes the fetch at the working
    /// file's current length.
    ///
    /// Resuming an already active task is a no-op. Resuming a terminal
    /// task returns [`Error::StateConflict`].
    pub async fn resume(&self, id: TaskId) -> Result<()> {
        let task = self
            .store
            .find(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        match task.task_state() {
            TaskState::Active => return Ok(()),
            state @ (TaskState::OutOfRetry | TaskState::Success) => {
                return Err(Error::StateConflict {
                    id: id.0,
                    operation: "resume".to_string(),
                    current_state: state.to_string(),
                });
            }
            TaskState::Inactive => {}
        }

        self.store.update_state(id, TaskState::Active).await?;
        self.scheduler.schedule(id).await?;

        let bytes_read = fsutil::file_len(&task.temp_path()).await;
        self.bus
            .emit(TaskEvent::Queueing {
                id,
                bytes_read,
                content_length: task.content_length as u64,
            })
            .await;
        tracing::info!(task_id = id.0, bytes_read, "Task resumed");
        Ok(())
    }

    /// Pause every active task carrying `tag`
    ///
    /// Already paused and terminal tasks are skipped. Returns the number
    /// of tasks paused, or [`Error::NotFound`] when no task carries the
    /// tag at all.
    pub async fn pause_tag(&self, tag: &str) -> Result<usize> {
        let tasks = self.store.find_by_tag(tag).await?;
        if tasks.is_empty() {
            return Err(Error::NotFound(format!("no task with tag '{tag}'")));
        }

        let mut paused = 0;
        for task in tasks {
            if task.task_state() != TaskState::Active {
                continue;
            }
            if let Err(e) = self.pause(TaskId(task.id)).await {
                tracing::warn!(task_id = task.id, error = %e, "Failed to pause task in tag group");
            } else {
                paused += 1;
            }
        }

        tracing::info!(tag, paused, "Paused tag group");
        Ok(paused)
    }

    /// Resume every paused task carrying `tag`
    ///
    /// Active and terminal tasks are skipped. Returns the number of tasks
    /// resumed, or [`Error::NotFound`] when no task carries the tag at
    /// all.
    pub async fn resume_tag(&self, tag: &str) -> Result<usize> {
        let tasks = self.store.find_by_tag(tag).await?;
        if tasks.is_empty() {
            return Err(Error::NotFound(format!("no task with tag '{tag}'")));
        }

        let mut resumed = 0;
        for task in tasks {
            if task.task_state() != TaskState::Inactive {
                continue;
            }
            if let Err(e) = self.resume(TaskId(task.id)).await {
                tracing::warn!(task_id = task.id, error = %e, "Failed to resume task in tag group");
            } else {
                resumed += 1;
            }
        }

        tracing::info!(tag, resumed, "Resumed tag group");
        Ok(resumed)
    }
}
