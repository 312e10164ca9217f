//! Per-task event distribution.
//!
//! Each task gets its own broadcast channel. Observers subscribe through
//! [`EventBus::observe`], which prepends a single status synthesized from
//! the persisted record before any live event, so a late subscriber always
//! starts with the task's current situation. Delivery is broadcast: every
//! observer of a task receives every subsequent event. There is no replay
//! of history beyond that one synthesized snapshot.

use crate::db::{Store, TaskRecord};
use crate::error::{Error, Result};
use crate::fsutil;
use crate::types::{TaskEvent, TaskId, TaskState};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

/// Buffered events per task channel before slow observers start lagging
const CHANNEL_CAPACITY: usize = 1000;

/// Broadcast hub for task lifecycle events
pub struct EventBus {
    store: Arc<Store>,
    channels: tokio::sync::Mutex<HashMap<i64, broadcast::Sender<TaskEvent>>>,
}

impl EventBus {
    /// Create a bus backed by `store` for status synthesis
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            channels: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Emit an event to all observers of its task
    ///
    /// If no one is observing, the event is silently dropped - transfers
    /// never block on missing listeners.
    pub async fn emit(&self, event: TaskEvent) {
        let sender = self.sender(event.task_id()).await;
        sender.send(event).ok();
    }

    /// Observe a task's event stream
    ///
    /// Yields one synthesized status derived from the persisted record,
    /// then every live event in emission order. The stream never ends on
    /// its own; a terminal SUCCEEDED/FAILED is simply the last meaningful
    /// event for the attempt, and a later resume produces fresh events on
    /// the same stream. Returns [`Error::NotFound`] for an unknown id.
    pub async fn observe(
        &self,
        id: TaskId,
    ) -> Result<impl Stream<Item = TaskEvent> + Send + Unpin> {
        let record = self
            .store
            .find(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        // Subscribe before synthesizing so no event emitted in between is lost
        let receiver = self.sender(id).await.subscribe();
        let initial = self.synthesize_status(&record).await;

        let live = BroadcastStream::new(receiver).filter_map(|event| event.ok());
        Ok(tokio_stream::once(initial).chain(live))
    }

    /// Current status reconstructed from the persisted record
    ///
    /// Bytes read come from the working file's length on disk, which is
    /// also the resume offset the next attempt will use.
    async fn synthesize_status(&self, record: &TaskRecord) -> TaskEvent {
        let id = TaskId(record.id);
        let content_length = record.content_length as u64;
        let bytes_read = fsutil::file_len(&record.temp_path()).await;

        match record.task_state() {
            TaskState::Active => TaskEvent::Queueing {
                id,
                bytes_read,
                content_length,
            },
            TaskState::Inactive => TaskEvent::Pausing {
                id,
                bytes_read,
                content_length,
            },
            TaskState::OutOfRetry => TaskEvent::Failed {
                id,
                bytes_read,
                content_length,
                error: Error::ExhaustedRetries {
                    id: record.id,
                    attempts: record.retry_count,
                }
                .to_string(),
            },
            TaskState::Success => TaskEvent::Succeeded {
                id,
                bytes_read: content_length,
                content_length,
            },
        }
    }

    async fn sender(&self, id: TaskId) -> broadcast::Sender<TaskEvent> {
        let mut channels = self.channels.lock().await;
        channels
            .entry(id.0)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}
