//! Transfer engine: resumable fetch, integrity validation, atomic publish.
//!
//! One engine invocation executes one task end-to-end. Within a task the
//! pipeline is strictly sequential (fetch, validate, publish); concurrency
//! exists only across tasks. The sole cancellation point is between chunk
//! writes, where the task's persisted state is re-read: pause never kills
//! the worker, it just makes the next check observe a non-active state so
//! the worker reaches a clean stop and releases its file handle.

use crate::bus::EventBus;
use crate::db::{Store, TaskRecord};
use crate::error::{Error, Result};
use crate::fsutil;
use crate::interceptor::{self, Interceptor};
use crate::types::{TaskEvent, TaskId, TaskState};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

const RANGE_NOT_SATISFIABLE: u16 = 416;

/// Executes tasks: resumable fetch, checksum validation, atomic publish
pub struct TransferEngine {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    client: reqwest::Client,
    interceptors: Vec<Arc<dyn Interceptor>>,
    buffer_size: usize,
}

impl TransferEngine {
    /// Create an engine over `store` and `bus` with the given hooks
    pub fn new(
        store: Arc<Store>,
        bus: Arc<EventBus>,
        interceptors: Vec<Arc<dyn Interceptor>>,
        buffer_size: usize,
    ) -> Self {
        Self {
            store,
            bus,
            client: reqwest::Client::new(),
            interceptors,
            buffer_size: buffer_size.max(1),
        }
    }

    /// Run one task to completion, interruption, or failure
    ///
    /// A missing or non-active task returns immediately as a no-op success,
    /// so a stale scheduled invocation harmlessly skips a task that was
    /// paused or already finished. Any error from the attempt is caught
    /// once here: the failed attempt is recorded (which performs the
    /// out-of-retry transition when the budget is spent), a FAILED event is
    /// emitted with the cause, and the error is re-raised so the scheduler
    /// can decide whether to rerun.
    pub async fn run(&self, id: TaskId) -> Result<()> {
        let Some(task) = self.store.find(id).await? else {
            return Ok(());
        };
        if !task.is_active() {
            tracing::debug!(task_id = task.id, state = %task.task_state(), "Skipping non-active task");
            return Ok(());
        }

        match self.attempt(&task).await {
            Ok(()) => Ok(()),
            Err(error) => {
                let state = self.store.increase_retry_count(id).await?;
                let bytes_read = fsutil::file_len(&task.temp_path()).await;
                let content_length = match self.store.find(id).await? {
                    Some(latest) => latest.content_length as u64,
                    None => task.content_length as u64,
                };
                self.bus
                    .emit(TaskEvent::Failed {
                        id,
                        bytes_read,
                        content_length,
                        error: error.to_string(),
                    })
                    .await;
                if state == TaskState::OutOfRetry {
                    tracing::warn!(task_id = task.id, error = %error, "Task failed and is out of retries");
                } else {
                    tracing::warn!(task_id = task.id, error = %error, "Task attempt failed");
                }
                Err(error)
            }
        }
    }

    /// One attempt: interceptors, fetch (or short-circuit), validate, publish
    async fn attempt(&self, task: &TaskRecord) -> Result<()> {
        let id = TaskId(task.id);
        let temp_path = task.temp_path();
        let bytes_on_disk = fsutil::file_len(&temp_path).await;

        self.bus
            .emit(TaskEvent::Queueing {
                id,
                bytes_read: bytes_on_disk,
                content_length: task.content_length as u64,
            })
            .await;

        let info = task.to_info(bytes_on_disk);
        if let Some(local) = interceptor::first_local_file(&self.interceptors, &info).await {
            self.adopt_local_file(id, &local, &temp_path).await?;
        } else if self.fetch(task, &temp_path).await? {
            // Interrupted by a concurrent pause: whoever requested it
            // already flipped the record, leave state untouched
            let bytes_read = fsutil::file_len(&temp_path).await;
            let content_length = match self.store.find(id).await? {
                Some(latest) => latest.content_length as u64,
                None => task.content_length as u64,
            };
            self.bus
                .emit(TaskEvent::Pausing {
                    id,
                    bytes_read,
                    content_length,
                })
                .await;
            tracing::info!(task_id = task.id, bytes_read, "Transfer interrupted by pause");
            return Ok(());
        }

        self.validate_and_publish(id).await
    }

    /// Use an interceptor-supplied file in place of a network fetch
    async fn adopt_local_file(&self, id: TaskId, local: &Path, temp_path: &Path) -> Result<()> {
        fsutil::remove_file_if_exists(temp_path).await?;
        fsutil::move_file(local, temp_path).await?;

        let length = fsutil::file_len(temp_path).await;
        let digest = fsutil::file_md5(temp_path).await?;
        self.store
            .update_transfer_meta(id, length, Some(&digest))
            .await?;

        tracing::info!(task_id = id.0, length, "Interceptor supplied local file, skipping fetch");
        self.bus
            .emit(TaskEvent::Downloading {
                id,
                bytes_read: length,
                content_length: length,
            })
            .await;
        Ok(())
    }

    /// Stream the body into the working file; Ok(true) means interrupted
    async fn fetch(&self, task: &TaskRecord, temp_path: &Path) -> Result<bool> {
        let id = TaskId(task.id);
        let mut offset = fsutil::file_len(temp_path).await;

        // Working file already complete and valid: nothing to fetch
        if offset > 0
            && offset == task.content_length as u64
            && let Some(ref fingerprint) = task.fingerprint
            && fsutil::fingerprint_matches(temp_path, fingerprint).await
        {
            self.bus
                .emit(TaskEvent::Downloading {
                    id,
                    bytes_read: offset,
                    content_length: offset,
                })
                .await;
            return Ok(false);
        }

        let mut response = self.range_request(&task.source_uri, offset).await?;
        if response.status().as_u16() == RANGE_NOT_SATISFIABLE {
            // The source shrank or changed since the working file was
            // written: the resume point is stale, restart once from zero
            tracing::info!(
                task_id = task.id,
                offset,
                "Resume offset rejected by server, restarting from 0"
            );
            fsutil::remove_file_if_exists(temp_path).await?;
            offset = 0;
            response = self.range_request(&task.source_uri, 0).await?;
            if response.status().as_u16() == RANGE_NOT_SATISFIABLE {
                return Err(Error::RangeExpired { id: task.id });
            }
        }
        if !response.status().is_success() {
            return Err(Error::Transport {
                status: response.status().as_u16(),
                url: task.source_uri.clone(),
            });
        }

        // Fresh attempt: capture the authoritative length and validator,
        // never overwritten mid-transfer
        let mut content_length = task.content_length as u64;
        if offset == 0 {
            content_length = response.content_length().unwrap_or(0);
            let etag = response
                .headers()
                .get(reqwest::header::ETAG)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            self.store
                .update_transfer_meta(id, content_length, etag.as_deref())
                .await?;
        }

        self.bus
            .emit(TaskEvent::Downloading {
                id,
                bytes_read: offset,
                content_length,
            })
            .await;

        if self.is_canceled(id).await {
            return Ok(true);
        }

        if let Some(parent) = temp_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(temp_path)
            .await?;

        let mut bytes_read = offset;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for slice in chunk.chunks(self.buffer_size) {
                file.write_all(slice).await?;
                bytes_read += slice.len() as u64;
                self.bus
                    .emit(TaskEvent::Downloading {
                        id,
                        bytes_read,
                        content_length,
                    })
                    .await;
                if self.is_canceled(id).await {
                    file.flush().await?;
                    return Ok(true);
                }
            }
        }
        file.flush().await?;
        Ok(false)
    }

    async fn range_request(&self, url: &str, offset: u64) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::RANGE, format!("bytes={offset}-"))
            .send()
            .await?;
        Ok(response)
    }

    /// Whether the task stopped being eligible to run
    ///
    /// Reads through the store cache, which pause/resume keep coherent, so
    /// this is cheap enough to call between chunk writes. A vanished record
    /// counts as canceled.
    async fn is_canceled(&self, id: TaskId) -> bool {
        match self.store.find(id).await {
            Ok(Some(task)) => !task.is_active(),
            _ => true,
        }
    }

    /// Validate the working file and publish it to the destination
    async fn validate_and_publish(&self, id: TaskId) -> Result<()> {
        // Reload: the fetch updated content length and fingerprint
        let Some(task) = self.store.find(id).await? else {
            return Ok(());
        };
        let temp_path = task.temp_path();
        let bytes_read = fsutil::file_len(&temp_path).await;
        let content_length = task.content_length as u64;

        self.bus
            .emit(TaskEvent::Validating {
                id,
                bytes_read,
                content_length,
            })
            .await;

        // A response without a validator leaves the fingerprint unset and
        // validation passes trivially
        if let Some(ref expected) = task.fingerprint {
            let actual = fsutil::file_md5(&temp_path).await?;
            if fsutil::normalize_fingerprint(&actual) != fsutil::normalize_fingerprint(expected) {
                fsutil::remove_file_if_exists(&temp_path).await?;
                // The next attempt must restart from offset 0
                self.store.update_state(id, TaskState::Active).await?;
                return Err(Error::Validation {
                    id: task.id,
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        let landed = fsutil::move_file(&temp_path, &task.dest_path()).await?;
        if landed != task.dest_path() {
            tracing::info!(
                task_id = task.id,
                landed = %landed.display(),
                "Destination existed, published under auto-renamed path"
            );
        }
        self.store
            .update_dest_uri(id, &landed.to_string_lossy())
            .await?;

        // Latest record so hooks see the published destination
        if let Some(latest) = self.store.find(id).await? {
            interceptor::notify_downloaded(&self.interceptors, &latest.to_info(content_length))
                .await;
        }

        self.store.update_state(id, TaskState::Success).await?;
        self.bus
            .emit(TaskEvent::Succeeded {
                id,
                bytes_read: content_length,
                content_length,
            })
            .await;
        tracing::info!(task_id = task.id, path = %landed.display(), "Download complete");
        Ok(())
    }
}
