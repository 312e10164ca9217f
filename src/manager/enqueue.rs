//! Request validation, task creation, and observation.

use crate::db::NewTask;
use crate::error::{Error, Result};
use crate::types::{DownloadRequest, TaskEvent, TaskId, TaskState};
use tokio_stream::Stream;
use url::Url;

use super::HttpDownloader;

impl HttpDownloader {
    /// Enqueue a download and schedule its first run
    ///
    /// The store assigns the task id atomically with the first durable
    /// write; it is returned for later control and observation. Only http
    /// and https sources are accepted.
    pub async fn enqueue(&self, request: DownloadRequest) -> Result<TaskId> {
        if !self.accepting_new() {
            return Err(Error::ShuttingDown);
        }

        let new_task = self.prepare(request, TaskState::Active)?;
        let source = new_task.source_uri.clone();
        let id = self.store.insert(&new_task).await?;
        self.scheduler.schedule(id).await?;

        self.bus
            .emit(TaskEvent::Queueing {
                id,
                bytes_read: 0,
                content_length: 0,
            })
            .await;
        tracing::info!(task_id = id.0, url = %source, "Task enqueued");
        Ok(id)
    }

    /// Enqueue a download in the paused state without scheduling it
    ///
    /// The record is durable immediately; a later [`resume`](Self::resume)
    /// activates it.
    pub async fn enqueue_paused(&self, request: DownloadRequest) -> Result<TaskId> {
        if !self.accepting_new() {
            return Err(Error::ShuttingDown);
        }

        let new_task = self.prepare(request, TaskState::Inactive)?;
        let id = self.store.insert(&new_task).await?;
        tracing::info!(task_id = id.0, "Task enqueued paused");
        Ok(id)
    }

    /// Observe a task's event stream
    ///
    /// Synchronously yields one status synthesized from the persisted
    /// record, then live events; see the bus contract for ordering and
    /// broadcast semantics.
    pub async fn observe(
        &self,
        id: TaskId,
    ) -> Result<impl Stream<Item = TaskEvent> + Send + Unpin> {
        self.bus.observe(id).await
    }

    /// Observe the first task carrying `tag` (smallest id)
    ///
    /// Returns [`Error::NotFound`] when no task carries the tag.
    pub async fn observe_tag(
        &self,
        tag: &str,
    ) -> Result<impl Stream<Item = TaskEvent> + Send + Unpin> {
        let tasks = self.store.find_by_tag(tag).await?;
        let first = tasks
            .first()
            .ok_or_else(|| Error::NotFound(format!("no task with tag '{tag}'")))?;
        self.bus.observe(TaskId(first.id)).await
    }

    /// Validate a request and fill its defaults into a storable task
    fn prepare(&self, request: DownloadRequest, state: TaskState) -> Result<NewTask> {
        let url = Url::parse(&request.source_url)
            .map_err(|e| Error::InvalidRequest(format!("invalid source URL: {e}")))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::InvalidRequest(format!(
                    "can only download http/https URLs, got scheme '{other}'"
                )));
            }
        }

        // Relative destinations land under the configured download dir
        let dest_path = if request.dest_path.is_absolute() {
            request.dest_path.clone()
        } else {
            self.config.download.download_dir.join(&request.dest_path)
        };
        let file_name = dest_path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned)
            .ok_or_else(|| {
                Error::InvalidRequest("destination must include a file name".to_string())
            })?;

        let title = request
            .title
            .filter(|title| !title.is_empty())
            .or_else(|| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_owned)
            })
            .unwrap_or(file_name);

        // The working file defaults to the scratch dir under a generated
        // unique name, so two tasks for the same destination never share it
        let temp_path = match request.temp_path {
            Some(path) => path,
            None => self
                .config
                .download
                .temp_dir
                .join(format!("{:016x}.part", rand::random::<u64>())),
        };
        if temp_path == dest_path {
            return Err(Error::InvalidRequest(
                "working file and destination must be distinct paths".to_string(),
            ));
        }

        Ok(NewTask {
            tag: request.tag,
            source_uri: request.source_url,
            title,
            description: request.description,
            dest_uri: dest_path.to_string_lossy().into_owned(),
            temp_uri: temp_path.to_string_lossy().into_owned(),
            max_retry: request.max_retry,
            state: state.to_i32(),
        })
    }
}
