//! Core types for http-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for a download task
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for TaskId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<TaskId> for i64 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl PartialEq<i64> for TaskId {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl PartialEq<TaskId> for i64 {
    fn eq(&self, other: &TaskId) -> bool {
        *self == other.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for TaskId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Task lifecycle state
///
/// `OutOfRetry` and `Success` are terminal: no transition is defined out of
/// them, and control operations on a terminal task fail with a state
/// conflict. A new enqueue creates a fresh task instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Eligible to run or currently running
    Active,
    /// Paused by the caller
    Inactive,
    /// Terminal failure: retry budget exhausted
    OutOfRetry,
    /// Terminal success: file published to its destination
    Success,
}

impl TaskState {
    /// Convert integer state code to TaskState
    pub fn from_i32(state: i32) -> Self {
        match state {
            1 => TaskState::Active,
            2 => TaskState::Inactive,
            3 => TaskState::OutOfRetry,
            4 => TaskState::Success,
            _ => TaskState::Inactive, // Unknown codes decode to paused, never running
        }
    }

    /// Convert TaskState to integer state code
    pub fn to_i32(&self) -> i32 {
        match self {
            TaskState::Active => 1,
            TaskState::Inactive => 2,
            TaskState::OutOfRetry => 3,
            TaskState::Success => 4,
        }
    }

    /// Whether this state admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::OutOfRetry | TaskState::Success)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskState::Active => "active",
            TaskState::Inactive => "inactive",
            TaskState::OutOfRetry => "out_of_retry",
            TaskState::Success => "success",
        };
        write!(f, "{name}")
    }
}

/// Event emitted on a task's channel during its lifecycle
///
/// Every variant carries the cumulative bytes read and the total content
/// length (0 while unknown). Events for one task are delivered in emission
/// order; no ordering holds across different tasks.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// Task accepted for execution, transfer not yet started
    Queueing {
        /// Task ID
        id: TaskId,
        /// Bytes already present in the working file
        bytes_read: u64,
        /// Total content length (0 = unknown)
        content_length: u64,
    },

    /// Transfer progress update
    Downloading {
        /// Task ID
        id: TaskId,
        /// Cumulative bytes read
        bytes_read: u64,
        /// Total content length (0 = unknown)
        content_length: u64,
    },

    /// Transfer stopped cooperatively after a pause request
    Pausing {
        /// Task ID
        id: TaskId,
        /// Bytes read before the stop
        bytes_read: u64,
        /// Total content length (0 = unknown)
        content_length: u64,
    },

    /// Full body received, fingerprint check in progress
    Validating {
        /// Task ID
        id: TaskId,
        /// Bytes read
        bytes_read: u64,
        /// Total content length
        content_length: u64,
    },

    /// Attempt failed (validation mismatch, transport error, or retry budget exhausted)
    Failed {
        /// Task ID
        id: TaskId,
        /// Bytes read before the failure
        bytes_read: u64,
        /// Total content length (0 = unknown)
        content_length: u64,
        /// Error cause
        error: String,
    },

    /// File validated and published to its destination
    Succeeded {
        /// Task ID
        id: TaskId,
        /// Bytes read (equals content_length)
        bytes_read: u64,
        /// Total content length
        content_length: u64,
    },
}

impl TaskEvent {
    /// Task this event belongs to
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::Queueing { id, .. }
            | TaskEvent::Downloading { id, .. }
            | TaskEvent::Pausing { id, .. }
            | TaskEvent::Validating { id, .. }
            | TaskEvent::Failed { id, .. }
            | TaskEvent::Succeeded { id, .. } => *id,
        }
    }

    /// Cumulative bytes read carried by this event
    pub fn bytes_read(&self) -> u64 {
        match self {
            TaskEvent::Queueing { bytes_read, .. }
            | TaskEvent::Downloading { bytes_read, .. }
            | TaskEvent::Pausing { bytes_read, .. }
            | TaskEvent::Validating { bytes_read, .. }
            | TaskEvent::Failed { bytes_read, .. }
            | TaskEvent::Succeeded { bytes_read, .. } => *bytes_read,
        }
    }

    /// Total content length carried by this event (0 = unknown)
    pub fn content_length(&self) -> u64 {
        match self {
            TaskEvent::Queueing { content_length, .. }
            | TaskEvent::Downloading { content_length, .. }
            | TaskEvent::Pausing { content_length, .. }
            | TaskEvent::Validating { content_length, .. }
            | TaskEvent::Failed { content_length, .. }
            | TaskEvent::Succeeded { content_length, .. } => *content_length,
        }
    }

    /// Progress percentage for this event, `floor(100 * bytes / total)`
    pub fn percent(&self) -> u8 {
        progress_percent(self.bytes_read(), self.content_length())
    }
}

/// Progress percentage as `floor(100 * bytes_read / content_length)`
///
/// Reports 0 while the content length is unknown (0) rather than dividing
/// by zero.
pub fn progress_percent(bytes_read: u64, content_length: u64) -> u8 {
    if content_length == 0 {
        return 0;
    }
    ((100 * bytes_read) / content_length).min(100) as u8
}

/// Read-only snapshot of a task handed to interceptors
#[derive(Clone, Debug)]
pub struct TaskInfo {
    /// Task ID
    pub id: TaskId,

    /// Caller-supplied grouping key
    pub tag: Option<String>,

    /// Source URL
    pub source_url: String,

    /// Display title
    pub title: String,

    /// Free-form description
    pub description: Option<String>,

    /// Destination path on disk
    pub dest_path: PathBuf,

    /// Bytes read so far
    pub bytes_read: u64,

    /// Total content length (0 = unknown)
    pub content_length: u64,
}

/// A download request to enqueue
///
/// Built with [`DownloadRequest::new`] and the chainable setters; `enqueue`
/// validates the URL scheme (http/https only) and fills the remaining
/// defaults: the title falls back to the last URL path segment, the working
/// file defaults to the configured scratch directory with a generated
/// unique name, and `max_retry` defaults to 5. A negative `max_retry` means
/// retry forever.
#[derive(Clone, Debug)]
pub struct DownloadRequest {
    /// Source URL (http or https)
    pub source_url: String,

    /// Destination path including the file name
    pub dest_path: PathBuf,

    /// Working file path (None = scratch dir + generated name)
    pub temp_path: Option<PathBuf>,

    /// Grouping key shared by related tasks (not unique)
    pub tag: Option<String>,

    /// Display title (None = last URL path segment)
    pub title: Option<String>,

    /// Free-form description
    pub description: Option<String>,

    /// Maximum automatic retry attempts (negative = retry forever)
    pub max_retry: i32,
}

/// Default retry budget for new requests
pub const DEFAULT_MAX_RETRY: i32 = 5;

impl DownloadRequest {
    /// Create a request for `source_url` saved to `dest_path`
    pub fn new(source_url: impl Into<String>, dest_path: impl Into<PathBuf>) -> Self {
        Self {
            source_url: source_url.into(),
            dest_path: dest_path.into(),
            temp_path: None,
            tag: None,
            title: None,
            description: None,
            max_retry: DEFAULT_MAX_RETRY,
        }
    }

    /// Set the working file path
    pub fn temp_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_path = Some(path.into());
        self
    }

    /// Set the grouping tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Set the display title
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the retry budget (negative = retry forever)
    pub fn max_retry(mut self, max_retry: i32) -> Self {
        self.max_retry = max_retry;
        self
    }
}
