//! Persistence layer for http-dl
//!
//! Handles SQLite persistence for task records plus the durable id counter,
//! fronted by a bounded in-memory cache.
//!
//! ## Submodules
//!
//! Methods on [`Store`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`tasks`] — Task record CRUD with cache coherence
//! - [`counter`] — Durable monotonic id generation
//! - [`cache`] — Generic bounded LRU cache
//!
//! The store owns the durable representation; the cache is a read-through /
//! write-through mirror. Every successful mutation refreshes the cached
//! entry from the row before the mutation is considered complete, and all
//! mutations are serialized behind a single write lock.

use crate::types::{TaskId, TaskInfo, TaskState};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

pub mod cache;
mod counter;
mod migrations;
mod tasks;

pub use cache::BoundedCache;

/// New task to be inserted into the store
///
/// The id is assigned by the store at insert time; callers never choose it.
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Caller-supplied grouping key
    pub tag: Option<String>,
    /// Source URL
    pub source_uri: String,
    /// Display title
    pub title: String,
    /// Free-form description
    pub description: Option<String>,
    /// Destination path on disk
    pub dest_uri: String,
    /// Working file path, distinct from the destination until publish
    pub temp_uri: String,
    /// Maximum automatic retry attempts (negative = retry forever)
    pub max_retry: i32,
    /// Initial state code (active, or inactive for a parked enqueue)
    pub state: i32,
}

/// Task record from the store
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TaskRecord {
    /// Unique task id, assigned once by the store
    pub id: i64,
    /// Caller-supplied grouping key
    pub tag: Option<String>,
    /// Source URL
    pub source_uri: String,
    /// Display title
    pub title: String,
    /// Free-form description
    pub description: Option<String>,
    /// Destination path on disk
    pub dest_uri: String,
    /// Working file path
    pub temp_uri: String,
    /// Maximum automatic retry attempts (negative = retry forever)
    pub max_retry: i32,
    /// Attempts since the last success or reset
    pub retry_count: i32,
    /// Current state code (see [`TaskState`])
    pub state: i32,
    /// Total size once known; 0 = unknown
    pub content_length: i64,
    /// Opaque validator captured at response time (ETag or content hash)
    pub fingerprint: Option<String>,
    /// Unix timestamp when the task was created
    pub created_at: i64,
}

impl TaskRecord {
    /// Decoded lifecycle state
    pub fn task_state(&self) -> TaskState {
        TaskState::from_i32(self.state)
    }

    /// Whether the task is eligible to run
    pub fn is_active(&self) -> bool {
        self.task_state() == TaskState::Active
    }

    /// Whether the task retries forever
    pub fn is_forced(&self) -> bool {
        self.max_retry < 0
    }

    /// Destination path on disk
    pub fn dest_path(&self) -> PathBuf {
        PathBuf::from(&self.dest_uri)
    }

    /// Working file path on disk
    pub fn temp_path(&self) -> PathBuf {
        PathBuf::from(&self.temp_uri)
    }

    /// Read-only snapshot for interceptors and observers
    pub fn to_info(&self, bytes_read: u64) -> TaskInfo {
        TaskInfo {
            id: TaskId(self.id),
            tag: self.tag.clone(),
            source_url: self.source_uri.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            dest_path: self.dest_path(),
            bytes_read,
            content_length: self.content_length as u64,
        }
    }
}

/// Persistent task store with a coherent bounded cache
pub struct Store {
    pool: SqlitePool,
    cache: tokio::sync::Mutex<BoundedCache<i64, TaskRecord>>,
    /// Serializes all mutating operations so no interleaved partial writes
    /// are observable through `find`
    write_lock: tokio::sync::Mutex<()>,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
