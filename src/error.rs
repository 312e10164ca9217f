//! Error types for http-dl
//!
//! This module provides error handling for the library:
//! - Domain-specific error kinds (transport, validation, control operations)
//! - A database error sub-enum for persistence failures
//! - `#[from]` conversions so `?` works across layer boundaries

use thiserror::Error;

/// Result type alias for http-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for http-dl
///
/// This is the primary error type used throughout the library. Each variant
/// includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error (connection, timeout, stream I/O)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Server answered with a non-success status other than 416
    #[error("transport error: HTTP {status} from {url}")]
    Transport {
        /// HTTP status code returned by the server
        status: u16,
        /// Request URL
        url: String,
    },

    /// Resume offset rejected twice: the source shrank or changed under us
    #[error("range expired for task {id}: restart from offset 0 also failed")]
    RangeExpired {
        /// The task whose resume point went stale
        id: i64,
    },

    /// Downloaded content does not match the captured fingerprint
    #[error("validation failed for task {id}: expected {expected}, got {actual}")]
    Validation {
        /// The task whose download failed validation
        id: i64,
        /// Fingerprint captured at response time
        expected: String,
        /// Fingerprint computed from the downloaded bytes
        actual: String,
    },

    /// Control operation referenced an unknown task
    #[error("task not found: {0}")]
    NotFound(String),

    /// Task reached its retry budget and will not be scheduled again
    #[error("task {id} out of retries after {attempts} attempts")]
    ExhaustedRetries {
        /// The exhausted task
        id: i64,
        /// Attempts made before giving up
        attempts: i32,
    },

    /// Control operation attempted on a task in a terminal state
    #[error("cannot {operation} task {id} in state {current_state}")]
    StateConflict {
        /// The task in a terminal state
        id: i64,
        /// The operation that was attempted (e.g., "pause", "resume")
        operation: String,
        /// The state that rejects the operation
        current_state: String,
    },

    /// Enqueue request failed validation (bad scheme, empty destination, ...)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}
