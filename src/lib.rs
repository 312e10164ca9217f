//! # http-dl
//!
//! Resumable, persistent download manager library.
//!
//! ## Design Philosophy
//!
//! http-dl is designed to be:
//! - **Restart-proof** - Every task is a durable record; interrupted
//!   transfers resume at the byte they stopped at
//! - **Cooperative** - Pause never kills a worker; transfers stop cleanly
//!   at chunk boundaries and keep their partial file
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers observe per-task event streams, no
//!   polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use http_dl::{Config, DownloadRequest, HttpDownloader};
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = HttpDownloader::new(Config::default()).await?;
//!
//!     let id = downloader
//!         .enqueue(DownloadRequest::new(
//!             "https://example.com/archive.tar.gz",
//!             "archive.tar.gz",
//!         ))
//!         .await?;
//!
//!     // Observe progress; a late subscriber still gets an initial status
//!     let mut events = downloader.observe(id).await?;
//!     tokio::spawn(async move {
//!         while let Some(event) = events.next().await {
//!             println!("{}%: {:?}", event.percent(), event);
//!         }
//!     });
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Event distribution
pub mod bus;
/// Configuration types
pub mod config;
/// Persistence layer (task store, cache, id counter)
pub mod db;
/// Error types
pub mod error;
/// File operations (atomic publish, hashing)
pub mod fsutil;
/// Pluggable transfer hooks
pub mod interceptor;
/// Manager facade (decomposed into focused submodules)
pub mod manager;
/// Scheduler adapter and backoff policies
pub mod scheduler;
/// Transfer engine (resumable fetch, validation, publish)
pub mod transfer;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use bus::EventBus;
pub use config::{BackoffPolicy, Config, DownloadConfig, PersistenceConfig, SchedulerConfig};
pub use db::{Store, TaskRecord};
pub use error::{DatabaseError, Error, Result};
pub use interceptor::Interceptor;
pub use manager::HttpDownloader;
pub use scheduler::{JobScheduler, TokioJobScheduler};
pub use transfer::TransferEngine;
pub use types::{DownloadRequest, TaskEvent, TaskId, TaskInfo, TaskState, progress_percent};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the manager's
/// `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use http_dl::{Config, HttpDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = HttpDownloader::new(Config::default()).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: HttpDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
