//! Manager facade split into focused submodules.
//!
//! The `HttpDownloader` struct and its methods are organized by domain:
//! - [`enqueue`] - Request validation, task creation, observation
//! - [`control`] - Task lifecycle control (pause/resume, by id and by tag)
//!
//! The manager is an explicitly constructed, dependency-injected instance
//! holding the store, bus, engine, and scheduler adapter. There is no
//! process-wide singleton: embedders create as many independent managers
//! as they need.

mod control;
mod enqueue;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::bus::EventBus;
use crate::config::Config;
use crate::db::Store;
use crate::error::{Error, Result};
use crate::interceptor::Interceptor;
use crate::scheduler::{JobScheduler, TokioJobScheduler};
use crate::transfer::TransferEngine;
use crate::types::{TaskId, TaskState};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Persistent, resumable download manager (cloneable - all fields are
/// Arc-wrapped)
#[derive(Clone)]
pub struct HttpDownloader {
    /// Task store (public so embedders and integration tests can query
    /// task records directly)
    pub store: Arc<Store>,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) engine: Arc<TransferEngine>,
    pub(crate) scheduler: Arc<dyn JobScheduler>,
    pub(crate) config: Arc<Config>,
    accepting_new: Arc<AtomicBool>,
}

impl HttpDownloader {
    /// Create a manager with no interceptors
    ///
    /// This initializes all core components:
    /// - Opens/creates the SQLite store and runs migrations
    /// - Sets up the per-task event bus
    /// - Wires the transfer engine into the in-process scheduler
    /// - Restores scheduling for tasks that were active at last shutdown
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_interceptors(config, Vec::new()).await
    }

    /// Create a manager with the given interceptor chain
    ///
    /// Interceptors run in registration order on every transfer.
    pub async fn with_interceptors(
        config: Config,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Result<Self> {
        // Ensure download and scratch directories exist
        tokio::fs::create_dir_all(&config.download.download_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download.download_dir.display(),
                        e
                    ),
                ))
            })?;
        tokio::fs::create_dir_all(&config.download.temp_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create temp directory '{}': {}",
                        config.download.temp_dir.display(),
                        e
                    ),
                ))
            })?;

        let store = Arc::new(
            Store::new(
                &config.persistence.database_path,
                config.persistence.cache_capacity,
            )
            .await?,
        );
        let bus = Arc::new(EventBus::new(store.clone()));
        let engine = Arc::new(TransferEngine::new(
            store.clone(),
            bus.clone(),
            interceptors,
            config.download.buffer_size,
        ));
        let scheduler: Arc<dyn JobScheduler> = Arc::new(TokioJobScheduler::new(
            store.clone(),
            engine.clone(),
            bus.clone(),
            config.scheduler.clone(),
        ));

        let manager = Self {
            store,
            bus,
            engine,
            scheduler,
            config: Arc::new(config),
            accepting_new: Arc::new(AtomicBool::new(true)),
        };

        if manager.config.scheduler.persisted {
            manager.restore().await?;
        }

        Ok(manager)
    }

    /// Re-schedule every task that was active when the process last stopped
    async fn restore(&self) -> Result<()> {
        let active = self.store.list_by_state(TaskState::Active).await?;
        if active.is_empty() {
            return Ok(());
        }
        for task in &active {
            self.scheduler.schedule(TaskId(task.id)).await?;
        }
        tracing::info!(count = active.len(), "Restored scheduling for active tasks");
        Ok(())
    }

    /// Run a task immediately on the calling worker
    ///
    /// This is the entry point a host scheduling facility invokes when a
    /// job fires: it loads the record, executes the transfer, and returns
    /// the outcome. A propagated error means "reschedule under backoff"
    /// unless the task has reached its retry budget.
    pub async fn run_task(&self, id: TaskId) -> Result<()> {
        self.engine.run(id).await
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Stop accepting work, cancel pending jobs, and close the store
    ///
    /// Transfers already streaming stop at their next chunk boundary once
    /// the store is closed; scheduled reruns are canceled outright.
    pub async fn shutdown(&self) -> Result<()> {
        self.accepting_new.store(false, Ordering::SeqCst);
        self.scheduler.cancel_all().await;
        self.store.close().await;
        tracing::info!("Shutdown complete");
        Ok(())
    }

    pub(crate) fn accepting_new(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }
}
