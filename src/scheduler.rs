//! Scheduler adapter: the boundary to the job-scheduling facility.
//!
//! The host facility is consumed through the [`JobScheduler`] trait:
//! "run this task id, subject to the execution window and backoff policy"
//! and "stop every job for this task id". [`TokioJobScheduler`] is the
//! in-process implementation; an embedder with a platform scheduler can
//! supply its own.
//!
//! A scheduled job invokes the transfer engine and interprets the outcome:
//! success (or a clean pause) ends the job, a propagated failure leads to a
//! rerun under the configured backoff, unless the task's persisted state
//! says the retry budget is spent, in which case scheduling stops and no
//! error crosses this boundary.

use crate::bus::EventBus;
use crate::config::{BackoffPolicy, SchedulerConfig};
use crate::db::Store;
use crate::error::{Error, Result};
use crate::transfer::TransferEngine;
use crate::types::{TaskEvent, TaskId, TaskState};
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Boundary to the deferred-execution facility
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Enqueue a run of the task within the configured execution window
    ///
    /// Scheduling the same task again replaces its pending job.
    async fn schedule(&self, id: TaskId) -> Result<()>;

    /// Cancel every pending job for the task
    ///
    /// A transfer already streaming is not killed; it stops cooperatively
    /// at its next state check.
    async fn cancel_all_for(&self, id: TaskId);

    /// Cancel every pending job
    async fn cancel_all(&self);
}

/// Delay before the given 1-based attempt under the configured policy
///
/// LINEAR grows as `delay * attempt`, EXPONENTIAL as
/// `delay * 2^(attempt - 1)`; both are capped by `max_backoff`.
pub fn compute_backoff(config: &SchedulerConfig, attempt: u32) -> Duration {
    let attempt = attempt.max(1);
    let delay = match config.backoff_policy {
        BackoffPolicy::Linear => config.backoff_delay.saturating_mul(attempt),
        BackoffPolicy::Exponential => {
            let factor = 2u32.saturating_pow((attempt - 1).min(31));
            config.backoff_delay.saturating_mul(factor)
        }
    };
    delay.min(config.max_backoff)
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so
/// the actual delay falls between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

/// First-run delay, landing inside the execution window
fn initial_delay(config: &SchedulerConfig) -> Duration {
    let start = config.execution_window_start;
    if !config.jitter {
        return start;
    }
    let spread = config.execution_window_end.saturating_sub(start);
    let mut rng = rand::thread_rng();
    let fraction: f64 = rng.gen_range(0.0..=1.0);
    start + Duration::from_secs_f64(spread.as_secs_f64() * fraction)
}

/// In-process job scheduler driving the transfer engine on tokio tasks
pub struct TokioJobScheduler {
    store: Arc<Store>,
    engine: Arc<TransferEngine>,
    bus: Arc<EventBus>,
    config: SchedulerConfig,
    jobs: tokio::sync::Mutex<HashMap<i64, CancellationToken>>,
}

impl TokioJobScheduler {
    /// Create a scheduler over the given engine and store
    pub fn new(
        store: Arc<Store>,
        engine: Arc<TransferEngine>,
        bus: Arc<EventBus>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            engine,
            bus,
            config,
            jobs: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Job body: run, and rerun under backoff while the task stays active
    async fn drive(
        store: Arc<Store>,
        engine: Arc<TransferEngine>,
        bus: Arc<EventBus>,
        config: SchedulerConfig,
        token: CancellationToken,
        id: TaskId,
    ) {
        let mut delay = initial_delay(&config);
        let mut attempt: u32 = 0;

        loop {
            tokio::select! {
                // Cancellation wins over an elapsed timer
                biased;
                _ = token.cancelled() => {
                    tracing::debug!(task_id = id.0, "Scheduled job canceled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match engine.run(id).await {
                Ok(()) => return,
                Err(error) => {
                    let state = match store.find(id).await {
                        Ok(Some(task)) => task.task_state(),
                        _ => return,
                    };
                    match state {
                        TaskState::Active => {
                            attempt += 1;
                            delay = compute_backoff(&config, attempt);
                            if config.jitter {
                                delay = add_jitter(delay);
                            }
                            tracing::warn!(
                                task_id = id.0,
                                attempt,
                                delay_ms = delay.as_millis(),
                                error = %error,
                                "Rescheduling failed task under backoff"
                            );
                        }
                        TaskState::OutOfRetry => {
                            // Terminal: surface through the event stream
                            // only, nothing propagates past this boundary
                            let (bytes_read, content_length, attempts) =
                                match store.find(id).await {
                                    Ok(Some(task)) => (
                                        crate::fsutil::file_len(&task.temp_path()).await,
                                        task.content_length as u64,
                                        task.retry_count,
                                    ),
                                    _ => (0, 0, 0),
                                };
                            bus.emit(TaskEvent::Failed {
                                id,
                                bytes_read,
                                content_length,
                                error: Error::ExhaustedRetries {
                                    id: id.0,
                                    attempts,
                                }
                                .to_string(),
                            })
                            .await;
                            tracing::warn!(
                                task_id = id.0,
                                attempts,
                                "Task out of retries, no further scheduling"
                            );
                            return;
                        }
                        TaskState::Inactive | TaskState::Success => return,
                    }
                }
            }
        }
    }
}

#[async_trait]
impl JobScheduler for TokioJobScheduler {
    async fn schedule(&self, id: TaskId) -> Result<()> {
        let token = CancellationToken::new();
        {
            let mut jobs = self.jobs.lock().await;
            if let Some(previous) = jobs.insert(id.0, token.clone()) {
                previous.cancel();
            }
        }

        let store = self.store.clone();
        let engine = self.engine.clone();
        let bus = self.bus.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            Self::drive(store, engine, bus, config, token, id).await;
        });

        tracing::debug!(task_id = id.0, "Task scheduled");
        Ok(())
    }

    async fn cancel_all_for(&self, id: TaskId) {
        if let Some(token) = self.jobs.lock().await.remove(&id.0) {
            token.cancel();
        }
    }

    async fn cancel_all(&self) {
        let mut jobs = self.jobs.lock().await;
        for (_, token) in jobs.drain() {
            token.cancel();
        }
    }
}
