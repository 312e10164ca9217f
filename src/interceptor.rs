//! Pluggable transfer hooks.
//!
//! Interceptors run at two points: right before a fetch, where one may
//! short-circuit the network entirely by supplying a locally available file
//! (a cache hit, a sideloaded copy), and right after a successful publish,
//! observe-only. They execute in registration order; the first hook that
//! returns a file wins and the rest are not consulted.

use crate::types::TaskInfo;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Hook into a task's fetch lifecycle
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Called with a read-only snapshot before the network fetch
    ///
    /// Return `Some(path)` to use that local file instead of fetching; the
    /// file is moved into the task's working location and validated like a
    /// downloaded body. Return `None` to let the fetch proceed.
    async fn on_queueing(&self, info: &TaskInfo) -> Option<PathBuf>;

    /// Called with the final record after the file is published
    async fn on_downloaded(&self, info: &TaskInfo);
}

/// First local file offered by the chain, in registration order
pub(crate) async fn first_local_file(
    interceptors: &[Arc<dyn Interceptor>],
    info: &TaskInfo,
) -> Option<PathBuf> {
    for interceptor in interceptors {
        if let Some(path) = interceptor.on_queueing(info).await {
            return Some(path);
        }
    }
    None
}

/// Notify every interceptor of a completed task
pub(crate) async fn notify_downloaded(interceptors: &[Arc<dyn Interceptor>], info: &TaskInfo) {
    for interceptor in interceptors {
        interceptor.on_downloaded(info).await;
    }
}
