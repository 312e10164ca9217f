use super::HttpDownloader;
use crate::config::{BackoffPolicy, Config, DownloadConfig, PersistenceConfig, SchedulerConfig};
use crate::types::{DownloadRequest, TaskId, TaskState};
use std::time::Duration;
use tempfile::TempDir;

mod enqueue;

struct Harness {
    manager: HttpDownloader,
    dir: TempDir,
}

/// A manager wired for tests: immediate execution window, tiny backoff,
/// everything under a scratch directory
async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        download: DownloadConfig {
            download_dir: dir.path().join("downloads"),
            temp_dir: dir.path().join("temp"),
            buffer_size: 256,
        },
        persistence: PersistenceConfig {
            database_path: dir.path().join("tasks.db"),
            cache_capacity: 30,
        },
        scheduler: SchedulerConfig {
            execution_window_start: Duration::ZERO,
            execution_window_end: Duration::ZERO,
            backoff_delay: Duration::from_millis(10),
            backoff_policy: BackoffPolicy::Exponential,
            max_backoff: Duration::from_millis(100),
            jitter: false,
            require_network: true,
            persisted: true,
        },
    };
    Harness {
        manager: HttpDownloader::new(config).await.unwrap(),
        dir,
    }
}

async fn wait_for_state(manager: &HttpDownloader, id: TaskId, state: TaskState) {
    for _ in 0..200 {
        if manager
            .store
            .find(id)
            .await
            .unwrap()
            .unwrap()
            .task_state()
            == state
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {id} never reached {state:?}");
}

fn request(url: &str, name: &str) -> DownloadRequest {
    DownloadRequest::new(url, name)
}
