//! End-to-end lifecycle tests against a mock HTTP server: pause/resume
//! round-trips, destination collisions, and restart recovery.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use http_dl::{
    BackoffPolicy, Config, DownloadConfig, DownloadRequest, HttpDownloader, PersistenceConfig,
    SchedulerConfig, TaskEvent, TaskId, TaskState,
};
use std::path::Path;
use std::time::Duration;
use tokio_stream::StreamExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(root: &Path) -> Config {
    Config {
        download: DownloadConfig {
            download_dir: root.join("downloads"),
            temp_dir: root.join("temp"),
            buffer_size: 256,
        },
        persistence: PersistenceConfig {
            database_path: root.join("tasks.db"),
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
    }
}

fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

async fn wait_for_state(downloader: &HttpDownloader, id: TaskId, state: TaskState) {
    for _ in 0..500 {
        if downloader
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

/// A task paused at byte 400 of 1000: the observer immediately sees
/// PAUSING at 400, and resuming fetches only bytes 400..1000 via a range
/// request before ending with SUCCEEDED at 1000.
#[tokio::test]
async fn paused_task_resumes_with_range_request_and_succeeds() {
    let root = tempfile::tempdir().unwrap();
    let body: Vec<u8> = (0..1000u32).map(|i| (i % 241) as u8).collect();

    // Only the resume request is answered; a restart from byte 0 would
    // miss every mock and fail the transfer
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .and(header("Range", "bytes=400-"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(body[400..].to_vec()))
        .mount(&server)
        .await;

    let downloader = HttpDownloader::new(test_config(root.path())).await.unwrap();

    // A task that got through 400 bytes of an earlier attempt, then paused
    let part = root.path().join("temp/file.bin.part");
    let id = downloader
        .enqueue_paused(
            DownloadRequest::new(format!("{}/file.bin", server.uri()), "file.bin")
                .temp_path(&part),
        )
        .await
        .unwrap();
    tokio::fs::create_dir_all(part.parent().unwrap())
        .await
        .unwrap();
    tokio::fs::write(&part, &body[..400]).await.unwrap();
    downloader
        .store
        .update_transfer_meta(id, 1000, Some(&md5_hex(&body)))
        .await
        .unwrap();

    // A late observer is never left without a status
    let mut events = downloader.observe(id).await.unwrap();
    match events.next().await.unwrap() {
        TaskEvent::Pausing {
            bytes_read,
            content_length,
            ..
        } => {
            assert_eq!(bytes_read, 400);
            assert_eq!(content_length, 1000);
        }
        other => panic!("expected synthesized PAUSING, got {other:?}"),
    }

    downloader.resume(id).await.unwrap();

    // Drain until the terminal event for this attempt
    let mut last = None;
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(5), events.next()).await {
        let done = matches!(event, TaskEvent::Succeeded { .. } | TaskEvent::Failed { .. });
        last = Some(event);
        if done {
            break;
        }
    }
    match last {
        Some(TaskEvent::Succeeded {
            bytes_read,
            content_length,
            ..
        }) => {
            assert_eq!(bytes_read, 1000);
            assert_eq!(content_length, 1000);
        }
        other => panic!("expected SUCCEEDED(1000), got {other:?}"),
    }

    let record = downloader.store.find(id).await.unwrap().unwrap();
    assert_eq!(record.task_state(), TaskState::Success);
    let published = tokio::fs::read(record.dest_path()).await.unwrap();
    assert_eq!(published, body, "resumed file must be byte-identical");

    // Exactly one request: the range fetch; bytes 0..400 were never
    // re-downloaded
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

/// Two tasks writing to the same destination name end up as two distinct
/// files; the second is auto-suffixed, nothing is overwritten.
#[tokio::test]
async fn colliding_destinations_produce_two_distinct_files() {
    let root = tempfile::tempdir().unwrap();
    let body_a = b"first payload".to_vec();
    let body_b = b"second payload, longer".to_vec();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body_a.clone()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body_b.clone()))
        .mount(&server)
        .await;

    let downloader = HttpDownloader::new(test_config(root.path())).await.unwrap();

    let first = downloader
        .enqueue(DownloadRequest::new(format!("{}/a", server.uri()), "same.bin"))
        .await
        .unwrap();
    let second = downloader
        .enqueue(DownloadRequest::new(format!("{}/b", server.uri()), "same.bin"))
        .await
        .unwrap();

    wait_for_state(&downloader, first, TaskState::Success).await;
    wait_for_state(&downloader, second, TaskState::Success).await;

    let landed_first = downloader
        .store
        .find(first)
        .await
        .unwrap()
        .unwrap()
        .dest_path();
    let landed_second = downloader
        .store
        .find(second)
        .await
        .unwrap()
        .unwrap()
        .dest_path();

    assert_ne!(
        landed_first, landed_second,
        "two tasks must never publish to the same path"
    );
    let contents = [
        tokio::fs::read(&landed_first).await.unwrap(),
        tokio::fs::read(&landed_second).await.unwrap(),
    ];
    assert!(contents.contains(&body_a));
    assert!(contents.contains(&body_b));
    assert!(
        root.path().join("downloads/same_1.bin").exists(),
        "the losing task publishes under the suffixed name"
    );
}

/// Tasks active at shutdown are re-scheduled when a new manager opens the
/// same store.
#[tokio::test]
async fn active_tasks_are_rescheduled_after_restart() {
    let root = tempfile::tempdir().unwrap();
    let body = b"survives restarts".to_vec();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    // First process life: the task becomes active but never runs (crash
    // before the scheduled job fired)
    let id = {
        let downloader = HttpDownloader::new(test_config(root.path())).await.unwrap();
        let id = downloader
            .enqueue_paused(DownloadRequest::new(
                format!("{}/file.bin", server.uri()),
                "file.bin",
            ))
            .await
            .unwrap();
        downloader
            .store
            .update_state(id, TaskState::Active)
            .await
            .unwrap();
        downloader.store.close().await;
        id
    };

    // Second life: restore() picks the active task up and finishes it
    let downloader = HttpDownloader::new(test_config(root.path())).await.unwrap();
    wait_for_state(&downloader, id, TaskState::Success).await;

    let record = downloader.store.find(id).await.unwrap().unwrap();
    assert_eq!(
        tokio::fs::read(record.dest_path()).await.unwrap(),
        body
    );
}
