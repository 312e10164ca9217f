use super::*;
use crate::error::Error;
use tokio_stream::StreamExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn enqueue_rejects_non_http_schemes() {
    let harness = harness().await;

    let result = harness
        .manager
        .enqueue(request("ftp://example.com/a.bin", "a.bin"))
        .await;
    assert!(matches!(result, Err(Error::InvalidRequest(_))));

    let result = harness
        .manager
        .enqueue(request("file:///etc/passwd", "a.bin"))
        .await;
    assert!(matches!(result, Err(Error::InvalidRequest(_))));
}

#[tokio::test]
async fn enqueue_rejects_unparseable_url() {
    let harness = harness().await;
    let result = harness
        .manager
        .enqueue(request("not a url at all", "a.bin"))
        .await;
    assert!(matches!(result, Err(Error::InvalidRequest(_))));
}

#[tokio::test]
async fn enqueue_rejects_destination_without_file_name() {
    let harness = harness().await;
    let result = harness
        .manager
        .enqueue(request("https://example.com/a.bin", "/"))
        .await;
    assert!(matches!(result, Err(Error::InvalidRequest(_))));
}

#[tokio::test]
async fn enqueue_rejects_working_file_equal_to_destination() {
    let harness = harness().await;
    let dest = harness.dir.path().join("downloads/a.bin");
    let result = harness
        .manager
        .enqueue(
            DownloadRequest::new("https://example.com/a.bin", &dest).temp_path(&dest),
        )
        .await;
    assert!(matches!(result, Err(Error::InvalidRequest(_))));
}

#[tokio::test]
async fn enqueue_paused_fills_defaults_without_running() {
    let harness = harness().await;

    let id = harness
        .manager
        .enqueue_paused(request("https://example.com/files/archive.tar.gz", "archive.tar.gz"))
        .await
        .unwrap();

    // Nothing is scheduled for a parked task
    tokio::time::sleep(Duration::from_millis(100)).await;

    let record = harness.manager.store.find(id).await.unwrap().unwrap();
    assert_eq!(record.task_state(), TaskState::Inactive);
    assert_eq!(record.retry_count, 0);
    assert_eq!(record.title, "archive.tar.gz", "title defaults to the URL's last segment");
    assert!(
        record
            .dest_path()
            .starts_with(harness.dir.path().join("downloads")),
        "relative destination resolves under the download dir"
    );
    assert!(
        record
            .temp_path()
            .starts_with(harness.dir.path().join("temp")),
        "working file defaults into the scratch dir"
    );
    assert!(
        record.temp_uri.ends_with(".part"),
        "generated working name carries the .part suffix: {}",
        record.temp_uri
    );
    assert_ne!(record.temp_path(), record.dest_path());
}

#[tokio::test]
async fn enqueued_ids_are_distinct_and_increasing() {
    let harness = harness().await;

    let first = harness
        .manager
        .enqueue_paused(request("https://example.com/a", "a.bin"))
        .await
        .unwrap();
    let second = harness
        .manager
        .enqueue_paused(request("https://example.com/b", "b.bin"))
        .await
        .unwrap();

    assert!(second.0 > first.0);
}

#[tokio::test]
async fn enqueue_runs_task_to_completion() {
    let harness = harness().await;
    let body = b"end to end".to_vec();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let id = harness
        .manager
        .enqueue(request(&format!("{}/a.bin", server.uri()), "a.bin"))
        .await
        .unwrap();

    wait_for_state(&harness.manager, id, TaskState::Success).await;

    let record = harness.manager.store.find(id).await.unwrap().unwrap();
    let published = tokio::fs::read(record.dest_path()).await.unwrap();
    assert_eq!(published, body);
    assert_eq!(record.content_length, body.len() as i64);
}

#[tokio::test]
async fn observe_unknown_task_is_not_found() {
    let harness = harness().await;
    assert!(matches!(
        harness.manager.observe(TaskId(404)).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn observe_tag_resolves_first_matching_task() {
    let harness = harness().await;

    let first = harness
        .manager
        .enqueue_paused(request("https://example.com/a", "a.bin").tag("batch"))
        .await
        .unwrap();
    let _second = harness
        .manager
        .enqueue_paused(request("https://example.com/b", "b.bin").tag("batch"))
        .await
        .unwrap();

    let mut stream = harness.manager.observe_tag("batch").await.unwrap();
    let status = stream.next().await.unwrap();
    assert_eq!(
        status.task_id(),
        first,
        "tag observation resolves to the oldest matching task"
    );
}

#[tokio::test]
async fn observe_tag_without_matches_is_not_found() {
    let harness = harness().await;
    assert!(matches!(
        harness.manager.observe_tag("nope").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn enqueue_after_shutdown_is_rejected() {
    let harness = harness().await;
    harness.manager.shutdown().await.unwrap();

    let result = harness
        .manager
        .enqueue(request("https://example.com/a.bin", "a.bin"))
        .await;
    assert!(matches!(result, Err(Error::ShuttingDown)));
}
