//! Integration tests for the upload, status and pending endpoints.

mod common;

use std::sync::Arc;
use std::time::Duration;

use annotator_api::gateway::BroadcastGateway;
use annotator_events::EventRelay;
use annotator_worker::{WorkerConfig, WorkerPool};
use axum::extract::ws::Message;
use axum::http::StatusCode;
use common::{body_json, get, post_multipart, TestApp};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const UPLOAD_URI: &str = "/api/v1/projects/p1/upload";

fn status_uri(task_id: &str) -> String {
    format!("/api/v1/projects/p1/upload/status/{task_id}")
}

fn staged_files(app: &TestApp) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(app.root.path().join("temp")) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

async fn upload(app: &TestApp, filename: &str, bytes: &[u8]) -> String {
    let response = post_multipart(app.router(), UPLOAD_URI, "file", Some(filename), bytes).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "queued");
    json["data"]["task_id"].as_str().unwrap().to_string()
}

fn spawn_workers(app: &TestApp, cancel: &CancellationToken) -> tokio::task::JoinHandle<()> {
    let pool = WorkerPool::new(
        Arc::clone(&app.state.store),
        app.state.projects.clone(),
        WorkerConfig {
            concurrency: 2,
            poll_interval: Duration::from_millis(5),
            chunk_size: 1024,
            projects_folder: app.root.path().to_path_buf(),
        },
    );
    tokio::spawn(pool.run(cancel.clone()))
}

async fn wait_for_status(app: &TestApp, task_id: &str, wanted: &str) -> serde_json::Value {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let json = body_json(get(app.router(), &status_uri(task_id)).await).await;
            if json["data"]["status"] == wanted {
                return json;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("task should reach the wanted status")
}

#[tokio::test]
async fn upload_to_missing_project_is_404() {
    let app = TestApp::new();
    let response = post_multipart(
        app.router(),
        "/api/v1/projects/nope/upload",
        "file",
        Some("cat.jpg"),
        b"bytes",
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn upload_without_file_part_is_400() {
    let app = TestApp::new();
    let response = post_multipart(app.router(), UPLOAD_URI, "other", Some("cat.jpg"), b"x").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "No file part");
}

#[tokio::test]
async fn upload_with_empty_filename_is_400() {
    let app = TestApp::new();
    let response = post_multipart(app.router(), UPLOAD_URI, "file", Some(""), b"x").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "No selected file");
    assert!(staged_files(&app).is_empty());
}

#[tokio::test]
async fn accepted_upload_is_staged_and_queued() {
    let app = TestApp::new();
    let task_id = upload(&app, "cat.jpg", b"jpeg bytes").await;

    let staged = staged_files(&app);
    assert_eq!(staged.len(), 1);
    let staged_name = staged[0].file_name().unwrap().to_str().unwrap().to_string();
    assert!(staged_name.ends_with("_cat.jpg"));
    assert_eq!(std::fs::read(&staged[0]).unwrap(), b"jpeg bytes");

    let json = body_json(get(app.router(), &status_uri(&task_id)).await).await;
    assert_eq!(json["data"]["task_id"], task_id.as_str());
    assert_eq!(json["data"]["status"], "queued");
    assert_eq!(json["data"]["progress"], 0);
    assert!(json["data"].get("image_info").is_none());
}

#[tokio::test]
async fn directory_parts_of_the_filename_are_dropped() {
    let app = TestApp::new();
    upload(&app, "../../etc/evil.jpg", b"x").await;

    let staged = staged_files(&app);
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].parent().unwrap(), app.root.path().join("temp"));
    assert!(staged[0].to_str().unwrap().ends_with("_evil.jpg"));
}

#[tokio::test]
async fn unknown_task_status_is_404() {
    let app = TestApp::new();
    let response = get(app.router(), &status_uri("does-not-exist")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pending_lists_unfinished_uploads_of_the_project() {
    let app = TestApp::new();
    let task_id = upload(&app, "cat.jpg", b"x").await;

    let response = get(app.router(), "/api/v1/projects/p1/uploads/pending").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let items = json["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["task_id"], task_id.as_str());
    assert_eq!(items[0]["status"], "queued");
    assert_eq!(items[0]["filename"], "cat.jpg");

    let missing = get(app.router(), "/api/v1/projects/nope/uploads/pending").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_completes_and_leaves_pending() {
    let app = TestApp::new();
    let task_id = upload(&app, "cat.jpg", &[0xAB; 4096]).await;

    let cancel = CancellationToken::new();
    let workers = spawn_workers(&app, &cancel);
    let json = wait_for_status(&app, &task_id, "completed").await;
    cancel.cancel();
    workers.await.unwrap();

    assert_eq!(json["data"]["progress"], 100);
    assert_eq!(json["data"]["image_info"]["name"], "cat.jpg");
    assert_eq!(json["data"]["image_info"]["size_bytes"], 4096);
    assert_eq!(
        std::fs::read(app.root.path().join("p1/images/cat.jpg")).unwrap(),
        vec![0xAB; 4096]
    );
    assert!(staged_files(&app).is_empty());

    let pending = body_json(get(app.router(), "/api/v1/projects/p1/uploads/pending").await).await;
    assert_eq!(pending["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn failed_upload_reports_error() {
    let app = TestApp::new();
    std::fs::write(app.root.path().join("p1/images"), b"file in the way").unwrap();
    let task_id = upload(&app, "cat.jpg", b"x").await;

    let cancel = CancellationToken::new();
    let workers = spawn_workers(&app, &cancel);
    let json = wait_for_status(&app, &task_id, "failed").await;
    cancel.cancel();
    workers.await.unwrap();

    assert_eq!(json["data"]["progress"], 0);
    assert!(!json["data"]["error"].as_str().unwrap().is_empty());
    assert!(json["data"].get("image_info").is_none());
}

#[tokio::test]
async fn websocket_clients_receive_events_through_relay_and_gateway() {
    let app = TestApp::new();
    let mut client = app.state.ws_manager.add("client".to_string()).await;

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(64);
    let relay = EventRelay::new(Arc::clone(&app.state.store), tx)
        .with_resubscribe_delay(Duration::from_millis(20));
    let relay_task = tokio::spawn(relay.run(cancel.clone()));
    let gateway = BroadcastGateway::new(
        Arc::clone(&app.state.ws_manager),
        Arc::clone(&app.state.pending),
    );
    let gateway_task = tokio::spawn(gateway.run(rx, cancel.clone()));

    // Give the relay time to subscribe before events are published.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let task_id = upload(&app, "cat.jpg", b"bytes").await;
    let workers = spawn_workers(&app, &cancel);

    let events = tokio::time::timeout(Duration::from_secs(10), async {
        let mut events = Vec::new();
        while let Some(frame) = client.recv().await {
            let Message::Text(text) = frame else { continue };
            let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            let done = value["event"] == "upload_completed";
            events.push(value);
            if done {
                return events;
            }
        }
        events
    })
    .await
    .expect("client should see the upload complete");

    cancel.cancel();
    workers.await.unwrap();
    relay_task.await.unwrap();
    gateway_task.await.unwrap();

    assert!(events.iter().all(|e| e["data"]["task_id"] == task_id.as_str()));
    let progress: Vec<_> = events
        .iter()
        .filter(|e| e["event"] == "upload_progress")
        .map(|e| e["data"]["progress"].as_u64().unwrap())
        .collect();
    assert_eq!(progress, vec![0, 25, 75]);
    assert_eq!(events.last().unwrap()["data"]["image_info"]["name"], "cat.jpg");
}
