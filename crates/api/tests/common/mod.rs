#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use annotator_api::config::ServerConfig;
use annotator_api::router::build_app_router;
use annotator_api::state::AppState;
use annotator_api::ws::WsManager;
use annotator_store::{StoreConfig, StoreHandle};
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

pub const BOUNDARY: &str = "annotator-test-boundary";

/// Build a test `ServerConfig` rooted at `projects_folder`.
pub fn test_config(projects_folder: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        projects_folder: projects_folder.to_path_buf(),
        embedded_workers: 0,
        relay_resubscribe_secs: 1,
    }
}

/// A projects root containing project `p1`, plus an app backed by the
/// in-memory store.
pub struct TestApp {
    pub root: tempfile::TempDir,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(root.path().join("p1")).expect("project dir");

        let store = Arc::new(StoreHandle::in_memory(StoreConfig::default()));
        let state = AppState::new(test_config(root.path()), store, Arc::new(WsManager::new()));
        Self { root, state }
    }

    /// A fresh router over the shared state.
    pub fn router(&self) -> Router {
        build_app_router(self.state.clone(), &self.state.config)
    }
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

/// POST a multipart body with a single part.
pub async fn post_multipart(
    app: Router,
    uri: &str,
    field: &str,
    filename: Option<&str>,
    content: &[u8],
) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(field, filename, content)))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub fn multipart_body(field: &str, filename: Option<&str>, content: &[u8]) -> Vec<u8> {
    let disposition = match filename {
        Some(name) => format!("form-data; name=\"{field}\"; filename=\"{name}\""),
        None => format!("form-data; name=\"{field}\""),
    };
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Disposition: {disposition}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
