#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use annotator_core::project::FsProjectStorage;
use annotator_core::retry::RetryPolicy;
use annotator_core::upload::UploadSnapshot;
use annotator_store::{StatusStore, StoreConfig, StoreHandle, UploadTaskRepo};
use annotator_worker::{WorkerConfig, WorkerPool};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// A projects root with one project directory, `p1`.
pub struct TestProjects {
    pub root: tempfile::TempDir,
}

impl TestProjects {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(root.path().join("p1")).expect("project dir");
        std::fs::create_dir(root.path().join("temp")).expect("staging dir");
        Self { root }
    }

    pub fn storage(&self) -> Arc<FsProjectStorage> {
        Arc::new(FsProjectStorage::new(self.root.path()))
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Write `bytes` into the staging folder and return the staged path.
    pub fn stage(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self
            .root
            .path()
            .join("temp")
            .join(format!("{}_{name}", annotator_core::upload::new_task_id()));
        std::fs::write(&path, bytes).expect("stage file");
        path
    }
}

pub fn memory_handle() -> Arc<StoreHandle> {
    Arc::new(StoreHandle::in_memory(StoreConfig::default()))
}

/// Config pointing at a local port nobody listens on, with no fallbacks
/// and tiny retry budgets.
pub async fn unreachable_store_config() -> StoreConfig {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);

    StoreConfig {
        host: "127.0.0.1".into(),
        port,
        probe_timeout: Duration::from_millis(100),
        dns_timeout: Duration::from_millis(100),
        op_timeout: Duration::from_millis(100),
        startup_retry: RetryPolicy::fixed(2, Duration::from_millis(1)),
        worker_retry: RetryPolicy::fixed(1, Duration::from_millis(1)),
        fallback_hosts: Vec::new(),
        ..Default::default()
    }
}

pub fn fast_worker_config(projects: &TestProjects, concurrency: usize) -> WorkerConfig {
    WorkerConfig {
        concurrency,
        poll_interval: Duration::from_millis(5),
        chunk_size: 1024,
        projects_folder: projects.path().to_path_buf(),
    }
}

/// Start a pool in the background. Cancel the token to stop it.
pub fn spawn_pool(
    handle: &Arc<StoreHandle>,
    projects: &TestProjects,
    concurrency: usize,
) -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let cancel = CancellationToken::new();
    let pool = WorkerPool::new(
        Arc::clone(handle),
        projects.storage(),
        fast_worker_config(projects, concurrency),
    );
    let join = tokio::spawn(pool.run(cancel.clone()));
    (cancel, join)
}

/// Poll until the task reaches a terminal status.
pub async fn wait_for_terminal(store: &StatusStore, task_id: &str) -> UploadSnapshot {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let snap = UploadTaskRepo::snapshot(store, task_id)
                .await
                .expect("snapshot");
            if snap.status.is_terminal() {
                return snap;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("task should reach a terminal status")
}

/// A real JPEG of the given size.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x ^ y) % 256) as u8])
    });
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Jpeg)
        .expect("encode jpeg");
    out.into_inner()
}
