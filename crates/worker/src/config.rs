use std::path::PathBuf;
use std::time::Duration;

/// Worker pool settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of jobs processed in parallel.
    pub concurrency: usize,
    /// Sleep between polls of an empty queue.
    pub poll_interval: Duration,
    /// Buffer size for the streamed copy.
    pub chunk_size: usize,
    /// Root folder holding one directory per project.
    pub projects_folder: PathBuf,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default    |
    /// |---------------------------|------------|
    /// | `WORKER_CONCURRENCY`      | `4`        |
    /// | `WORKER_POLL_INTERVAL_MS` | `250`      |
    /// | `UPLOAD_CHUNK_SIZE`       | `65536`    |
    /// | `PROJECTS_FOLDER`         | `projects` |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let concurrency: usize = std::env::var("WORKER_CONCURRENCY")
            .ok()
            .map(|v| v.parse().expect("WORKER_CONCURRENCY must be a valid usize"))
            .unwrap_or(defaults.concurrency);

        let poll_interval_ms: u64 = std::env::var("WORKER_POLL_INTERVAL_MS")
            .ok()
            .map(|v| v.parse().expect("WORKER_POLL_INTERVAL_MS must be a valid u64"))
            .unwrap_or(250);

        let chunk_size: usize = std::env::var("UPLOAD_CHUNK_SIZE")
            .ok()
            .map(|v| v.parse().expect("UPLOAD_CHUNK_SIZE must be a valid usize"))
            .unwrap_or(defaults.chunk_size);

        let projects_folder = std::env::var("PROJECTS_FOLDER")
            .map(PathBuf::from)
            .unwrap_or(defaults.projects_folder);

        Self {
            concurrency: concurrency.max(1),
            poll_interval: Duration::from_millis(poll_interval_ms),
            chunk_size: chunk_size.max(1),
            projects_folder,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_millis(250),
            chunk_size: 64 * 1024,
            projects_folder: PathBuf::from("projects"),
        }
    }
}
