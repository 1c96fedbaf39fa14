//! In-process worker pool.
//!
//! While the store is in memory mode, jobs enqueued by this process sit in
//! its private job list where no standalone worker can reach them. The web
//! process therefore runs its own pool as soon as its store is in memory
//! mode, whether it started degraded or downgraded later. Since the
//! downgrade is one-way the pool never has to stop early.

use std::sync::Arc;

use annotator_core::project::ProjectStorage;
use annotator_store::{StoreHandle, StoreMode};
use annotator_worker::{WorkerConfig, WorkerPool};
use tokio_util::sync::CancellationToken;

/// When local workers start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalWorkers {
    /// Run from the start (`EMBEDDED_WORKERS > 0`).
    Always,
    /// Run once the store is in memory mode.
    WhenDegraded,
}

/// Run a worker pool on `handle` according to `when` until `cancel` fires.
///
/// In [`LocalWorkers::WhenDegraded`] the store mode is checked every
/// `config.poll_interval`.
pub async fn run_local_workers(
    handle: Arc<StoreHandle>,
    projects: Arc<dyn ProjectStorage>,
    config: WorkerConfig,
    when: LocalWorkers,
    cancel: CancellationToken,
) {
    if when == LocalWorkers::WhenDegraded {
        loop {
            if handle.mode().await == StoreMode::Memory {
                tracing::warn!(
                    concurrency = config.concurrency,
                    "Status store in memory mode, running upload jobs in-process"
                );
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(config.poll_interval) => {}
            }
        }
    }

    WorkerPool::new(handle, projects, config).run(cancel).await;
}
