//! Pool of queue-polling worker loops.
//!
//! Each loop pops one job at a time from the shared queue, obtains a
//! store for it via [`StoreHandle::worker_store`] and runs
//! [`process_upload`] on a separate task so that a panicking job is
//! recorded as failed instead of taking the loop down.

use std::sync::Arc;

use annotator_core::project::ProjectStorage;
use annotator_core::upload::{UploadJob, JOB_QUEUE_KEY};
use annotator_store::StoreHandle;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::upload::{process_upload, record_failure, UploadOutcome};

pub struct WorkerPool {
    handle: Arc<StoreHandle>,
    projects: Arc<dyn ProjectStorage>,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(
        handle: Arc<StoreHandle>,
        projects: Arc<dyn ProjectStorage>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            handle,
            projects,
            config,
        }
    }

    /// Run `config.concurrency` loops until `cancel` fires.
    ///
    /// A job that is already running when `cancel` fires is finished
    /// before its loop exits; in-flight copies are never aborted.
    pub async fn run(self, cancel: CancellationToken) {
        let shared = Arc::new(self);
        let mut loops = JoinSet::new();

        for worker_id in 0..shared.config.concurrency {
            let pool = Arc::clone(&shared);
            let cancel = cancel.clone();
            loops.spawn(async move { pool.worker_loop(worker_id, cancel).await });
        }

        tracing::info!(concurrency = shared.config.concurrency, "Worker pool started");

        while let Some(result) = loops.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker loop terminated abnormally");
            }
        }

        tracing::info!("Worker pool stopped");
    }

    async fn worker_loop(&self, worker_id: usize, cancel: CancellationToken) {
        tracing::debug!(worker_id, "Worker loop started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let store = self.handle.current().await;
            let raw = match store.pop_job(JOB_QUEUE_KEY).await {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    if !self.idle(&cancel).await {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    tracing::warn!(worker_id, error = %e, "Failed to poll job queue");
                    if !self.idle(&cancel).await {
                        break;
                    }
                    continue;
                }
            };

            let job: UploadJob = match serde_json::from_str(&raw) {
                Ok(job) => job,
                Err(e) => {
                    tracing::error!(worker_id, error = %e, "Discarding malformed job payload");
                    continue;
                }
            };

            self.run_job(worker_id, job).await;
        }

        tracing::debug!(worker_id, "Worker loop stopped");
    }

    /// Sleep one poll interval. Returns `false` if cancelled meanwhile.
    async fn idle(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.poll_interval) => true,
        }
    }

    async fn run_job(&self, worker_id: usize, job: UploadJob) {
        let store = self.handle.worker_store().await;
        let projects = Arc::clone(&self.projects);
        let chunk_size = self.config.chunk_size;

        let task = {
            let store = Arc::clone(&store);
            let job = job.clone();
            tokio::spawn(async move {
                process_upload(&store, projects.as_ref(), &job, chunk_size).await
            })
        };

        match task.await {
            Ok(UploadOutcome::Completed(_)) => {
                tracing::debug!(worker_id, task_id = %job.task_id, "Job finished");
            }
            Ok(UploadOutcome::Failed { step, .. }) => {
                tracing::debug!(worker_id, task_id = %job.task_id, %step, "Job failed");
            }
            Ok(UploadOutcome::AlreadyFinished(_)) => {
                tracing::debug!(worker_id, task_id = %job.task_id, "Job skipped");
            }
            Err(e) => {
                tracing::error!(worker_id, task_id = %job.task_id, error = %e, "Upload job panicked");
                record_failure(&store, &job, &format!("Internal error: {e}")).await;
            }
        }
    }
}
