use std::path::PathBuf;
use std::sync::Arc;

use annotator_core::types::TaskId;
use annotator_core::upload::{new_task_id, UploadJob, JOB_QUEUE_KEY};
use annotator_store::{StoreHandle, UploadTaskRepo};

use crate::error::QueueError;

/// Hands upload jobs to whichever worker polls the store next.
#[derive(Clone)]
pub struct TaskQueue {
    handle: Arc<StoreHandle>,
}

impl TaskQueue {
    pub fn new(handle: Arc<StoreHandle>) -> Self {
        Self { handle }
    }

    /// Record a new task as `queued` and push its job onto the queue.
    ///
    /// Returns as soon as both writes land; the status entry exists before
    /// the job becomes visible to workers.
    pub async fn enqueue(
        &self,
        project_id: &str,
        filename: &str,
        staged_path: PathBuf,
    ) -> Result<TaskId, QueueError> {
        let job = UploadJob {
            task_id: new_task_id(),
            project_id: project_id.to_string(),
            filename: filename.to_string(),
            staged_path,
        };
        let payload = serde_json::to_string(&job)?;

        let store = self.handle.current().await;
        UploadTaskRepo::create_queued(&store, &job, chrono::Utc::now()).await?;
        store.push_job(JOB_QUEUE_KEY, &payload).await?;

        tracing::info!(
            task_id = %job.task_id,
            project_id,
            filename,
            store_mode = %store.mode(),
            "Upload job enqueued"
        );
        Ok(job.task_id)
    }
}
