//! Upload task field maps in the status store.
//!
//! Each task lives under `upload_task:<task_id>`. The web process writes
//! the initial fields at enqueue time; afterwards only the worker running
//! the task writes to it.

use annotator_core::types::Timestamp;
use annotator_core::upload::{
    task_key, ImageInfo, UploadJob, UploadSnapshot, UploadStatus, FIELD_CREATED, FIELD_ERROR,
    FIELD_FILENAME, FIELD_IMAGE_INFO, FIELD_PROGRESS, FIELD_PROJECT_ID, FIELD_STATUS,
    PROGRESS_DONE, PROGRESS_STARTED,
};

use crate::error::StoreError;
use crate::store::StatusStore;

/// Provides typed access to upload task field maps.
pub struct UploadTaskRepo;

impl UploadTaskRepo {
    /// Record a freshly enqueued task: `queued`, progress 0, plus its
    /// filename, project and creation time.
    pub async fn create_queued(
        store: &StatusStore,
        job: &UploadJob,
        created: Timestamp,
    ) -> Result<(), StoreError> {
        let key = task_key(&job.task_id);
        store
            .set_field(&key, FIELD_STATUS, UploadStatus::Queued.as_str())
            .await?;
        store
            .set_field(&key, FIELD_PROGRESS, &PROGRESS_STARTED.to_string())
            .await?;
        store.set_field(&key, FIELD_FILENAME, &job.filename).await?;
        store
            .set_field(&key, FIELD_PROJECT_ID, &job.project_id)
            .await?;
        store
            .set_field(&key, FIELD_CREATED, &created.to_rfc3339())
            .await
    }

    /// Set status and progress for a task that is still in flight.
    ///
    /// Status is written before progress, so a reader may briefly see the
    /// new status with the previous progress value. A task that already
    /// reached a terminal status is left alone.
    pub async fn set_progress(
        store: &StatusStore,
        task_id: &str,
        status: UploadStatus,
        progress: u8,
    ) -> Result<(), StoreError> {
        if Self::is_finished(store, task_id).await? {
            tracing::debug!(task_id, "Ignoring progress update for finished task");
            return Ok(());
        }
        let key = task_key(task_id);
        store.set_field(&key, FIELD_STATUS, status.as_str()).await?;
        store
            .set_field(&key, FIELD_PROGRESS, &progress.min(PROGRESS_DONE).to_string())
            .await
    }

    /// Record the result metadata and move the task to `completed`.
    ///
    /// `image_info` and progress are written before the status flips, so a
    /// reader that sees `completed` also sees the result. A task that
    /// already finished keeps its recorded result or error.
    pub async fn complete(
        store: &StatusStore,
        task_id: &str,
        image_info: &ImageInfo,
    ) -> Result<(), StoreError> {
        if Self::is_finished(store, task_id).await? {
            tracing::debug!(task_id, "Ignoring completion for finished task");
            return Ok(());
        }
        let key = task_key(task_id);
        let encoded = serde_json::to_string(image_info).map_err(|e| StoreError::Corrupt {
            key: key.clone(),
            field: FIELD_IMAGE_INFO.to_string(),
            reason: e.to_string(),
        })?;

        store.set_field(&key, FIELD_IMAGE_INFO, &encoded).await?;
        store
            .set_field(&key, FIELD_PROGRESS, &PROGRESS_DONE.to_string())
            .await?;
        store
            .set_field(&key, FIELD_STATUS, UploadStatus::Completed.as_str())
            .await
    }

    /// Record the error and move the task to `failed`. Progress stays at
    /// its last checkpoint.
    pub async fn fail(store: &StatusStore, task_id: &str, error: &str) -> Result<(), StoreError> {
        if Self::is_finished(store, task_id).await? {
            tracing::debug!(task_id, "Ignoring failure for finished task");
            return Ok(());
        }
        let key = task_key(task_id);
        store.set_field(&key, FIELD_ERROR, error).await?;
        store
            .set_field(&key, FIELD_STATUS, UploadStatus::Failed.as_str())
            .await
    }

    async fn is_finished(store: &StatusStore, task_id: &str) -> Result<bool, StoreError> {
        // An unparseable status is not treated as terminal so the worker
        // can still overwrite it.
        Ok(Self::status(store, task_id)
            .await
            .ok()
            .flatten()
            .is_some_and(UploadStatus::is_terminal))
    }

    /// Current status of a task, or `None` if it has no status yet.
    pub async fn status(
        store: &StatusStore,
        task_id: &str,
    ) -> Result<Option<UploadStatus>, StoreError> {
        let key = task_key(task_id);
        store
            .get_field(&key, FIELD_STATUS)
            .await?
            .map(|raw| {
                raw.parse().map_err(|_| StoreError::Corrupt {
                    key: key.clone(),
                    field: FIELD_STATUS.to_string(),
                    reason: format!("unknown status '{raw}'"),
                })
            })
            .transpose()
    }

    /// Assemble a snapshot for a status poll.
    ///
    /// Fails with [`StoreError::NotFound`] if the task id was never
    /// enqueued. `image_info` is only read for completed tasks and `error`
    /// only for failed ones.
    pub async fn snapshot(store: &StatusStore, task_id: &str) -> Result<UploadSnapshot, StoreError> {
        let key = task_key(task_id);
        if !store.exists(&key).await? {
            return Err(StoreError::NotFound {
                task_id: task_id.to_string(),
            });
        }

        let status = Self::status(store, task_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                task_id: task_id.to_string(),
            })?;

        let progress = match store.get_field(&key, FIELD_PROGRESS).await? {
            Some(raw) => raw.parse::<u8>().map_err(|e| StoreError::Corrupt {
                key: key.clone(),
                field: FIELD_PROGRESS.to_string(),
                reason: e.to_string(),
            })?,
            None => PROGRESS_STARTED,
        };

        let image_info = match status {
            UploadStatus::Completed => match store.get_field(&key, FIELD_IMAGE_INFO).await? {
                Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
                    key: key.clone(),
                    field: FIELD_IMAGE_INFO.to_string(),
                    reason: e.to_string(),
                })?),
                None => None,
            },
            _ => None,
        };

        let error = match status {
            UploadStatus::Failed => store.get_field(&key, FIELD_ERROR).await?,
            _ => None,
        };

        Ok(UploadSnapshot {
            task_id: task_id.to_string(),
            status,
            progress: progress.min(PROGRESS_DONE),
            image_info,
            error,
        })
    }
}
