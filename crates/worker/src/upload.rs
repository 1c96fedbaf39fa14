//! The upload job body.
//!
//! Moves a staged file into its project's image folder, recording each
//! checkpoint in the status store and on the event channel:
//!
//! | Step                        | Progress | Fatal |
//! |-----------------------------|----------|-------|
//! | enter `processing`          | 0        | -     |
//! | create the image directory  | 25       | yes   |
//! | chunked copy to destination | 75       | yes   |
//! | remove the staging file     | -        | no    |
//! | read image dimensions       | -        | no    |
//! | record result, `completed`  | 100      | -     |
//!
//! A fatal step moves the task straight to `failed`. Status-store and
//! publish errors are logged without aborting: the file work is what the
//! job exists for, and re-running it is safe. A job whose task already
//! finished is a no-op: nothing is written or published.

use std::path::{Path, PathBuf};

use annotator_core::project::ProjectStorage;
use annotator_core::upload::{
    destination_path, ImageInfo, UploadJob, UploadSnapshot, UploadStatus, PROGRESS_COPIED,
    PROGRESS_DIRECTORY_READY, PROGRESS_STARTED,
};
use annotator_events::{publish_event, EventMessage};
use annotator_store::{StatusStore, StoreError, UploadTaskRepo};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{UploadStep, UploadStepError};

/// Result of one run of [`process_upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Completed(ImageInfo),
    Failed { step: UploadStep, error: String },
    /// The task had already reached a terminal status; this run did
    /// nothing and the stored result stands.
    AlreadyFinished(UploadSnapshot),
}

/// Run the upload job for `job` to a terminal state.
///
/// Never returns an error: failures are recorded on the task and reported
/// through the returned outcome.
pub async fn process_upload(
    store: &StatusStore,
    projects: &dyn ProjectStorage,
    job: &UploadJob,
    chunk_size: usize,
) -> UploadOutcome {
    tracing::info!(
        task_id = %job.task_id,
        project_id = %job.project_id,
        filename = %job.filename,
        "Processing upload"
    );

    if let Some(finished) = finished_snapshot(store, &job.task_id).await {
        tracing::info!(
            task_id = %job.task_id,
            status = %finished.status,
            "Task already finished, skipping job"
        );
        return UploadOutcome::AlreadyFinished(finished);
    }

    match run_steps(store, projects, job, chunk_size).await {
        Ok(info) => {
            if let Err(e) = UploadTaskRepo::complete(store, &job.task_id, &info).await {
                tracing::error!(task_id = %job.task_id, error = %e, "Failed to record completion");
            }
            let event =
                EventMessage::upload_completed(&job.task_id, &job.project_id, &job.filename, &info);
            publish_event(store, &event).await;

            tracing::info!(
                task_id = %job.task_id,
                path = %info.path.display(),
                size_bytes = info.size_bytes,
                "Upload completed"
            );
            UploadOutcome::Completed(info)
        }
        Err(e) => {
            let error = e.to_string();
            tracing::error!(task_id = %job.task_id, step = %e.step, error = %error, "Upload failed");
            record_failure(store, job, &error).await;
            UploadOutcome::Failed {
                step: e.step,
                error,
            }
        }
    }
}

/// Mark a task failed and publish `upload_failed`.
///
/// Also used by the pool when a job panics before reaching its own
/// failure handling.
pub async fn record_failure(store: &StatusStore, job: &UploadJob, error: &str) {
    if let Err(e) = UploadTaskRepo::fail(store, &job.task_id, error).await {
        tracing::error!(task_id = %job.task_id, error = %e, "Failed to record failure");
    }
    let event = EventMessage::upload_failed(&job.task_id, &job.project_id, &job.filename, error);
    publish_event(store, &event).await;
}

/// The stored snapshot of a task that already reached a terminal status.
///
/// A job without a status entry, or one whose status cannot be read, is
/// treated as unfinished so the file still gets moved.
async fn finished_snapshot(store: &StatusStore, task_id: &str) -> Option<UploadSnapshot> {
    match UploadTaskRepo::snapshot(store, task_id).await {
        Ok(snapshot) if snapshot.status.is_terminal() => Some(snapshot),
        Ok(_) | Err(StoreError::NotFound { .. }) => None,
        Err(e) => {
            tracing::warn!(task_id, error = %e, "Could not read task status before running job");
            None
        }
    }
}

async fn run_steps(
    store: &StatusStore,
    projects: &dyn ProjectStorage,
    job: &UploadJob,
    chunk_size: usize,
) -> Result<ImageInfo, UploadStepError> {
    checkpoint(store, job, PROGRESS_STARTED).await;

    let images_dir = projects.image_directory_for(&job.project_id);
    tokio::fs::create_dir_all(&images_dir)
        .await
        .map_err(|e| UploadStepError::new(UploadStep::CreateDirectory, e))?;
    checkpoint(store, job, PROGRESS_DIRECTORY_READY).await;

    let destination = destination_path(&images_dir, &job.filename);
    let size_bytes = copy_in_chunks(&job.staged_path, &destination, chunk_size)
        .await
        .map_err(|e| UploadStepError::new(UploadStep::CopyFile, e))?;
    checkpoint(store, job, PROGRESS_COPIED).await;

    if let Err(e) = tokio::fs::remove_file(&job.staged_path).await {
        tracing::warn!(
            task_id = %job.task_id,
            path = %job.staged_path.display(),
            error = %e,
            "Failed to remove staging file"
        );
    }

    let (width, height) = match read_dimensions(destination.clone()).await {
        Some((w, h)) => (Some(w), Some(h)),
        None => (None, None),
    };

    Ok(ImageInfo {
        name: job.filename.clone(),
        path: destination,
        uploaded: chrono::Utc::now(),
        size_bytes,
        width,
        height,
    })
}

async fn checkpoint(store: &StatusStore, job: &UploadJob, progress: u8) {
    let status = UploadStatus::Processing;
    if let Err(e) = UploadTaskRepo::set_progress(store, &job.task_id, status, progress).await {
        tracing::warn!(task_id = %job.task_id, progress, error = %e, "Failed to record progress");
    }
    let event =
        EventMessage::upload_progress(&job.task_id, &job.project_id, &job.filename, status, progress);
    publish_event(store, &event).await;
}

/// Copy `src` to `dst` through a fixed-size buffer. Overwrites `dst`.
async fn copy_in_chunks(src: &Path, dst: &Path, chunk_size: usize) -> std::io::Result<u64> {
    let mut reader = tokio::fs::File::open(src).await?;
    let mut writer = tokio::fs::File::create(dst).await?;
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }

    writer.flush().await?;
    writer.sync_all().await?;
    Ok(total)
}

/// Width and height from the image header, if the format is recognized.
async fn read_dimensions(path: PathBuf) -> Option<(u32, u32)> {
    let result = tokio::task::spawn_blocking(move || image::image_dimensions(&path)).await;
    match result {
        Ok(Ok(dims)) => Some(dims),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Could not read image dimensions");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "Dimension probe task failed");
            None
        }
    }
}
