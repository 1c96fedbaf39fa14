//! Handlers for image uploads into a project.
//!
//! The upload request only stages the bytes and enqueues a job; a worker
//! moves the file into place. Clients follow progress by polling the
//! status endpoint or listening on the WebSocket.

use std::path::{Path as FsPath, PathBuf};

use annotator_core::error::CoreError;
use annotator_core::project::ProjectStorage;
use annotator_core::types::{TaskId, Timestamp};
use annotator_core::upload::{sanitize_filename, UploadSnapshot, UploadStatus};
use annotator_store::{StoreError, UploadTaskRepo};
use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, AppResult};
use crate::pending::PendingUpload;
use crate::response::DataResponse;
use crate::state::AppState;

/// Multipart field carrying the image.
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadAccepted {
    pub task_id: TaskId,
    pub status: UploadStatus,
}

#[derive(Debug, Serialize)]
pub struct PendingUploadStatus {
    pub task_id: TaskId,
    pub project_id: String,
    pub filename: String,
    pub created: Timestamp,
    pub status: UploadStatus,
    pub progress: u8,
}

fn ensure_project_exists(state: &AppState, project_id: &str) -> AppResult<()> {
    if !state.projects.project_exists(project_id) {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Project",
            id: project_id.to_string(),
        }));
    }
    Ok(())
}

/// POST /api/v1/projects/{project_id}/upload
///
/// Streams the `file` part to the staging folder and enqueues an upload
/// job. Responds `202 Accepted` with the task id.
pub async fn upload(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    ensure_project_exists(&state, &project_id)?;

    let mut staged: Option<(String, PathBuf)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = sanitize_filename(field.file_name().unwrap_or_default())?;
        let staging_dir = state.projects.staging_dir();
        let path = staging_dir.join(format!("{}_{filename}", uuid::Uuid::new_v4()));
        stage_field(field, &staging_dir, &path).await?;
        staged = Some((filename, path));
        break;
    }

    let Some((filename, staged_path)) = staged else {
        return Err(AppError::BadRequest("No file part".to_string()));
    };

    let task_id = match state
        .queue
        .enqueue(&project_id, &filename, staged_path.clone())
        .await
    {
        Ok(task_id) => task_id,
        Err(e) => {
            let _ = tokio::fs::remove_file(&staged_path).await;
            return Err(e.into());
        }
    };

    state
        .pending
        .insert(PendingUpload {
            task_id: task_id.clone(),
            project_id,
            filename,
            created: chrono::Utc::now(),
        })
        .await;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: UploadAccepted {
                task_id,
                status: UploadStatus::Queued,
            },
        }),
    ))
}

/// Write a multipart field to `path` chunk by chunk.
async fn stage_field(mut field: Field<'_>, staging_dir: &FsPath, path: &FsPath) -> AppResult<()> {
    tokio::fs::create_dir_all(staging_dir)
        .await
        .map_err(|e| AppError::InternalError(format!("Cannot create staging folder: {e}")))?;
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| AppError::InternalError(format!("Cannot create staging file: {e}")))?;

    let result: AppResult<()> = async {
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| AppError::InternalError(format!("Cannot write staging file: {e}")))?;
        }
        file.flush()
            .await
            .map_err(|e| AppError::InternalError(format!("Cannot write staging file: {e}")))
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(path).await;
    }
    result
}

/// GET /api/v1/projects/{project_id}/upload/status/{task_id}
pub async fn status(
    State(state): State<AppState>,
    Path((_project_id, task_id)): Path<(String, String)>,
) -> AppResult<Json<DataResponse<UploadSnapshot>>> {
    let store = state.store.current().await;
    let snapshot = UploadTaskRepo::snapshot(&store, &task_id).await?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// GET /api/v1/projects/{project_id}/uploads/pending
///
/// Uploads submitted through this process that have not reached a
/// terminal status. Finished entries are pruned as they are seen.
pub async fn pending(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> AppResult<Json<DataResponse<Vec<PendingUploadStatus>>>> {
    ensure_project_exists(&state, &project_id)?;

    let store = state.store.current().await;
    let mut items = Vec::new();
    for upload in state.pending.for_project(&project_id).await {
        let snapshot = match UploadTaskRepo::snapshot(&store, &upload.task_id).await {
            Ok(snapshot) => snapshot,
            Err(StoreError::NotFound { .. }) => {
                state.pending.remove(&upload.task_id).await;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if snapshot.status.is_terminal() {
            state.pending.remove(&upload.task_id).await;
            continue;
        }

        items.push(PendingUploadStatus {
            task_id: upload.task_id,
            project_id: upload.project_id,
            filename: upload.filename,
            created: upload.created,
            status: snapshot.status,
            progress: snapshot.progress,
        });
    }

    Ok(Json(DataResponse { data: items }))
}
