//! Upload task data model.
//!
//! An upload task moves through `queued → processing → {completed | failed}`.
//! Its state lives in the status store as a field map under
//! [`task_key`]; this module owns the key layout, the status enum, the
//! progress checkpoints and the job payload handed to workers.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{ProjectId, TaskId, Timestamp};

/// Prefix of every per-task field map key.
pub const TASK_KEY_PREFIX: &str = "upload_task:";

/// Store list holding serialized [`UploadJob`]s waiting for a worker.
pub const JOB_QUEUE_KEY: &str = "upload_jobs";

pub const FIELD_STATUS: &str = "status";
pub const FIELD_PROGRESS: &str = "progress";
pub const FIELD_FILENAME: &str = "filename";
pub const FIELD_PROJECT_ID: &str = "project_id";
pub const FIELD_CREATED: &str = "created";
pub const FIELD_IMAGE_INFO: &str = "image_info";
pub const FIELD_ERROR: &str = "error";

/// Progress checkpoints written by the upload job, in order.
pub const PROGRESS_STARTED: u8 = 0;
pub const PROGRESS_DIRECTORY_READY: u8 = 25;
pub const PROGRESS_COPIED: u8 = 75;
pub const PROGRESS_DONE: u8 = 100;

/// Store key for a task's field map: `upload_task:<task_id>`.
pub fn task_key(task_id: &str) -> String {
    format!("{TASK_KEY_PREFIX}{task_id}")
}

/// Generate a fresh, globally unique task id.
pub fn new_task_id() -> TaskId {
    uuid::Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Queued => "queued",
            UploadStatus::Processing => "processing",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        }
    }

    /// Terminal states are absorbing: no transition leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(UploadStatus::Queued),
            "processing" => Ok(UploadStatus::Processing),
            "completed" => Ok(UploadStatus::Completed),
            "failed" => Ok(UploadStatus::Failed),
            other => Err(CoreError::Validation(format!(
                "unknown upload status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Job payload and results
// ---------------------------------------------------------------------------

/// Work item handed from the web process to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadJob {
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub filename: String,
    /// Where the web process staged the uploaded bytes.
    pub staged_path: PathBuf,
}

/// Metadata recorded once an image lands in its project folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub name: String,
    pub path: PathBuf,
    pub uploaded: Timestamp,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Point-in-time view of a task assembled from individual field reads.
///
/// Fields are written one at a time, so `status` and `progress` may come
/// from different moments; treat the pair as eventually consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSnapshot {
    pub task_id: TaskId,
    pub status: UploadStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_info: Option<ImageInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reduce a client-supplied filename to its final path component.
///
/// Rejects names that are empty or consist only of `.`/`..` after
/// stripping directories, so a staged file can never escape its folder.
pub fn sanitize_filename(raw: &str) -> Result<String, CoreError> {
    let normalized = raw.replace('\\', "/");
    let base = normalized.rsplit('/').next().unwrap_or_default().trim();

    if base.is_empty() || base == "." || base == ".." {
        return Err(CoreError::Validation("No selected file".to_string()));
    }

    Ok(base.to_string())
}

/// Destination of an uploaded file inside a project's image directory.
pub fn destination_path(images_dir: &Path, filename: &str) -> PathBuf {
    images_dir.join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_key_is_namespaced() {
        assert_eq!(task_key("abc"), "upload_task:abc");
    }

    #[test]
    fn task_ids_are_unique() {
        assert_ne!(new_task_id(), new_task_id());
    }

    #[test]
    fn status_parses_its_own_text() {
        for status in [
            UploadStatus::Queued,
            UploadStatus::Processing,
            UploadStatus::Completed,
            UploadStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<UploadStatus>().unwrap(), status);
        }
        assert!("paused".parse::<UploadStatus>().is_err());
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(!UploadStatus::Queued.is_terminal());
        assert!(!UploadStatus::Processing.is_terminal());
        assert!(UploadStatus::Completed.is_terminal());
        assert!(UploadStatus::Failed.is_terminal());
    }

    #[test]
    fn checkpoints_are_increasing() {
        assert!(PROGRESS_STARTED < PROGRESS_DIRECTORY_READY);
        assert!(PROGRESS_DIRECTORY_READY < PROGRESS_COPIED);
        assert!(PROGRESS_COPIED < PROGRESS_DONE);
    }

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_filename("cat.jpg").unwrap(), "cat.jpg");
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_filename("C:\\photos\\dog.png").unwrap(), "dog.png");
    }

    #[test]
    fn sanitize_rejects_empty_names() {
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("dir/").is_err());
        assert!(sanitize_filename("..").is_err());
    }

    #[test]
    fn image_info_omits_missing_dimensions() {
        let info = ImageInfo {
            name: "cat.jpg".into(),
            path: PathBuf::from("/p/images/cat.jpg"),
            uploaded: chrono::Utc::now(),
            size_bytes: 10,
            width: None,
            height: None,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["name"], "cat.jpg");
        assert!(json.get("width").is_none());
    }
}
