//! The `{event, data}` envelope published on the upload event channel.

use annotator_core::upload::{ImageInfo, UploadStatus};
use annotator_core::upload_events::{
    EVENT_UPLOAD_COMPLETED, EVENT_UPLOAD_FAILED, EVENT_UPLOAD_PROGRESS,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::EventError;

/// Event names this build knows how to forward to clients.
const KNOWN_EVENTS: &[&str] = &[
    EVENT_UPLOAD_PROGRESS,
    EVENT_UPLOAD_COMPLETED,
    EVENT_UPLOAD_FAILED,
];

/// One message on the event channel.
///
/// `data` is always a JSON object holding at least `task_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: String,
    pub data: serde_json::Value,
}

impl EventMessage {
    pub fn upload_progress(
        task_id: &str,
        project_id: &str,
        filename: &str,
        status: UploadStatus,
        progress: u8,
    ) -> Self {
        Self {
            event: EVENT_UPLOAD_PROGRESS.to_string(),
            data: json!({
                "task_id": task_id,
                "project_id": project_id,
                "filename": filename,
                "status": status,
                "progress": progress,
            }),
        }
    }

    pub fn upload_completed(
        task_id: &str,
        project_id: &str,
        filename: &str,
        image_info: &ImageInfo,
    ) -> Self {
        Self {
            event: EVENT_UPLOAD_COMPLETED.to_string(),
            data: json!({
                "task_id": task_id,
                "project_id": project_id,
                "filename": filename,
                "image_info": image_info,
            }),
        }
    }

    pub fn upload_failed(task_id: &str, project_id: &str, filename: &str, error: &str) -> Self {
        Self {
            event: EVENT_UPLOAD_FAILED.to_string(),
            data: json!({
                "task_id": task_id,
                "project_id": project_id,
                "filename": filename,
                "error": error,
            }),
        }
    }

    /// Serialize to the wire format.
    pub fn encode(&self) -> String {
        // A struct of a String and a Value always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse a wire message, requiring an object `data` with a string
    /// `task_id`. Unknown event names are accepted here; use
    /// [`is_known`](Self::is_known) to filter them.
    pub fn decode(raw: &str) -> Result<Self, EventError> {
        let message: Self =
            serde_json::from_str(raw).map_err(|e| EventError::Malformed(e.to_string()))?;
        if !message.data.is_object() {
            return Err(EventError::Malformed("data is not an object".into()));
        }
        if message.task_id().is_none() {
            return Err(EventError::MissingTaskId);
        }
        Ok(message)
    }

    pub fn task_id(&self) -> Option<&str> {
        self.data.get("task_id").and_then(serde_json::Value::as_str)
    }

    pub fn is_known(&self) -> bool {
        KNOWN_EVENTS.contains(&self.event.as_str())
    }
}
