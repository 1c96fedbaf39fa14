//! Uploads submitted through this web process that have not finished.
//!
//! The registry is process-local: a client asking a different web process
//! sees only that process's submissions.

use std::collections::HashMap;

use annotator_core::types::{ProjectId, TaskId, Timestamp};
use serde::Serialize;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize)]
pub struct PendingUpload {
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub filename: String,
    pub created: Timestamp,
}

#[derive(Default)]
pub struct PendingUploads {
    entries: RwLock<HashMap<TaskId, PendingUpload>>,
}

impl PendingUploads {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, upload: PendingUpload) {
        self.entries
            .write()
            .await
            .insert(upload.task_id.clone(), upload);
    }

    pub async fn remove(&self, task_id: &str) {
        self.entries.write().await.remove(task_id);
    }

    /// Entries for one project, oldest first.
    pub async fn for_project(&self, project_id: &str) -> Vec<PendingUpload> {
        let mut uploads: Vec<_> = self
            .entries
            .read()
            .await
            .values()
            .filter(|u| u.project_id == project_id)
            .cloned()
            .collect();
        uploads.sort_by_key(|u| u.created);
        uploads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(task_id: &str, project_id: &str) -> PendingUpload {
        PendingUpload {
            task_id: task_id.into(),
            project_id: project_id.into(),
            filename: "cat.jpg".into(),
            created: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn lists_only_the_requested_project() {
        let pending = PendingUploads::new();
        pending.insert(upload("a", "p1")).await;
        pending.insert(upload("b", "p2")).await;

        let listed = pending.for_project("p1").await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].task_id, "a");
    }

    #[tokio::test]
    async fn remove_drops_the_entry() {
        let pending = PendingUploads::new();
        pending.insert(upload("a", "p1")).await;
        pending.remove("a").await;

        assert!(pending.for_project("p1").await.is_empty());
    }
}
