//! Project storage collaborator.
//!
//! Project CRUD lives elsewhere; the upload pipeline only needs to know
//! whether a project exists and where its images go.

use std::path::{Path, PathBuf};

/// Name of the per-project folder that holds uploaded images.
pub const IMAGES_DIR_NAME: &str = "images";

/// Name of the folder under the projects root used for staged uploads.
pub const STAGING_DIR_NAME: &str = "temp";

/// Read-only view of project storage consumed by the upload pipeline.
pub trait ProjectStorage: Send + Sync {
    /// Whether a project with this id exists.
    fn project_exists(&self, project_id: &str) -> bool;

    /// Directory that receives the project's uploaded images. It may not
    /// exist yet; the upload job creates it.
    fn image_directory_for(&self, project_id: &str) -> PathBuf;
}

/// Projects stored as directories under a single root:
/// `<root>/<project_id>/images/<file>`.
#[derive(Debug, Clone)]
pub struct FsProjectStorage {
    root: PathBuf,
}

impl FsProjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder where the web process stages uploads before a worker moves them.
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR_NAME)
    }
}

/// Project ids are single path components; anything else could point
/// outside the projects root.
fn is_valid_project_id(project_id: &str) -> bool {
    !project_id.is_empty()
        && project_id != "."
        && project_id != ".."
        && project_id != STAGING_DIR_NAME
        && !project_id.contains(['/', '\\'])
}

impl ProjectStorage for FsProjectStorage {
    fn project_exists(&self, project_id: &str) -> bool {
        is_valid_project_id(project_id) && self.root.join(project_id).is_dir()
    }

    fn image_directory_for(&self, project_id: &str) -> PathBuf {
        self.root.join(project_id).join(IMAGES_DIR_NAME)
    }
}
