use std::fmt;

use annotator_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to encode job: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Fatal steps of the upload job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStep {
    CreateDirectory,
    CopyFile,
}

impl fmt::Display for UploadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStep::CreateDirectory => f.write_str("create image directory"),
            UploadStep::CopyFile => f.write_str("copy staged file"),
        }
    }
}

/// A fatal upload step together with its cause.
#[derive(Debug, thiserror::Error)]
#[error("{step} failed: {source}")]
pub struct UploadStepError {
    pub step: UploadStep,
    #[source]
    pub source: std::io::Error,
}

impl UploadStepError {
    pub fn new(step: UploadStep, source: std::io::Error) -> Self {
        Self { step, source }
    }
}
