/// Errors raised by the status store and its connection layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The resolver tried every candidate endpoint across all retries.
    #[error("No reachable store endpoint for {host}:{port} after {attempts} attempts")]
    ConnectionUnavailable {
        host: String,
        port: u16,
        attempts: u32,
    },

    /// A store operation failed or timed out. Retryable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// No field map exists for the requested task.
    #[error("Upload task {task_id} not found")]
    NotFound { task_id: String },

    /// A stored value could not be decoded.
    #[error("Corrupt store value for {key}.{field}: {reason}")]
    Corrupt {
        key: String,
        field: String,
        reason: String,
    },
}

impl StoreError {
    /// Whether a caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::ConnectionUnavailable { .. } | StoreError::Unavailable(_)
        )
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for StoreError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        StoreError::Unavailable("operation timed out".to_string())
    }
}
