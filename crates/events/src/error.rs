#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Malformed event message: {0}")]
    Malformed(String),

    #[error("Event is missing data.task_id")]
    MissingTaskId,
}
