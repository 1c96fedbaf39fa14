/// Opaque task identifier assigned at enqueue time (UUID v4 text).
pub type TaskId = String;

/// Project identifiers are directory names under the projects root.
pub type ProjectId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
