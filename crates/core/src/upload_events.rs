//! Event names and the pub/sub channel used for upload lifecycle updates.
//!
//! Workers publish `{"event": <name>, "data": {...}}` envelopes on
//! [`EVENT_CHANNEL`]; every web process relays them to its WebSocket
//! clients.

/// The single well-known pub/sub channel carrying upload events.
pub const EVENT_CHANNEL: &str = "upload_events";

/// Progress checkpoint reached (status + percent).
pub const EVENT_UPLOAD_PROGRESS: &str = "upload_progress";

/// Upload finished; carries the image metadata.
pub const EVENT_UPLOAD_COMPLETED: &str = "upload_completed";

/// Upload failed; carries the error string.
pub const EVENT_UPLOAD_FAILED: &str = "upload_failed";
