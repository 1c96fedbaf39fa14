//! Shared building blocks for the image annotator upload pipeline.
//!
//! Everything here is independent of the status store and the web layer:
//! the upload data model, the project storage collaborator, the retry
//! policy used by every reconnecting component, and the event names that
//! travel over the wire.

pub mod error;
pub mod project;
pub mod retry;
pub mod types;
pub mod upload;
pub mod upload_events;
