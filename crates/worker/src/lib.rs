//! Upload worker: the task queue, the upload job body and the worker pool
//! that runs it.
//!
//! The web process enqueues through [`TaskQueue`]; any process running a
//! [`WorkerPool`] against the same store picks the job up.

pub mod config;
pub mod error;
pub mod pool;
pub mod queue;
pub mod upload;

pub use config::WorkerConfig;
pub use error::{QueueError, UploadStep, UploadStepError};
pub use pool::WorkerPool;
pub use queue::TaskQueue;
pub use upload::{process_upload, UploadOutcome};
