//! Background tasks owned by the web process.
//!
//! Each submodule provides a long-running async function intended to be
//! spawned via `tokio::spawn`. All tasks accept a [`CancellationToken`]
//! for graceful shutdown; [`BackgroundServices`] starts and stops the
//! whole set.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod local_workers;
mod services;

pub use local_workers::{run_local_workers, LocalWorkers};
pub use services::BackgroundServices;
