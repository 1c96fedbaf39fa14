//! Status store for upload tasks.
//!
//! - [`resolver`] turns a logical `host:port` into a verified endpoint,
//!   tolerating flaky name resolution.
//! - [`StatusStore`] is the key/field store plus pub/sub, either the
//!   networked Redis variant or the in-process fallback.
//! - [`StoreHandle`] owns the process-wide store, swaps it on reconnect
//!   or downgrade, and runs the periodic health check.
//! - [`UploadTaskRepo`] reads and writes the per-task field maps.

pub mod config;
pub mod error;
pub mod handle;
pub mod memory;
pub mod networked;
pub mod repo;
pub mod resolver;
pub mod store;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::StoreConfig;
pub use error::StoreError;
pub use handle::{run_health_check, HealthOutcome, StoreHandle};
pub use memory::MemoryStore;
pub use networked::NetworkedStore;
pub use repo::UploadTaskRepo;
pub use resolver::{Endpoint, ResolutionMethod, Resolver};
pub use store::{MessageStream, StatusStore, StoreMode};
