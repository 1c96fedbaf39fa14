//! Upload event bus.
//!
//! - [`EventMessage`]: the `{event, data}` envelope carried on the shared
//!   channel.
//! - [`publish_event`]: fire-and-forget publish used by workers.
//! - [`EventRelay`]: the per-process listener that moves messages from the
//!   store's pub/sub channel onto a local single-consumer queue.

pub mod error;
pub mod message;
pub mod publisher;
pub mod relay;

pub use error::EventError;
pub use message::EventMessage;
pub use publisher::publish_event;
pub use relay::{EventRelay, EventSource, DEFAULT_RESUBSCRIBE_DELAY};
