//! Annotator web process library.
//!
//! Exposes the building blocks of the web process (config, state, error
//! handling, routes, the broadcast gateway and WebSocket infrastructure)
//! so integration tests and the binary entrypoint can both access them.

pub mod background;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod pending;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
