//! WebSocket connections for live upload events.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::ws_handler;
pub use heartbeat::{start_heartbeat, HEARTBEAT_INTERVAL};
pub use manager::WsManager;
