use std::collections::HashMap;

use annotator_core::types::Timestamp;
use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

struct WsConnection {
    sender: WsSender,
    connected_at: Timestamp,
}

/// Tracks every live browser connection of this process.
///
/// Thread-safe via interior `RwLock`; wrapped in `Arc` and shared between
/// the WebSocket handler, the broadcast gateway and the heartbeat.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection and return the receiver its socket task
    /// drains into the sink.
    pub async fn add(&self, conn_id: String) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    pub async fn remove(&self, conn_id: &str) {
        if let Some(conn) = self.connections.write().await.remove(conn_id) {
            let lifetime = chrono::Utc::now() - conn.connected_at;
            tracing::debug!(conn_id, lifetime_secs = lifetime.num_seconds(), "Connection removed");
        }
    }

    /// Send `message` to every connection.
    ///
    /// Returns how many connections accepted it; closed channels are
    /// skipped and cleaned up when their socket task exits.
    pub async fn broadcast(&self, message: Message) -> usize {
        let conns = self.connections.read().await;
        conns
            .values()
            .filter(|conn| conn.sender.send(message.clone()).is_ok())
            .count()
    }

    /// Broadcast a JSON value as a text frame.
    pub async fn broadcast_json(&self, value: &serde_json::Value) -> usize {
        self.broadcast(Message::Text(value.to_string().into())).await
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame to every connection, then clear the map.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send a Ping frame to every connection.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
