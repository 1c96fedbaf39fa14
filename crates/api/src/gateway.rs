//! Real-time broadcast gateway.
//!
//! Sole consumer of the relay's queue: each decoded [`EventMessage`] is
//! forwarded to every WebSocket client connected to this process.

use std::sync::Arc;

use annotator_core::upload_events::{EVENT_UPLOAD_COMPLETED, EVENT_UPLOAD_FAILED};
use annotator_events::EventMessage;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::pending::PendingUploads;
use crate::ws::WsManager;

/// Queue depth between the relay and the gateway.
pub const GATEWAY_QUEUE_CAPACITY: usize = 1024;

pub struct BroadcastGateway {
    ws_manager: Arc<WsManager>,
    pending: Arc<PendingUploads>,
}

impl BroadcastGateway {
    pub fn new(ws_manager: Arc<WsManager>, pending: Arc<PendingUploads>) -> Self {
        Self {
            ws_manager,
            pending,
        }
    }

    /// Deliver one event to the connected clients. Unknown events are
    /// dropped. Returns the number of clients reached.
    pub async fn on_event(&self, event: &str, data: &serde_json::Value) -> usize {
        let message = EventMessage {
            event: event.to_string(),
            data: data.clone(),
        };
        if !message.is_known() {
            tracing::debug!(event, "Ignoring unknown event");
            return 0;
        }

        if event == EVENT_UPLOAD_COMPLETED || event == EVENT_UPLOAD_FAILED {
            if let Some(task_id) = message.task_id() {
                self.pending.remove(task_id).await;
            }
        }

        let delivered = self
            .ws_manager
            .broadcast_json(&json!({ "event": event, "data": data }))
            .await;
        tracing::trace!(event, delivered, "Event broadcast");
        delivered
    }

    /// Consume the relay queue until it closes or `cancel` fires.
    pub async fn run(self, mut events: mpsc::Receiver<EventMessage>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = events.recv() => {
                    let Some(message) = next else {
                        tracing::info!("Event queue closed, gateway stopping");
                        break;
                    };
                    self.on_event(&message.event, &message.data).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;

    use super::*;
    use crate::pending::PendingUpload;

    fn gateway() -> (BroadcastGateway, Arc<WsManager>, Arc<PendingUploads>) {
        let ws = Arc::new(WsManager::new());
        let pending = Arc::new(PendingUploads::new());
        (
            BroadcastGateway::new(Arc::clone(&ws), Arc::clone(&pending)),
            ws,
            pending,
        )
    }

    #[tokio::test]
    async fn known_events_reach_every_client() {
        let (gateway, ws, _) = gateway();
        let mut a = ws.add("a".into()).await;
        let mut b = ws.add("b".into()).await;

        let delivered = gateway
            .on_event("upload_progress", &json!({"task_id": "t1", "progress": 25}))
            .await;
        assert_eq!(delivered, 2);

        for rx in [&mut a, &mut b] {
            let Some(Message::Text(text)) = rx.recv().await else {
                panic!("expected a text frame");
            };
            let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(value["event"], "upload_progress");
            assert_eq!(value["data"]["progress"], 25);
        }
    }

    #[tokio::test]
    async fn unknown_events_are_ignored() {
        let (gateway, ws, _) = gateway();
        let mut rx = ws.add("a".into()).await;

        assert_eq!(gateway.on_event("mystery", &json!({"task_id": "t1"})).await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn terminal_events_clear_pending_entries() {
        let (gateway, _, pending) = gateway();
        pending
            .insert(PendingUpload {
                task_id: "t1".into(),
                project_id: "p1".into(),
                filename: "cat.jpg".into(),
                created: chrono::Utc::now(),
            })
            .await;

        gateway
            .on_event("upload_failed", &json!({"task_id": "t1", "error": "boom"}))
            .await;

        assert!(pending.for_project("p1").await.is_empty());
    }

    #[tokio::test]
    async fn run_drains_queue_until_closed() {
        let (gateway, ws, _) = gateway();
        let mut rx = ws.add("a".into()).await;
        let (tx, queue) = mpsc::channel(4);

        tx.send(EventMessage::upload_failed("t1", "p1", "cat.jpg", "boom"))
            .await
            .unwrap();
        drop(tx);
        gateway.run(queue, CancellationToken::new()).await;

        assert!(matches!(rx.recv().await, Some(Message::Text(_))));
    }
}
