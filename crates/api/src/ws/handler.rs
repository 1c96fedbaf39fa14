use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::state::AppState;
use crate::ws::manager::WsManager;

/// GET /api/v1/ws -- upgrade to a WebSocket that receives upload events.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.ws_manager))
}

/// Serve one event subscriber after the upgrade.
///
/// Upload clients only listen. The socket is split so the gateway's
/// frames go out on a spawned sender task while this task watches the
/// inbound side for close frames, pongs and errors:
///   1. Register with `WsManager`, which hands back the outbound queue.
///   2. Forward queued frames until the queue closes or a close frame
///      has been sent.
///   3. Drain inbound frames; anything other than close or pong is
///      ignored.
///   4. Deregister so broadcasts stop counting this client.
async fn handle_socket(socket: WebSocket, ws_manager: Arc<WsManager>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "Upload event subscriber connected");

    // Register and get the queue the gateway broadcasts into.
    let mut outbound = ws_manager.add(conn_id.clone()).await;
    let (mut sink, mut inbound) = socket.split();

    // Sender task: upload events, heartbeat pings and the shutdown close frame.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let closing = matches!(frame, Message::Close(_));
            if sink.send(frame).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "Subscriber sink closed");
                break;
            }
            // Nothing may follow a close frame.
            if closing {
                break;
            }
        }
    });

    // Inbound side: only used to notice the client leaving.
    while let Some(result) = inbound.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Heartbeat pong");
            }
            Ok(Message::Text(text)) => {
                tracing::trace!(conn_id = %conn_id, len = text.as_str().len(), "Ignoring client text frame");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "Subscriber receive error");
                break;
            }
        }
    }

    // Deregister first so no broadcast targets a dead queue.
    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "Upload event subscriber disconnected");
}
