use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::ws::manager::WsManager;

/// Interval between heartbeat pings.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Ping every connected client each [`HEARTBEAT_INTERVAL`] until `cancel`
/// fires.
pub fn start_heartbeat(
    ws_manager: Arc<WsManager>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let count = ws_manager.connection_count().await;
                    tracing::trace!(count, "WebSocket heartbeat ping");
                    ws_manager.ping_all().await;
                }
            }
        }
    })
}
