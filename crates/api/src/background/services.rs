use std::sync::Arc;
use std::time::Duration;

use annotator_core::project::ProjectStorage;
use annotator_events::EventRelay;
use annotator_store::run_health_check;
use annotator_worker::WorkerConfig;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::local_workers::{run_local_workers, LocalWorkers};
use crate::gateway::{BroadcastGateway, GATEWAY_QUEUE_CAPACITY};
use crate::state::AppState;
use crate::ws::{self, WsManager};

/// How long shutdown waits for each background task.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Every long-running task of the web process besides the HTTP server.
pub struct BackgroundServices {
    cancel: CancellationToken,
    ws_manager: Arc<WsManager>,
    health: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
    relay: JoinHandle<()>,
    gateway: JoinHandle<()>,
    workers: JoinHandle<()>,
}

impl BackgroundServices {
    /// Spawn the store health check, WebSocket heartbeat, event relay,
    /// broadcast gateway and the local worker pool.
    ///
    /// `worker_config` sizes the local pool; `EMBEDDED_WORKERS` overrides
    /// its concurrency and makes the pool run even when the store is
    /// healthy.
    pub fn start(state: &AppState, worker_config: WorkerConfig) -> Self {
        let cancel = CancellationToken::new();
        let config = &state.config;

        // Store health check.
        let health = tokio::spawn(run_health_check(Arc::clone(&state.store), cancel.clone()));

        // WebSocket heartbeat.
        let heartbeat = ws::start_heartbeat(Arc::clone(&state.ws_manager), cancel.clone());

        // Event relay -> broadcast gateway.
        let (event_tx, event_rx) = mpsc::channel(GATEWAY_QUEUE_CAPACITY);
        let relay = EventRelay::new(Arc::clone(&state.store), event_tx)
            .with_resubscribe_delay(Duration::from_secs(config.relay_resubscribe_secs));
        let relay = tokio::spawn(relay.run(cancel.clone()));

        let gateway = BroadcastGateway::new(Arc::clone(&state.ws_manager), Arc::clone(&state.pending));
        let gateway = tokio::spawn(gateway.run(event_rx, cancel.clone()));

        // Local workers.
        let (when, concurrency) = if config.embedded_workers > 0 {
            (LocalWorkers::Always, config.embedded_workers)
        } else {
            (LocalWorkers::WhenDegraded, worker_config.concurrency)
        };
        let worker_config = WorkerConfig {
            concurrency,
            projects_folder: config.projects_folder.clone(),
            ..worker_config
        };
        let projects: Arc<dyn ProjectStorage> = state.projects.clone();
        let workers = tokio::spawn(run_local_workers(
            Arc::clone(&state.store),
            projects,
            worker_config,
            when,
            cancel.clone(),
        ));

        tracing::info!(?when, "Background services started");

        Self {
            cancel,
            ws_manager: Arc::clone(&state.ws_manager),
            health,
            heartbeat,
            relay,
            gateway,
            workers,
        }
    }

    /// Stop everything. Running upload jobs finish first; WebSocket
    /// clients get a close frame last.
    pub async fn shutdown(self) {
        self.cancel.cancel();

        if self.workers.await.is_err() {
            tracing::error!("Local worker pool ended abnormally");
        }

        let _ = tokio::time::timeout(SHUTDOWN_GRACE, self.relay).await;
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, self.gateway).await;
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, self.health).await;
        tracing::info!("Background services stopped");

        let ws_count = self.ws_manager.connection_count().await;
        tracing::info!(ws_count, "Closing remaining WebSocket connections");
        self.ws_manager.shutdown_all().await;
        let _ = self.heartbeat.await;
    }
}
