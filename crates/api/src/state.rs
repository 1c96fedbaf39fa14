use std::sync::Arc;

use annotator_core::project::FsProjectStorage;
use annotator_store::StoreHandle;
use annotator_worker::TaskQueue;

use crate::config::ServerConfig;
use crate::pending::PendingUploads;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Process-wide status store; swapped on reconnect or downgrade.
    pub store: Arc<StoreHandle>,
    pub queue: TaskQueue,
    pub projects: Arc<FsProjectStorage>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
    pub pending: Arc<PendingUploads>,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Arc<StoreHandle>, ws_manager: Arc<WsManager>) -> Self {
        let projects = Arc::new(FsProjectStorage::new(config.projects_folder.clone()));
        Self {
            config: Arc::new(config),
            queue: TaskQueue::new(Arc::clone(&store)),
            store,
            projects,
            ws_manager,
            pending: Arc::new(PendingUploads::new()),
        }
    }
}
