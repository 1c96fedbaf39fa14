pub mod health;
pub mod project;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                                                   WebSocket
/// /projects/{project_id}/upload                         upload (POST)
/// /projects/{project_id}/upload/status/{task_id}        status (GET)
/// /projects/{project_id}/uploads/pending                pending (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/projects/{project_id}", project::router())
}
