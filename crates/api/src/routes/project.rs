use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::upload;
use crate::state::AppState;

/// Largest accepted upload request body.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Routes mounted at `/projects/{project_id}`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/upload",
            post(upload::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/upload/status/{task_id}", get(upload::status))
        .route("/uploads/pending", get(upload::pending))
}
