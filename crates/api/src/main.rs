use std::net::SocketAddr;
use std::sync::Arc;

use annotator_store::{StoreConfig, StoreHandle};
use annotator_worker::WorkerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use annotator_api::background::BackgroundServices;
use annotator_api::config::ServerConfig;
use annotator_api::router::build_app_router;
use annotator_api::state::AppState;
use annotator_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "annotator_api=debug,annotator_worker=info,annotator_store=info,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    std::fs::create_dir_all(&config.projects_folder).expect("Failed to create projects folder");

    // --- Status store ---
    let store = Arc::new(StoreHandle::connect(StoreConfig::from_env()).await);
    tracing::info!(store_mode = %store.mode().await, "Status store ready");

    // --- App state ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let state = AppState::new(config.clone(), store, ws_manager);

    // --- Background services (health check, relay, gateway, local workers) ---
    let background = BackgroundServices::start(&state, WorkerConfig::from_env());

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    background.shutdown().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
