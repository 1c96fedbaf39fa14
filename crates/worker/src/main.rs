use std::sync::Arc;

use annotator_core::project::FsProjectStorage;
use annotator_store::{run_health_check, StoreConfig, StoreHandle};
use annotator_worker::{WorkerConfig, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "annotator_worker=debug,annotator_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env();
    tracing::info!(
        concurrency = config.concurrency,
        projects_folder = %config.projects_folder.display(),
        "Worker starting"
    );

    let handle = Arc::new(StoreHandle::connect(StoreConfig::from_env()).await);
    tracing::info!(store_mode = %handle.mode().await, "Status store ready");

    let cancel = CancellationToken::new();
    let health = tokio::spawn(run_health_check(Arc::clone(&handle), cancel.clone()));

    let projects = Arc::new(FsProjectStorage::new(config.projects_folder.clone()));
    let pool = tokio::spawn(WorkerPool::new(Arc::clone(&handle), projects, config).run(cancel.clone()));

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, finishing in-flight jobs");
    cancel.cancel();

    if let Err(e) = pool.await {
        tracing::error!(error = %e, "Worker pool task failed");
    }
    let _ = health.await;

    tracing::info!("Worker shut down");
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
