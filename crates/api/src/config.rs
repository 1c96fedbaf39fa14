use std::path::PathBuf;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `5000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Root folder holding one directory per project, plus `temp/` for
    /// staged uploads.
    pub projects_folder: PathBuf,
    /// Worker loops run inside the web process at all times; `0` leaves
    /// jobs to separate worker processes while the store is networked.
    /// In memory mode the web process always runs its own loops.
    pub embedded_workers: usize,
    /// Wait before the event relay re-subscribes after losing its
    /// subscription.
    pub relay_resubscribe_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                 |
    /// |--------------------------|-------------------------|
    /// | `HOST`                   | `0.0.0.0`               |
    /// | `PORT`                   | `5000`                  |
    /// | `CORS_ORIGINS`           | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                    |
    /// | `PROJECTS_FOLDER`        | `projects`              |
    /// | `EMBEDDED_WORKERS`       | `0`                     |
    /// | `RELAY_RESUBSCRIBE_SECS` | `5`                     |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let projects_folder = std::env::var("PROJECTS_FOLDER")
            .unwrap_or_else(|_| "projects".into())
            .into();

        let embedded_workers: usize = std::env::var("EMBEDDED_WORKERS")
            .unwrap_or_else(|_| "0".into())
            .parse()
            .expect("EMBEDDED_WORKERS must be a valid usize");

        let relay_resubscribe_secs: u64 = std::env::var("RELAY_RESUBSCRIBE_SECS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("RELAY_RESUBSCRIBE_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            projects_folder,
            embedded_workers,
            relay_resubscribe_secs,
        }
    }
}
