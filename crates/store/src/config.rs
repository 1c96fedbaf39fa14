use std::str::FromStr;
use std::time::Duration;

use annotator_core::retry::RetryPolicy;

/// Fallback candidates probed when the store host cannot be resolved:
/// the usual Docker bridge gateways, the VirtualBox/QEMU host alias,
/// loopback, and the Docker Desktop host name.
pub const DEFAULT_FALLBACK_HOSTS: &[&str] = &[
    "172.17.0.1",
    "172.18.0.1",
    "10.0.2.2",
    "127.0.0.1",
    "host.docker.internal",
];

/// Status store connection settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Logical store host (default: `redis`).
    pub host: String,
    /// Store port (default: `6379`).
    pub port: u16,
    /// Logical database index (default: `0`).
    pub db: i64,
    /// Timeout for a single TCP probe.
    pub probe_timeout: Duration,
    /// Timeout for a single name resolution.
    pub dns_timeout: Duration,
    /// Timeout for connect, ping and every store command.
    pub op_timeout: Duration,
    /// Retry budget at process start-up and on health-check reconnect.
    pub startup_retry: RetryPolicy,
    /// Smaller retry budget used by workers.
    pub worker_retry: RetryPolicy,
    /// Ordered fallback candidates tried after resolution keeps failing.
    pub fallback_hosts: Vec<String>,
    /// Period of the connectivity health check.
    pub health_interval: Duration,
    /// Start directly in degraded (in-memory) mode.
    pub force_memory: bool,
}

impl StoreConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default      |
    /// |------------------------------|--------------|
    /// | `REDIS_HOST`                 | `redis`      |
    /// | `REDIS_PORT`                 | `6379`       |
    /// | `REDIS_DB`                   | `0`          |
    /// | `STORE_PROBE_TIMEOUT_MS`     | `2000`       |
    /// | `STORE_DNS_TIMEOUT_MS`       | `2000`       |
    /// | `STORE_OP_TIMEOUT_MS`        | `5000`       |
    /// | `STORE_CONNECT_ATTEMPTS`     | `10`         |
    /// | `STORE_RETRY_BASE_MS`        | `5000`       |
    /// | `STORE_RETRY_MAX_MS`         | `60000`      |
    /// | `STORE_WORKER_ATTEMPTS`      | `3`          |
    /// | `STORE_FALLBACK_HOSTS`       | see [`DEFAULT_FALLBACK_HOSTS`] |
    /// | `STORE_HEALTH_INTERVAL_SECS` | `30`         |
    /// | `STORE_FORCE_MEMORY`         | `false`      |
    ///
    /// Panics on malformed values so misconfiguration fails at start-up.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let base = Duration::from_millis(env_parse("STORE_RETRY_BASE_MS", 5000));
        let max = Duration::from_millis(env_parse("STORE_RETRY_MAX_MS", 60_000));
        let startup_attempts: u32 = env_parse("STORE_CONNECT_ATTEMPTS", 10);
        let worker_attempts: u32 = env_parse("STORE_WORKER_ATTEMPTS", 3);

        let fallback_hosts = match std::env::var("STORE_FALLBACK_HOSTS") {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => defaults.fallback_hosts,
        };

        Self {
            host: std::env::var("REDIS_HOST").unwrap_or(defaults.host),
            port: env_parse("REDIS_PORT", defaults.port),
            db: env_parse("REDIS_DB", defaults.db),
            probe_timeout: Duration::from_millis(env_parse("STORE_PROBE_TIMEOUT_MS", 2000)),
            dns_timeout: Duration::from_millis(env_parse("STORE_DNS_TIMEOUT_MS", 2000)),
            op_timeout: Duration::from_millis(env_parse("STORE_OP_TIMEOUT_MS", 5000)),
            startup_retry: RetryPolicy::new(startup_attempts, base, max),
            worker_retry: RetryPolicy::new(
                worker_attempts.min(startup_attempts),
                defaults.worker_retry.base_delay,
                defaults.worker_retry.max_delay,
            ),
            fallback_hosts,
            health_interval: Duration::from_secs(env_parse("STORE_HEALTH_INTERVAL_SECS", 30)),
            force_memory: env_parse("STORE_FORCE_MEMORY", false),
        }
    }

    /// Redis connection URL for an already-resolved host.
    pub fn url_for(&self, host: &str, port: u16) -> String {
        format!("redis://{host}:{port}/{}", self.db)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "redis".to_string(),
            port: 6379,
            db: 0,
            probe_timeout: Duration::from_secs(2),
            dns_timeout: Duration::from_secs(2),
            op_timeout: Duration::from_secs(5),
            startup_retry: RetryPolicy::startup(),
            worker_retry: RetryPolicy::worker(),
            fallback_hosts: DEFAULT_FALLBACK_HOSTS.iter().map(|s| s.to_string()).collect(),
            health_interval: Duration::from_secs(30),
            force_memory: false,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{key} has an invalid value: '{raw}'")),
        Err(_) => default,
    }
}
