//! Process-wide store handle and connectivity health check.
//!
//! [`StoreHandle`] owns the `Arc<StatusStore>` every component reads.
//! Readers clone the `Arc` and keep using it; the handle only ever
//! replaces it wholesale, on reconnect or on the one-way downgrade to
//! the in-memory variant.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::StoreConfig;
use crate::networked::NetworkedStore;
use crate::store::{StatusStore, StoreMode};

/// Result of one [`StoreHandle::health_check`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    /// The networked store answered the ping.
    Healthy,
    /// The ping failed and a fresh connection replaced the old one.
    Reconnected,
    /// The ping failed, reconnection failed, and the process switched
    /// to the in-memory store for the rest of its lifetime.
    Downgraded,
    /// Already running in memory mode; nothing to check.
    Degraded,
    /// Another health check is still in progress.
    Skipped,
}

pub struct StoreHandle {
    config: StoreConfig,
    current: RwLock<Arc<StatusStore>>,
    /// Created once so every downgrade lands on the same in-memory data.
    fallback: Arc<StatusStore>,
    health_lock: Mutex<()>,
    /// Bumped on every swap of `current`.
    generation: AtomicU64,
}

impl StoreHandle {
    /// Establish the process-wide store.
    ///
    /// Tries the networked store with the start-up retry budget and falls
    /// back to the in-memory store instead of failing.
    pub async fn connect(config: StoreConfig) -> Self {
        if config.force_memory {
            tracing::warn!("STORE_FORCE_MEMORY set, running in degraded mode");
            return Self::in_memory(config);
        }

        match NetworkedStore::establish(&config, &config.startup_retry).await {
            Ok(store) => Self::with_store(config, Arc::new(StatusStore::Networked(store))),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    host = %config.host,
                    port = config.port,
                    "Networked store unreachable, running in degraded mode \
                     (events reach this process's clients only)",
                );
                Self::in_memory(config)
            }
        }
    }

    /// A handle that starts (and stays) in memory mode.
    pub fn in_memory(config: StoreConfig) -> Self {
        let fallback = Arc::new(StatusStore::memory());
        Self {
            config,
            current: RwLock::new(Arc::clone(&fallback)),
            fallback,
            health_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    fn with_store(config: StoreConfig, store: Arc<StatusStore>) -> Self {
        Self {
            config,
            current: RwLock::new(store),
            fallback: Arc::new(StatusStore::memory()),
            health_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The store in use right now. Safe to hold across a swap.
    pub async fn current(&self) -> Arc<StatusStore> {
        Arc::clone(&*self.current.read().await)
    }

    pub async fn mode(&self) -> StoreMode {
        self.current.read().await.mode()
    }

    /// Number of times the store has been replaced. Long-lived consumers
    /// such as the event relay compare it to notice a swap.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    async fn replace(&self, store: Arc<StatusStore>) {
        let mut current = self.current.write().await;
        *current = store;
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Switch to the in-memory store. There is no way back within this
    /// process.
    pub async fn downgrade(&self) {
        let mut current = self.current.write().await;
        if current.is_degraded() {
            return;
        }
        *current = Arc::clone(&self.fallback);
        self.generation.fetch_add(1, Ordering::AcqRel);
        drop(current);
        tracing::warn!("Status store downgraded to in-memory mode; cross-process events disabled");
    }

    /// Probe connectivity and repair it if needed.
    ///
    /// At most one check runs at a time; a concurrent call returns
    /// [`HealthOutcome::Skipped`] immediately.
    pub async fn health_check(&self) -> HealthOutcome {
        let Ok(_guard) = self.health_lock.try_lock() else {
            return HealthOutcome::Skipped;
        };

        let store = self.current().await;
        if store.is_degraded() {
            return HealthOutcome::Degraded;
        }

        let error = match store.ping().await {
            Ok(()) => {
                tracing::debug!("Store health check passed");
                return HealthOutcome::Healthy;
            }
            Err(e) => e,
        };

        tracing::warn!(error = %error, "Store health check failed, reconnecting");
        match NetworkedStore::establish(&self.config, &self.config.startup_retry).await {
            Ok(fresh) => {
                tracing::info!(endpoint = %fresh.endpoint(), "Store connection re-established");
                self.replace(Arc::new(StatusStore::Networked(fresh))).await;
                HealthOutcome::Reconnected
            }
            Err(e) => {
                tracing::error!(error = %e, "Store reconnection failed");
                self.downgrade().await;
                HealthOutcome::Downgraded
            }
        }
    }

    /// Store a worker should use for one job.
    ///
    /// Reuses the process-wide store when it answers a ping, otherwise
    /// connects a fresh one with the smaller worker budget, otherwise
    /// keeps going with the last-known store rather than dropping the job.
    pub async fn worker_store(&self) -> Arc<StatusStore> {
        let current = self.current().await;
        if current.ping().await.is_ok() {
            return current;
        }

        match NetworkedStore::establish(&self.config, &self.config.worker_retry).await {
            Ok(fresh) => {
                tracing::debug!(endpoint = %fresh.endpoint(), "Worker opened its own store connection");
                Arc::new(StatusStore::Networked(fresh))
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Worker could not reach the store, continuing with last-known handle",
                );
                current
            }
        }
    }
}

/// Run [`StoreHandle::health_check`] every `config.health_interval` until
/// `cancel` fires.
pub async fn run_health_check(handle: Arc<StoreHandle>, cancel: CancellationToken) {
    let period = handle.config().health_interval.max(Duration::from_millis(10));
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::info!(interval_secs = period.as_secs(), "Store health check started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Store health check stopping");
                break;
            }
            _ = interval.tick() => {
                let outcome = handle.health_check().await;
                tracing::debug!(?outcome, "Store health check finished");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use annotator_core::retry::RetryPolicy;
    use tokio::net::TcpListener;

    use super::*;
    use crate::testing::RespServer;

    async fn unreachable_config() -> StoreConfig {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        StoreConfig {
            host: "127.0.0.1".into(),
            port,
            probe_timeout: Duration::from_millis(200),
            dns_timeout: Duration::from_millis(200),
            op_timeout: Duration::from_millis(200),
            startup_retry: RetryPolicy::fixed(2, Duration::from_millis(1)),
            worker_retry: RetryPolicy::fixed(1, Duration::from_millis(1)),
            fallback_hosts: Vec::new(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn forced_memory_mode_skips_networking() {
        let config = StoreConfig {
            force_memory: true,
            ..Default::default()
        };
        let handle = StoreHandle::connect(config).await;
        assert_eq!(handle.mode().await, StoreMode::Memory);
    }

    #[tokio::test]
    async fn unreachable_store_degrades_instead_of_failing() {
        let handle = StoreHandle::connect(unreachable_config().await).await;
        assert_eq!(handle.mode().await, StoreMode::Memory);
    }

    #[tokio::test]
    async fn degraded_handle_never_upgrades() {
        let handle = StoreHandle::in_memory(StoreConfig::default());
        assert_eq!(handle.health_check().await, HealthOutcome::Degraded);
        assert_eq!(handle.mode().await, StoreMode::Memory);
    }

    #[tokio::test]
    async fn concurrent_health_check_is_skipped() {
        let handle = StoreHandle::in_memory(StoreConfig::default());
        let _running = handle.health_lock.lock().await;

        assert_eq!(handle.health_check().await, HealthOutcome::Skipped);
    }

    #[tokio::test]
    async fn worker_reuses_healthy_process_store() {
        let handle = StoreHandle::in_memory(StoreConfig::default());
        let current = handle.current().await;
        let worker = handle.worker_store().await;

        assert!(Arc::ptr_eq(&current, &worker));
    }

    #[tokio::test]
    async fn readers_keep_their_store_across_downgrade() {
        let handle = StoreHandle::in_memory(StoreConfig::default());
        let before = handle.current().await;
        before.set_field("k", "f", "v").await.unwrap();

        handle.downgrade().await;

        let after = handle.current().await;
        assert_eq!(after.get_field("k", "f").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn generation_is_stable_without_swaps() {
        let handle = StoreHandle::in_memory(StoreConfig::default());
        let before = handle.generation();

        handle.downgrade().await;
        handle.health_check().await;

        assert_eq!(handle.generation(), before);
    }

    #[tokio::test]
    async fn healthy_networked_store_stays_in_place() {
        let server = RespServer::start().await;
        let handle = StoreHandle::connect(server.config()).await;
        assert_eq!(handle.mode().await, StoreMode::Networked);

        assert_eq!(handle.health_check().await, HealthOutcome::Healthy);
        assert_eq!(handle.generation(), 0);
    }

    #[tokio::test]
    async fn failed_ping_with_reachable_store_reconnects() {
        let server = RespServer::start().await;
        let handle = StoreHandle::connect(server.config()).await;
        let before = handle.current().await;

        server.fail_pings();

        assert_eq!(handle.health_check().await, HealthOutcome::Reconnected);
        assert_eq!(handle.mode().await, StoreMode::Networked);
        assert_eq!(handle.generation(), 1);
        assert!(!Arc::ptr_eq(&before, &handle.current().await));
        assert_eq!(handle.health_check().await, HealthOutcome::Healthy);
    }

    #[tokio::test]
    async fn lost_networked_store_downgrades_for_good() {
        let mut server = RespServer::start().await;
        let handle = StoreHandle::connect(server.config()).await;
        assert_eq!(handle.mode().await, StoreMode::Networked);

        server.shutdown().await;

        assert_eq!(handle.health_check().await, HealthOutcome::Downgraded);
        assert_eq!(handle.mode().await, StoreMode::Memory);
        assert_eq!(handle.generation(), 1);

        // A store coming back does not lift the downgrade.
        let _revived = RespServer::start().await;
        assert_eq!(handle.health_check().await, HealthOutcome::Degraded);
        assert_eq!(handle.mode().await, StoreMode::Memory);
        assert_eq!(handle.generation(), 1);
    }

    #[tokio::test]
    async fn worker_opens_fresh_connection_when_process_store_fails_ping() {
        let server = RespServer::start().await;
        let handle = StoreHandle::connect(server.config()).await;
        let current = handle.current().await;

        server.fail_pings();
        let worker = handle.worker_store().await;

        assert!(!Arc::ptr_eq(&current, &worker));
        assert_eq!(worker.mode(), StoreMode::Networked);
        worker.ping().await.unwrap();
        // The process-wide store is the health check's business.
        assert!(Arc::ptr_eq(&current, &handle.current().await));
    }

    #[tokio::test]
    async fn worker_keeps_last_known_store_when_reconnect_fails() {
        let mut server = RespServer::start().await;
        let handle = StoreHandle::connect(server.config()).await;
        let current = handle.current().await;

        server.shutdown().await;
        let worker = handle.worker_store().await;

        assert!(Arc::ptr_eq(&current, &worker));
        assert_eq!(worker.mode(), StoreMode::Networked);
    }

    #[tokio::test]
    async fn health_loop_stops_on_cancel() {
        let handle = Arc::new(StoreHandle::in_memory(StoreConfig {
            health_interval: Duration::from_millis(10),
            ..Default::default()
        }));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_health_check(Arc::clone(&handle), cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("health loop should exit")
            .unwrap();
    }
}
