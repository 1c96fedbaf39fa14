//! Redis-backed status store shared by web and worker processes.

use std::future::Future;
use std::time::Duration;

use annotator_core::retry::{retry, RetryPolicy};
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisResult};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::resolver::{Endpoint, Resolver};
use crate::store::MessageStream;

/// A live connection to the networked store at a resolved endpoint.
///
/// Commands share one multiplexed connection; each subscription opens
/// its own dedicated pub/sub connection.
#[derive(Debug)]
pub struct NetworkedStore {
    client: redis::Client,
    conn: MultiplexedConnection,
    endpoint: Endpoint,
    op_timeout: Duration,
}

impl NetworkedStore {
    /// Resolve the configured host and connect, retrying under `policy`.
    ///
    /// Resolution itself walks the fallback list before giving up, so an
    /// error here means no candidate endpoint accepted a store session.
    pub async fn establish(config: &StoreConfig, policy: &RetryPolicy) -> Result<Self, StoreError> {
        let resolver = Resolver::from_config(config);
        retry(policy, "store connect", |_| {
            let resolver = &resolver;
            async move {
                // The resolver retries internally; one pass per connect attempt.
                let endpoint = resolver.resolve(&RetryPolicy::fixed(1, Duration::ZERO)).await?;
                Self::connect(config, endpoint).await
            }
        })
        .await
    }

    /// Open a session against an already-resolved endpoint and verify it.
    pub async fn connect(config: &StoreConfig, endpoint: Endpoint) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url_for(&endpoint.host, endpoint.port))?;
        let conn =
            tokio::time::timeout(config.op_timeout, client.get_multiplexed_async_connection())
                .await??;

        let store = Self {
            client,
            conn,
            endpoint,
            op_timeout: config.op_timeout,
        };
        store.ping().await?;

        tracing::info!(endpoint = %store.endpoint, "Connected to networked status store");
        Ok(store)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn timed<T>(&self, fut: impl Future<Output = RedisResult<T>>) -> Result<T, StoreError> {
        Ok(tokio::time::timeout(self.op_timeout, fut).await??)
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("PING");
        let _pong: String = self.timed(cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    pub async fn set_field(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.timed::<()>(conn.hset(key, field, value)).await
    }

    pub async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        self.timed::<Option<String>>(conn.hget(key, field)).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        self.timed::<bool>(conn.exists(key)).await
    }

    pub async fn publish(&self, channel: &str, message: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        let receivers = self.timed::<i64>(conn.publish(channel, message)).await?;
        Ok(receivers.max(0) as usize)
    }

    /// Subscribe on a dedicated connection. The stream ends when that
    /// connection drops.
    pub async fn subscribe(&self, channel: &str) -> Result<MessageStream, StoreError> {
        let mut pubsub = self.timed(self.client.get_async_pubsub()).await?;
        self.timed(pubsub.subscribe(channel)).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping non-text pub/sub payload");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }

    pub async fn push(&self, list: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.timed::<i64>(conn.lpush(list, value)).await?;
        Ok(())
    }

    pub async fn pop(&self, list: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        self.timed::<Option<String>>(conn.rpop(list, None)).await
    }
}
