//! The status store: one interface over the networked and in-memory
//! variants.

use std::fmt;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::networked::NetworkedStore;

/// Text payloads received on a subscribed channel. Blocks between messages.
pub type MessageStream = BoxStream<'static, String>;

/// Which variant a [`StatusStore`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Networked,
    Memory,
}

impl StoreMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreMode::Networked => "networked",
            StoreMode::Memory => "memory",
        }
    }
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key/field store with pub/sub and a simple job list.
///
/// Every operation is a single atomic per-field step; there are no
/// multi-field transactions.
pub enum StatusStore {
    /// Shared across processes; every call may fail with
    /// [`StoreError::Unavailable`].
    Networked(NetworkedStore),
    /// Degraded mode: this process only. Never fails.
    Memory(MemoryStore),
}

impl StatusStore {
    pub fn memory() -> Self {
        StatusStore::Memory(MemoryStore::new())
    }

    pub fn mode(&self) -> StoreMode {
        match self {
            StatusStore::Networked(_) => StoreMode::Networked,
            StatusStore::Memory(_) => StoreMode::Memory,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.mode() == StoreMode::Memory
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        match self {
            StatusStore::Networked(store) => store.ping().await,
            StatusStore::Memory(_) => Ok(()),
        }
    }

    pub async fn set_field(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        match self {
            StatusStore::Networked(store) => store.set_field(key, field, value).await,
            StatusStore::Memory(store) => {
                store.set_field(key, field, value).await;
                Ok(())
            }
        }
    }

    pub async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        match self {
            StatusStore::Networked(store) => store.get_field(key, field).await,
            StatusStore::Memory(store) => Ok(store.get_field(key, field).await),
        }
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        match self {
            StatusStore::Networked(store) => store.exists(key).await,
            StatusStore::Memory(store) => Ok(store.exists(key).await),
        }
    }

    /// Publish `message` on `channel`; returns how many subscribers got it.
    ///
    /// In memory mode only subscribers inside this process can receive it.
    pub async fn publish(&self, channel: &str, message: &str) -> Result<usize, StoreError> {
        match self {
            StatusStore::Networked(store) => store.publish(channel, message).await,
            StatusStore::Memory(store) => Ok(store.publish(channel, message).await),
        }
    }

    pub async fn subscribe(&self, channel: &str) -> Result<MessageStream, StoreError> {
        match self {
            StatusStore::Networked(store) => store.subscribe(channel).await,
            StatusStore::Memory(store) => Ok(receiver_stream(store.subscribe(channel).await)),
        }
    }

    /// Append a serialized job to the queue list.
    pub async fn push_job(&self, list: &str, payload: &str) -> Result<(), StoreError> {
        match self {
            StatusStore::Networked(store) => store.push(list, payload).await,
            StatusStore::Memory(store) => {
                store.push(list, payload).await;
                Ok(())
            }
        }
    }

    /// Take the oldest job from the queue list without blocking.
    pub async fn pop_job(&self, list: &str) -> Result<Option<String>, StoreError> {
        match self {
            StatusStore::Networked(store) => store.pop(list).await,
            StatusStore::Memory(store) => Ok(store.pop(list).await),
        }
    }
}

fn receiver_stream(rx: broadcast::Receiver<String>) -> MessageStream {
    futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(message) => return Some((message, rx)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Local subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}
