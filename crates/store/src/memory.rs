//! In-process fallback store used in degraded mode.
//!
//! Field maps and the job list live behind a mutex inside this process.
//! `publish` cannot cross process boundaries: it feeds an in-process
//! broadcast channel that [`MemoryStore::subscribe`] reads, so only the
//! relay of the process that ran a task sees its events.

use std::collections::{HashMap, VecDeque};

use tokio::sync::{broadcast, Mutex};

/// Buffer capacity of the per-channel broadcast used for local delivery.
const CHANNEL_CAPACITY: usize = 1024;

#[derive(Default)]
struct MemoryData {
    hashes: HashMap<String, HashMap<String, String>>,
    lists: HashMap<String, VecDeque<String>>,
}

/// Single-process key/field store with local pub/sub.
pub struct MemoryStore {
    data: Mutex<MemoryData>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(MemoryData::default()),
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub async fn set_field(&self, key: &str, field: &str, value: &str) {
        self.data
            .lock()
            .await
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }

    pub async fn get_field(&self, key: &str, field: &str) -> Option<String> {
        self.data
            .lock()
            .await
            .hashes
            .get(key)
            .and_then(|fields| fields.get(field).cloned())
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.data.lock().await.hashes.contains_key(key)
    }

    /// Deliver `message` to local subscribers of `channel`.
    ///
    /// Returns the number of subscribers that received it.
    pub async fn publish(&self, channel: &str, message: &str) -> usize {
        let channels = self.channels.lock().await;
        match channels.get(channel) {
            Some(sender) => sender.send(message.to_string()).unwrap_or(0),
            None => {
                tracing::debug!(channel, "Publish with no local subscribers");
                0
            }
        }
    }

    pub async fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        let mut channels = self.channels.lock().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Append to the head of a list (LPUSH semantics).
    pub async fn push(&self, list: &str, value: &str) {
        self.data
            .lock()
            .await
            .lists
            .entry(list.to_string())
            .or_default()
            .push_front(value.to_string());
    }

    /// Take from the tail of a list (RPOP semantics), so pushes are FIFO.
    pub async fn pop(&self, list: &str) -> Option<String> {
        self.data
            .lock()
            .await
            .lists
            .get_mut(list)
            .and_then(VecDeque::pop_back)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}
