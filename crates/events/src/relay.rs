//! Per-process event relay.
//!
//! [`EventRelay`] keeps one subscription to the upload event channel open
//! for the lifetime of the process and forwards every decoded message to a
//! single-consumer queue read by the broadcast gateway. When the
//! subscription fails or ends it waits a fixed delay and subscribes again;
//! when the store handle swaps its store it moves over to the new one.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use annotator_core::upload_events::EVENT_CHANNEL;
use annotator_store::{MessageStream, StoreError, StoreHandle};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::message::EventMessage;

pub const DEFAULT_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

/// Something the relay can subscribe to.
pub trait EventSource: Send + Sync + 'static {
    /// Open a fresh subscription to the event channel.
    fn subscribe(&self) -> impl Future<Output = Result<MessageStream, StoreError>> + Send;

    /// Changes whenever the backing store is replaced.
    fn generation(&self) -> u64;
}

impl EventSource for StoreHandle {
    async fn subscribe(&self) -> Result<MessageStream, StoreError> {
        self.current().await.subscribe(EVENT_CHANNEL).await
    }

    fn generation(&self) -> u64 {
        StoreHandle::generation(self)
    }
}

/// Why one subscription stopped delivering.
enum SessionEnd {
    Cancelled,
    ReceiverClosed,
    StreamEnded,
    StoreSwapped,
}

pub struct EventRelay<S: EventSource> {
    source: Arc<S>,
    sender: mpsc::Sender<EventMessage>,
    resubscribe_delay: Duration,
}

impl<S: EventSource> EventRelay<S> {
    pub fn new(source: Arc<S>, sender: mpsc::Sender<EventMessage>) -> Self {
        Self {
            source,
            sender,
            resubscribe_delay: DEFAULT_RESUBSCRIBE_DELAY,
        }
    }

    /// Wait between a lost subscription and the next attempt. Also the
    /// period at which an open subscription checks for a store swap.
    pub fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }

    /// Relay until `cancel` fires or the consumer goes away.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(channel = EVENT_CHANNEL, "Event relay started");

        loop {
            let generation = self.source.generation();
            let end = match self.source.subscribe().await {
                Ok(stream) => {
                    tracing::info!(channel = EVENT_CHANNEL, "Event relay subscribed");
                    self.pump(stream, generation, &cancel).await
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry_in_ms = self.resubscribe_delay.as_millis() as u64,
                        "Event relay could not subscribe"
                    );
                    SessionEnd::StreamEnded
                }
            };

            match end {
                SessionEnd::Cancelled => break,
                SessionEnd::ReceiverClosed => {
                    tracing::info!("Event consumer closed, relay shutting down");
                    break;
                }
                SessionEnd::StoreSwapped => {
                    tracing::info!("Store replaced, event relay re-subscribing");
                    continue;
                }
                SessionEnd::StreamEnded => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.resubscribe_delay) => {}
            }
        }

        tracing::info!("Event relay stopped");
    }

    async fn pump(
        &self,
        mut stream: MessageStream,
        generation: u64,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let mut swap_check = tokio::time::interval(self.resubscribe_delay);
        swap_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                _ = swap_check.tick() => {
                    if self.source.generation() != generation {
                        return SessionEnd::StoreSwapped;
                    }
                }
                next = stream.next() => {
                    let Some(raw) = next else {
                        tracing::warn!("Event subscription ended");
                        return SessionEnd::StreamEnded;
                    };
                    match EventMessage::decode(&raw) {
                        Ok(message) => {
                            if self.sender.send(message).await.is_err() {
                                return SessionEnd::ReceiverClosed;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Dropping undecodable event message");
                        }
                    }
                }
            }
        }
    }
}
