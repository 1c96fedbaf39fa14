use annotator_core::upload_events::EVENT_CHANNEL;
use annotator_store::StatusStore;

use crate::message::EventMessage;

/// Publish `message` on the upload event channel.
///
/// Delivery is best effort: a failed publish is logged and reported as
/// zero receivers, never as an error to the caller.
pub async fn publish_event(store: &StatusStore, message: &EventMessage) -> usize {
    match store.publish(EVENT_CHANNEL, &message.encode()).await {
        Ok(receivers) => {
            tracing::debug!(
                event = %message.event,
                task_id = message.task_id().unwrap_or_default(),
                receivers,
                "Published event"
            );
            receivers
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                event = %message.event,
                task_id = message.task_id().unwrap_or_default(),
                "Failed to publish event"
            );
            0
        }
    }
}
