//! Append-only registry of lifecycle event subscribers.

use tokio::sync::mpsc;
use tracing::debug;

use crate::event::SessionEvent;

/// The set of sinks lifecycle events are fanned out to.
///
/// Registration is append-only; there is no unsubscribe. Broadcast delivers
/// to every sink in registration order with blocking sends, so a sink that
/// stops consuming stalls the session loop. The registry lives inside the
/// session's shared state and is only touched with that mutex held, which
/// is what preserves the delivery-order guarantee.
#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    sinks: Vec<mpsc::Sender<SessionEvent>>,
}

impl SubscriberRegistry {
    pub(crate) fn register(&mut self, sink: mpsc::Sender<SessionEvent>) {
        self.sinks.push(sink);
    }

    /// Delivers `event` to every registered sink in order. A sink whose
    /// receiver has been dropped is skipped; dropping a receiver is the only
    /// way to stop receiving.
    pub(crate) async fn broadcast(&self, event: SessionEvent) {
        for sink in &self.sinks {
            if sink.send(event).await.is_err() {
                debug!(target = "zks.session", %event, "subscriber receiver dropped; skipping");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.sinks.len()
    }
}
