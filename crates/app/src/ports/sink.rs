//! Sink port — the write side of one subscriber.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use soilgate_domain::error::SinkError;
use soilgate_domain::event::OutboundEvent;

/// The sink sessions hand to the hub: the sending half of a bounded queue
/// the session drains into its transport.
pub type QueueSink = mpsc::Sender<OutboundEvent>;

/// Something the hub can push events into without blocking.
///
/// Implementations must return immediately: a full or closed sink is
/// reported as an error and the hub drops that subscriber.
pub trait EventSink: Clone + Send + Sync + 'static {
    /// Hand `event` over for delivery.
    ///
    /// # Errors
    ///
    /// [`SinkError::Full`] when the subscriber is not keeping up,
    /// [`SinkError::Closed`] when its transport is gone.
    fn try_deliver(&self, event: &OutboundEvent) -> Result<(), SinkError>;
}

impl EventSink for mpsc::Sender<OutboundEvent> {
    fn try_deliver(&self, event: &OutboundEvent) -> Result<(), SinkError> {
        self.try_send(event.clone()).map_err(|err| match err {
            TrySendError::Full(_) => SinkError::Full,
            TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}
