//! Broadcast hub — fans each measurement out to every live subscriber.
//!
//! The subscriber set is the only shared mutable state of the gateway. It
//! lives behind one mutex that is never held across an `.await` or a
//! transport write: `publish` snapshots the set under the lock and delivers
//! outside it, through non-blocking [`EventSink::try_deliver`] calls.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use soilgate_domain::error::GatewayError;
use soilgate_domain::event::OutboundEvent;
use soilgate_domain::id::SubscriberId;
use soilgate_domain::measurement::Measurement;
use soilgate_domain::time::{Timestamp, now};

use crate::ports::{EventSink, QueueSink};

/// One registered subscriber.
struct Subscriber<S> {
    sink: S,
    connected_at: Timestamp,
}

struct HubState<S> {
    subscribers: HashMap<SubscriberId, Subscriber<S>>,
    closed: bool,
}

/// Outcome of one [`BroadcastHub::publish`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers the event was handed to.
    pub delivered: usize,
    /// Subscribers removed because their sink was full or closed.
    pub dropped: usize,
}

/// Fan-out hub over a set of [`EventSink`]s.
pub struct BroadcastHub<S = QueueSink> {
    greeting: String,
    state: Mutex<HubState<S>>,
    // Serializes whole publish calls so that two measurements reach every
    // subscriber in the order they were published.
    publishing: Mutex<()>,
}

impl<S: EventSink> BroadcastHub<S> {
    /// Create an empty hub. `greeting` is sent to each new subscriber.
    pub fn new(greeting: impl Into<String>) -> Self {
        Self {
            greeting: greeting.into(),
            state: Mutex::new(HubState {
                subscribers: HashMap::new(),
                closed: false,
            }),
            publishing: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState<S>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `sink` and send it the connection acknowledgement.
    ///
    /// The acknowledgement is queued before the subscriber becomes visible
    /// to `publish`, so it always arrives first.
    ///
    /// # Errors
    ///
    /// [`GatewayError::HubClosed`] once shutdown has closed the hub, or
    /// [`GatewayError::SubscriberTransport`] if the acknowledgement cannot be
    /// queued.
    pub fn subscribe(&self, sink: S) -> Result<SubscriberId, GatewayError> {
        let mut state = self.lock();
        if state.closed {
            return Err(GatewayError::HubClosed);
        }
        sink.try_deliver(&OutboundEvent::connection(self.greeting.as_str()))?;

        let id = SubscriberId::new();
        state.subscribers.insert(
            id,
            Subscriber {
                sink,
                connected_at: now(),
            },
        );
        tracing::info!(subscriber = %id, total = state.subscribers.len(), "subscriber connected");
        Ok(id)
    }

    /// Remove a subscriber. Unknown ids are ignored.
    ///
    /// Returns `true` if the subscriber was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut state = self.lock();
        match state.subscribers.remove(&id) {
            Some(subscriber) => {
                let connected_for = now() - subscriber.connected_at;
                tracing::info!(
                    subscriber = %id,
                    connected_secs = connected_for.num_seconds(),
                    total = state.subscribers.len(),
                    "subscriber disconnected"
                );
                true
            }
            None => false,
        }
    }

    /// Deliver `measurement` to every registered subscriber.
    ///
    /// Each sink is tried independently; a sink that is full or closed is
    /// removed and does not affect delivery to the others.
    pub fn publish(&self, measurement: &Measurement) -> PublishReport {
        let event = OutboundEvent::from(measurement);
        let _order = self.publishing.lock().unwrap_or_else(PoisonError::into_inner);

        let snapshot: Vec<(SubscriberId, S)> = self
            .lock()
            .subscribers
            .iter()
            .map(|(id, subscriber)| (*id, subscriber.sink.clone()))
            .collect();

        let mut report = PublishReport::default();
        let mut failed = Vec::new();
        for (id, sink) in snapshot {
            match sink.try_deliver(&event) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    tracing::warn!(subscriber = %id, error = %err, "dropping subscriber");
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut state = self.lock();
            for id in failed {
                if state.subscribers.remove(&id).is_some() {
                    report.dropped += 1;
                }
            }
        }
        report
    }

    /// Close the hub: refuse new subscribers and drop every sink, which
    /// ends each session's queue. Returns how many subscribers were dropped.
    pub fn close_all(&self) -> usize {
        let mut state = self.lock();
        state.closed = true;
        let count = state.subscribers.len();
        state.subscribers.clear();
        tracing::info!(count, "closed all subscribers");
        count
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    #[must_use]
    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.lock().subscribers.contains_key(&id)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
