//! # Broadcast bus for middleware events.
//!
//! Dispatch, registry operations, task runners and the error sink all publish into one
//! [`Bus`]; readers are the subscriber forwarder and any receiver handed out by
//! [`ListenerMiddleware::subscribe_events`](crate::ListenerMiddleware::subscribe_events).
//!
//! ```text
//!   dispatch / registry ──┐
//!   listener & fork runs ──┼──► Bus ──► forwarder ──► SubscriberSet
//!   error sink ───────────┘      └───► subscribe_events() receivers
//! ```
//!
//! Publishing never waits. Events published while nobody listens are gone, and a
//! receiver that falls more than `capacity` events behind gets `Lagged` and skips ahead.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable handle to the event channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus retaining up to `capacity` unread events (at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Sends `ev` to current receivers; a bus without receivers discards it.
    pub fn publish(&self, ev: Event) {
        if self.tx.receiver_count() > 0 {
            let _ = self.tx.send(ev);
        }
    }

    /// Receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_only_see_later_events() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::ListenersCleared));
        assert_eq!(bus.receiver_count(), 0);

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::ListenerAdded).with_listener(1));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::ListenerAdded);
        assert_eq!(ev.listener, Some(1));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_receivers_lag() {
        let bus = Bus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..4 {
            bus.publish(Event::new(EventKind::TaskStarted));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
    }
}
