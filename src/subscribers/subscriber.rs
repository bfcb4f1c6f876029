//! # The subscriber extension point.
//!
//! Implement [`Subscribe`] to observe listener registration, task lifecycles and
//! reported failures, then pass the subscriber to
//! [`ListenerMiddlewareBuilder::with_subscribers`](crate::ListenerMiddlewareBuilder::with_subscribers).
//! Subscribers run on their own worker and can never delay `dispatch`.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use async_trait::async_trait;
//! use listenvisor::{Event, EventKind, Subscribe};
//!
//! #[derive(Default)]
//! struct FailureCounter(AtomicU64);
//!
//! #[async_trait]
//! impl Subscribe for FailureCounter {
//!     async fn on_event(&self, _ev: &Event) {
//!         self.0.fetch_add(1, Ordering::Relaxed);
//!     }
//!
//!     fn name(&self) -> &'static str { "failures" }
//!
//!     fn accepts(&self, kind: EventKind) -> bool {
//!         matches!(kind, EventKind::EffectFailed | EventKind::PredicateFailed)
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

/// Observer of middleware events.
///
/// `on_event` should not block the executor; a panic inside it is caught and logged
/// and the subscriber keeps receiving later events.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event, in publication order for this subscriber.
    async fn on_event(&self, event: &Event);

    /// Name used in drop and panic warnings. Defaults to the type name.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Whether events of `kind` should be queued for this subscriber at all.
    fn accepts(&self, kind: EventKind) -> bool {
        let _ = kind;
        true
    }

    /// Queue length before events are dropped for this subscriber (at least 1).
    fn queue_capacity(&self) -> usize {
        1024
    }
}
