//! # Runtime events emitted by the listener middleware.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Registry events**: listeners added, removed, cleared
//! - **Task events**: listener tasks and forks starting and settling
//! - **Error events**: effect/predicate failures routed through the error sink
//!
//! The [`Event`] struct carries additional metadata such as timestamps, listener and
//! task ids, and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use listenvisor::{Event, EventKind, RaisedBy};
//!
//! let ev = Event::new(EventKind::EffectFailed)
//!     .with_listener(3)
//!     .with_task(7)
//!     .with_reason("boom")
//!     .with_raised_by(RaisedBy::Effect);
//!
//! assert_eq!(ev.kind, EventKind::EffectFailed);
//! assert_eq!(ev.listener, Some(3));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::core::RaisedBy;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Registry events ===
    /// A listener entry was registered (or re-subscribed).
    ///
    /// Sets:
    /// - `listener`: listener id
    /// - `reason`: selector kind
    ListenerAdded,

    /// A listener entry left the registry.
    ///
    /// Sets:
    /// - `listener`: listener id
    ListenerRemoved,

    /// All listener entries were cleared and their tasks cancelled.
    ListenersCleared,

    // === Task events ===
    /// A listener task started for a matched action.
    ///
    /// Sets:
    /// - `listener`: listener id
    /// - `task`: task id
    /// - `reason`: action type
    TaskStarted,

    /// A listener task finished successfully.
    ///
    /// Sets:
    /// - `listener`, `task`
    TaskCompleted,

    /// A listener task was cancelled.
    ///
    /// Sets:
    /// - `listener`, `task`
    /// - `reason`: abort reason code
    TaskCancelled,

    /// A listener task finished with an error.
    ///
    /// Sets:
    /// - `listener`, `task`
    /// - `reason`: error message
    TaskFailed,

    /// A forked task was created.
    ///
    /// Sets:
    /// - `listener`: owning listener id
    /// - `task`: fork id
    ForkStarted,

    /// A forked task settled.
    ///
    /// Sets:
    /// - `listener`: owning listener id
    /// - `task`: fork id
    /// - `reason`: terminal status
    ForkCompleted,

    // === Error sink events ===
    /// An effect or fork executor failed (also emitted when an `on_error` hook is set).
    ///
    /// Sets:
    /// - `listener`, `task` (when known)
    /// - `reason`: error message
    /// - `raised_by`: `Effect`
    EffectFailed,

    /// A predicate panicked while matching an action.
    ///
    /// Sets:
    /// - `listener` (absent for `take`/`condition` waiters)
    /// - `reason`: panic message
    /// - `raised_by`: `Predicate`
    PredicateFailed,
}

impl EventKind {
    /// Stable kebab-case label, as printed by log subscribers.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ListenerAdded => "listener-added",
            EventKind::ListenerRemoved => "listener-removed",
            EventKind::ListenersCleared => "listeners-cleared",
            EventKind::TaskStarted => "task-started",
            EventKind::TaskCompleted => "task-completed",
            EventKind::TaskCancelled => "task-cancelled",
            EventKind::TaskFailed => "task-failed",
            EventKind::ForkStarted => "fork-started",
            EventKind::ForkCompleted => "fork-completed",
            EventKind::EffectFailed => "effect-failed",
            EventKind::PredicateFailed => "predicate-failed",
        }
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Listener id, if applicable.
    pub listener: Option<u64>,
    /// Task (or fork) id, if applicable.
    pub task: Option<u64>,
    /// Human-readable reason (errors, abort codes, action types).
    pub reason: Option<Arc<str>>,
    /// Which stage raised a reported error.
    pub raised_by: Option<RaisedBy>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            listener: None,
            task: None,
            reason: None,
            raised_by: None,
        }
    }

    /// Attaches a listener id.
    #[inline]
    pub fn with_listener(mut self, id: u64) -> Self {
        self.listener = Some(id);
        self
    }

    /// Attaches a task id.
    #[inline]
    pub fn with_task(mut self, id: u64) -> Self {
        self.task = Some(id);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the stage that raised an error.
    #[inline]
    pub fn with_raised_by(mut self, raised_by: RaisedBy) -> Self {
        self.raised_by = Some(raised_by);
        self
    }

    /// True for the two error-sink kinds.
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self.kind, EventKind::EffectFailed | EventKind::PredicateFailed)
    }
}
