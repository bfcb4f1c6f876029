//! # Error sink: where effect and predicate failures go.
//!
//! Nothing raised inside user code ever reaches the caller of `dispatch`. Failures are
//! routed here instead:
//!
//! ```text
//! predicate panic ─┐
//! effect Err/panic ┼──► ErrorSink::report(err, ctx)
//! fork Err/panic  ─┘        ├─► on_error(err, ctx)   (if configured; panics caught)
//!                           └─► Bus: EffectFailed / PredicateFailed
//! ```
//!
//! Without a hook and without any bus reader the failure is written to stderr so it is
//! never lost silently.
//!
//! Cancellation ([`ListenerError::Aborted`]) is not a failure and is never reported.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::error::ListenerError;
use crate::events::{Bus, Event, EventKind};

/// Stage that raised a reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RaisedBy {
    /// A listener effect or fork executor.
    Effect,
    /// A selector predicate or a `take`/`condition` predicate.
    Predicate,
}

impl RaisedBy {
    /// Returns the lowercase stage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RaisedBy::Effect => "effect",
            RaisedBy::Predicate => "predicate",
        }
    }
}

impl fmt::Display for RaisedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context passed to the `on_error` hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorContext {
    /// Stage that raised the error.
    pub raised_by: RaisedBy,
    /// Listener the error belongs to; `None` for `take`/`condition` predicates.
    pub listener: Option<u64>,
    /// Task the error belongs to, when one was running.
    pub task: Option<u64>,
}

/// User-supplied error hook.
pub type ErrorHandler = Arc<dyn Fn(&ListenerError, &ErrorContext) + Send + Sync>;

pub(crate) struct ErrorSink {
    handler: Option<ErrorHandler>,
    bus: Bus,
}

impl ErrorSink {
    pub(crate) fn new(handler: Option<ErrorHandler>, bus: Bus) -> Self {
        Self { handler, bus }
    }

    /// Reports `err`. Never panics and never blocks.
    pub(crate) fn report(&self, err: &ListenerError, ctx: ErrorContext) {
        if err.is_aborted() {
            return;
        }

        if let Some(handler) = &self.handler {
            let notified = std::panic::catch_unwind(AssertUnwindSafe(|| handler(err, &ctx)));
            if let Err(panic) = notified {
                eprintln!(
                    "[listenvisor] on_error hook panicked: {}",
                    ListenerError::from_panic(panic)
                );
            }
        } else if self.bus.receiver_count() == 0 {
            eprintln!("[listenvisor] {}", Self::fallback_line(err, &ctx));
        }

        let kind = match ctx.raised_by {
            RaisedBy::Effect => EventKind::EffectFailed,
            RaisedBy::Predicate => EventKind::PredicateFailed,
        };
        let mut ev = Event::new(kind)
            .with_reason(err.to_string())
            .with_raised_by(ctx.raised_by);
        if let Some(listener) = ctx.listener {
            ev = ev.with_listener(listener);
        }
        if let Some(task) = ctx.task {
            ev = ev.with_task(task);
        }
        self.bus.publish(ev);
    }

    /// Line written to stderr when a failure has neither a hook nor an event reader.
    fn fallback_line(err: &ListenerError, ctx: &ErrorContext) -> String {
        let mut line = format!("{} error", ctx.raised_by);
        if let Some(listener) = ctx.listener {
            line.push_str(&format!(" listener={listener}"));
        }
        if let Some(task) = ctx.task {
            line.push_str(&format!(" task={task}"));
        }
        line.push_str(&format!(": {err}"));
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskAbortError;
    use crate::tasks::AbortReason;
    use parking_lot::Mutex;

    fn ctx(raised_by: RaisedBy) -> ErrorContext {
        ErrorContext {
            raised_by,
            listener: Some(1),
            task: None,
        }
    }

    #[test]
    fn handler_receives_error_and_event_is_published() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let sink = ErrorSink::new(
            Some(Arc::new(move |err: &ListenerError, ctx: &ErrorContext| {
                seen2.lock().push((err.clone(), ctx.raised_by));
            })),
            bus,
        );

        sink.report(&ListenerError::fail("boom"), ctx(RaisedBy::Predicate));

        assert_eq!(
            *seen.lock(),
            vec![(ListenerError::fail("boom"), RaisedBy::Predicate)]
        );
        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.kind, EventKind::PredicateFailed);
        assert_eq!(ev.listener, Some(1));
    }

    #[test]
    fn aborts_are_not_reported() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let sink = ErrorSink::new(None, bus);

        let abort = TaskAbortError::new(AbortReason::ListenerCancelled);
        sink.report(&abort.into(), ctx(RaisedBy::Effect));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn panicking_handler_is_contained() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let sink = ErrorSink::new(
            Some(Arc::new(|_: &ListenerError, _: &ErrorContext| panic!("hook"))),
            bus,
        );

        sink.report(&ListenerError::fail("x"), ctx(RaisedBy::Effect));
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::EffectFailed);
    }

    #[test]
    fn unobserved_failures_fall_back_to_stderr() {
        let sink = ErrorSink::new(None, Bus::new(8));
        let line = ErrorSink::fallback_line(
            &ListenerError::fail("boom"),
            &ErrorContext {
                raised_by: RaisedBy::Effect,
                listener: Some(3),
                task: Some(7),
            },
        );
        assert_eq!(line, "effect error listener=3 task=7: effect failed: boom");

        // No reader and no hook: reported without panicking.
        sink.report(&ListenerError::fail("boom"), ctx(RaisedBy::Predicate));

        let mut rx = sink.bus.subscribe();
        sink.report(&ListenerError::fail("late"), ctx(RaisedBy::Effect));
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::EffectFailed);
    }
}
