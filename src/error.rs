//! Error types used by the listener middleware, its tasks and effects.
//!
//! - [`TaskAbortError`]: the value seen by code awaiting a cancelled suspension point.
//! - [`UsageError`]: synchronous misuse of the listener API.
//! - [`ListenerError`]: what an effect or forked executor may fail with.
//! - [`RuntimeError`]: failures building the middleware itself.
//!
//! All types provide `as_label` for logs/metrics.

use std::any::Any;
use std::fmt::Display;

use thiserror::Error;

use crate::tasks::AbortReason;

/// # Cancellation observed at a suspension point.
///
/// Returned by `condition`, `take`, `delay`, `pause` and forked task results once the
/// owning task's [`AbortSignal`](crate::AbortSignal) has been aborted. It is a plain
/// value: dropping it is always silent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("task cancelled (reason: {reason})")]
pub struct TaskAbortError {
    reason: AbortReason,
}

impl TaskAbortError {
    /// Creates an abort error carrying `reason`.
    pub fn new(reason: AbortReason) -> Self {
        Self { reason }
    }

    /// Returns the reason the task was aborted with.
    pub fn reason(&self) -> &AbortReason {
        &self.reason
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        "task_aborted"
    }
}

/// # Synchronous misuse of the listener API.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageError {
    /// `get_original_state` was called after the effect reached its first suspension
    /// point (or after the task finished).
    #[error("get_original_state can only be called before the effect first suspends")]
    OriginalStateUnavailable,
}

impl UsageError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            UsageError::OriginalStateUnavailable => "usage_original_state_unavailable",
        }
    }
}

/// # Errors produced by listener effects and forked executors.
///
/// `From<TaskAbortError>` and `From<UsageError>` let effects propagate both with `?`.
/// An effect that ends in [`ListenerError::Aborted`] is recorded as cancelled and is
/// never reported to the error sink.
///
/// # Example
/// ```
/// use listenvisor::ListenerError;
///
/// let err = ListenerError::fail("connection refused");
/// assert_eq!(err.as_label(), "effect_failed");
/// assert!(!err.is_aborted());
/// ```
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerError {
    /// The task was cancelled while suspended.
    #[error(transparent)]
    Aborted(#[from] TaskAbortError),

    /// The listener API was misused.
    #[error("usage error: {0}")]
    Usage(#[from] UsageError),

    /// The effect failed.
    #[error("effect failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The effect, predicate or executor panicked.
    #[error("panicked: {message}")]
    Panicked {
        /// The panic payload, when it was a string.
        message: String,
    },
}

impl ListenerError {
    /// Builds a [`ListenerError::Fail`] from anything displayable.
    pub fn fail(error: impl Display) -> Self {
        ListenerError::Fail {
            error: error.to_string(),
        }
    }

    /// Converts a caught panic payload into [`ListenerError::Panicked`].
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        ListenerError::Panicked { message }
    }

    /// True for [`ListenerError::Aborted`].
    pub fn is_aborted(&self) -> bool {
        matches!(self, ListenerError::Aborted(_))
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ListenerError::Aborted(_) => "task_aborted",
            ListenerError::Usage(u) => u.as_label(),
            ListenerError::Fail { .. } => "effect_failed",
            ListenerError::Panicked { .. } => "panicked",
        }
    }
}

/// # Errors produced while building the middleware.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeError {
    /// No runtime handle was given and the builder was not called inside a tokio runtime.
    #[error("no tokio runtime available; build inside a runtime or pass a handle")]
    NoRuntime,
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::NoRuntime => "runtime_unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_error_converts_with_question_mark() {
        fn suspended() -> Result<(), TaskAbortError> {
            Err(TaskAbortError::new(AbortReason::TaskCancelled))
        }
        fn effect() -> Result<(), ListenerError> {
            suspended()?;
            Ok(())
        }

        let err = effect().unwrap_err();
        assert!(err.is_aborted());
        assert_eq!(err.to_string(), "task cancelled (reason: task-cancelled)");
    }

    #[test]
    fn panic_payloads_keep_their_message() {
        let err = ListenerError::from_panic(Box::new("boom"));
        assert_eq!(
            err,
            ListenerError::Panicked {
                message: "boom".into()
            }
        );

        let err = ListenerError::from_panic(Box::new(String::from("owned boom")));
        assert_eq!(err.to_string(), "panicked: owned boom");

        let err = ListenerError::from_panic(Box::new(42_u8));
        assert_eq!(err.as_label(), "panicked");
    }
}
