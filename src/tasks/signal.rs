//! # Cooperative cancellation carrying a reason.
//!
//! [`AbortSignal`] wraps a [`CancellationToken`] and records *why* it was aborted.
//! Child signals are built on child tokens, so aborting a parent aborts every
//! descendant; a child aborted that way reports its parent's reason.
//!
//! ```text
//! listener signal ──abort(listener-completed)──┐
//!    ├─► fork #1 signal (child token)  ◄───────┤  reason() == listener-completed
//!    └─► fork #2 signal (child token)  ◄───────┘
//! ```
//!
//! ## Rules
//! - The reason is set **at most once**; later `abort` calls are no-ops.
//! - Aborting never un-aborts: there is no resume.
//! - Waiting on an aborted signal returns immediately.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::TaskAbortError;

/// Why a signal was aborted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AbortReason {
    /// The listener was cancelled (unsubscribe/stop/clear with cancellation, or
    /// `cancel_active_listeners`).
    ListenerCancelled,
    /// The listener effect finished; its forked children are no longer needed.
    ListenerCompleted,
    /// A forked task was cancelled explicitly.
    TaskCancelled,
    /// A forked task finished.
    TaskCompleted,
    /// Caller-supplied cause.
    Custom(Arc<str>),
}

impl AbortReason {
    /// Returns the stable code for this reason.
    pub fn as_str(&self) -> &str {
        match self {
            AbortReason::ListenerCancelled => "listener-cancelled",
            AbortReason::ListenerCompleted => "listener-completed",
            AbortReason::TaskCancelled => "task-cancelled",
            AbortReason::TaskCompleted => "task-completed",
            AbortReason::Custom(cause) => cause,
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct SignalInner {
    token: CancellationToken,
    reason: OnceLock<AbortReason>,
    parent: Option<AbortSignal>,
}

/// Cancellation token with a reason.
///
/// Cheap to clone; clones observe the same state.
///
/// # Example
/// ```
/// use listenvisor::{AbortReason, AbortSignal};
///
/// let parent = AbortSignal::new();
/// let child = parent.child();
///
/// assert!(parent.abort(AbortReason::ListenerCancelled));
/// assert!(child.is_aborted());
/// assert_eq!(child.reason(), Some(AbortReason::ListenerCancelled));
///
/// // one-way: the first reason sticks
/// assert!(!child.abort(AbortReason::TaskCancelled));
/// ```
#[derive(Clone)]
pub struct AbortSignal {
    inner: Arc<SignalInner>,
}

impl AbortSignal {
    /// Creates a root signal.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                token: CancellationToken::new(),
                reason: OnceLock::new(),
                parent: None,
            }),
        }
    }

    /// Creates a child signal that aborts whenever `self` aborts.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                token: self.inner.token.child_token(),
                reason: OnceLock::new(),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Aborts the signal with `reason`.
    ///
    /// Returns `false` if the signal was already aborted (by itself or an ancestor).
    pub fn abort(&self, reason: AbortReason) -> bool {
        if self.is_aborted() {
            return false;
        }
        if self.inner.reason.set(reason).is_err() {
            return false;
        }
        self.inner.token.cancel();
        true
    }

    /// True once the signal (or an ancestor) was aborted.
    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Returns the abort reason, or `None` while the signal is active.
    pub fn reason(&self) -> Option<AbortReason> {
        if !self.is_aborted() {
            return None;
        }
        match self.inner.reason.get() {
            Some(reason) => Some(reason.clone()),
            None => self.inner.parent.as_ref().and_then(AbortSignal::reason),
        }
    }

    /// Returns the abort error, or `None` while the signal is active.
    pub fn error(&self) -> Option<TaskAbortError> {
        self.reason().map(TaskAbortError::new)
    }

    /// Fails with [`TaskAbortError`] if the signal was aborted.
    pub fn ensure_active(&self) -> Result<(), TaskAbortError> {
        match self.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Waits until the signal is aborted and returns the abort error.
    pub async fn aborted(&self) -> TaskAbortError {
        self.inner.token.cancelled().await;
        self.error()
            .unwrap_or_else(|| TaskAbortError::new(AbortReason::TaskCancelled))
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .field("reason", &self.reason())
            .finish()
    }
}

/// Awaits `fut` unless `signal` aborts first.
///
/// Checks the signal before and after waiting, so an abort that lands while `fut`
/// resolves still wins.
pub(crate) async fn pause<F>(signal: &AbortSignal, fut: F) -> Result<F::Output, TaskAbortError>
where
    F: Future,
{
    signal.ensure_active()?;
    let output = tokio::select! {
        biased;
        err = signal.aborted() => return Err(err),
        output = fut => output,
    };
    signal.ensure_active()?;
    Ok(output)
}

/// Sleeps for `duration` unless `signal` aborts first.
pub(crate) async fn delay(signal: &AbortSignal, duration: Duration) -> Result<(), TaskAbortError> {
    pause(signal, tokio::time::sleep(duration)).await
}
