//! # Forked child tasks.
//!
//! A listener effect can [`fork`](crate::ListenerApi::fork) child tasks. Each child
//! gets its own [`AbortSignal`] derived from the parent's, so its lifetime is bounded
//! by the parent:
//!
//! ```text
//! parent completes  ──► parent signal aborted (listener-completed) ──► children aborted
//! parent cancelled  ──► parent signal aborted (listener-cancelled) ──► children aborted
//! child.cancel()    ──► child signal aborted  (task-cancelled)      (parent unaffected)
//! child finishes    ──► child signal aborted  (task-completed)      (grandchildren only)
//! ```
//!
//! The executor receives a [`ForkApi`] whose `delay`/`pause` race the child's signal.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};

use crate::error::TaskAbortError;
use crate::tasks::scope::TaskScope;
use crate::tasks::{AbortReason, AbortSignal, TaskResult, TaskStatus, signal};

/// Options for [`ListenerApi::fork_with`](crate::ListenerApi::fork_with).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForkOptions {
    /// The parent listener task waits for this fork to settle before it completes.
    pub auto_join: bool,
}

impl ForkOptions {
    /// Options with `auto_join` enabled.
    pub fn auto_join() -> Self {
        Self { auto_join: true }
    }
}

/// Capabilities handed to a fork executor.
#[derive(Clone, Debug)]
pub struct ForkApi {
    signal: AbortSignal,
}

impl ForkApi {
    pub(crate) fn new(signal: AbortSignal) -> Self {
        Self { signal }
    }

    /// The child task's signal.
    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    /// Sleeps for `duration` unless the child is cancelled first.
    pub async fn delay(&self, duration: Duration) -> Result<(), TaskAbortError> {
        signal::delay(&self.signal, duration).await
    }

    /// Awaits `fut` unless the child is cancelled first.
    pub async fn pause<F: Future>(&self, fut: F) -> Result<F::Output, TaskAbortError> {
        signal::pause(&self.signal, fut).await
    }

    /// Fails if the child was cancelled.
    pub fn ensure_active(&self) -> Result<(), TaskAbortError> {
        self.signal.ensure_active()
    }
}

/// Handle to a forked task.
///
/// Dropping the handle does **not** cancel the task; its lifetime stays bounded by the
/// parent listener task.
pub struct ForkedTask<T> {
    id: u64,
    signal: AbortSignal,
    parent: Arc<TaskScope>,
    status: watch::Receiver<TaskStatus>,
    result: oneshot::Receiver<TaskResult<T>>,
}

impl<T> ForkedTask<T> {
    pub(crate) fn new(
        id: u64,
        signal: AbortSignal,
        parent: Arc<TaskScope>,
        status: watch::Receiver<TaskStatus>,
        result: oneshot::Receiver<TaskResult<T>>,
    ) -> Self {
        Self {
            id,
            signal,
            parent,
            status,
            result,
        }
    }

    /// Task id, unique within one middleware instance.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The child's signal.
    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    /// Current status of the child.
    pub fn status(&self) -> TaskStatus {
        *self.status.borrow()
    }

    /// Cancels the child with [`AbortReason::TaskCancelled`]. Idempotent.
    pub fn cancel(&self) {
        self.signal.abort(AbortReason::TaskCancelled);
    }

    /// Waits for the child to settle.
    ///
    /// This is a suspension point of the parent: if the parent task is aborted first the
    /// result is `Cancelled` with the parent's reason.
    pub async fn result(self) -> TaskResult<T> {
        self.parent.mark_suspended();
        let parent = self.parent.signal();
        if let Err(err) = parent.ensure_active() {
            return TaskResult::Cancelled(err);
        }
        tokio::select! {
            biased;
            err = parent.aborted() => TaskResult::Cancelled(err),
            settled = self.result => settled.unwrap_or_else(|_closed| {
                TaskResult::Cancelled(TaskAbortError::new(AbortReason::TaskCancelled))
            }),
        }
    }
}

impl<T> fmt::Debug for ForkedTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForkedTask")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("signal", &self.signal)
            .finish()
    }
}
