//! # The capability surface handed to a listener effect.
//!
//! One [`ListenerApi`] is built per listener task. It is cheap to clone and every clone
//! refers to the same task.
//!
//! Suspension points (`condition`, `take`, `delay`, `pause`, and awaiting a
//! [`ForkedTask`]) race the task's [`AbortSignal`] and return `Err(TaskAbortError)` once
//! it aborts. After the first one, [`ListenerApi::get_original_state`] stops working.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};

use crate::core::middleware::{ListenerMiddleware, Unsubscribe};
use crate::core::registry::ListenerEntry;
use crate::core::runner::{self, ForkContext};
use crate::error::{ListenerError, TaskAbortError, UsageError};
use crate::events::{Event, EventKind};
use crate::listeners::{ListenerAction, ListenerActionOutcome, ListenerOptions};
use crate::store::Store;
use crate::tasks::scope::TaskScope;
use crate::tasks::{
    AbortReason, AbortSignal, ForkApi, ForkOptions, ForkedTask, TaskStatus, signal,
};

/// Listener effect API.
///
/// # Example
/// ```rust,no_run
/// # use std::time::Duration;
/// # use listenvisor::{Action, EffectFn, EffectRef, ListenerApi, Store};
/// # #[derive(Clone, Debug)] enum Act { Start, Stop }
/// # impl Action for Act { fn action_type(&self) -> &str { match self { Act::Start => "start", Act::Stop => "stop" } } }
/// # struct Host;
/// # impl Store for Host { type State = u32; type Action = Act; type Output = (); fn get_state(&self) -> u32 { 0 } fn dispatch(&self, _: Act) {} }
/// let poller: EffectRef<Host> = EffectFn::arc(|_action: Act, api: ListenerApi<Host>| async move {
///     api.cancel_active_listeners();
///     loop {
///         let stopped = api
///             .condition(|a: &Act, _: &u32, _: &u32| matches!(a, Act::Stop), Some(Duration::from_secs(1)))
///             .await?;
///         if stopped {
///             return Ok(());
///         }
///         // poll something
///     }
/// });
/// # let _ = poller;
/// ```
pub struct ListenerApi<St: Store, X = ()> {
    mw: Arc<ListenerMiddleware<St, X>>,
    entry: Arc<ListenerEntry<St, X>>,
    scope: Arc<TaskScope>,
    original: Arc<St::State>,
}

impl<St: Store, X> Clone for ListenerApi<St, X> {
    fn clone(&self) -> Self {
        Self {
            mw: Arc::clone(&self.mw),
            entry: Arc::clone(&self.entry),
            scope: Arc::clone(&self.scope),
            original: Arc::clone(&self.original),
        }
    }
}

impl<St, X> ListenerApi<St, X>
where
    St: Store,
    X: Send + Sync + 'static,
{
    pub(crate) fn new(
        mw: Arc<ListenerMiddleware<St, X>>,
        entry: Arc<ListenerEntry<St, X>>,
        scope: Arc<TaskScope>,
        original: Arc<St::State>,
    ) -> Self {
        Self {
            mw,
            entry,
            scope,
            original,
        }
    }

    pub(crate) fn middleware(&self) -> &Arc<ListenerMiddleware<St, X>> {
        &self.mw
    }

    pub(crate) fn entry(&self) -> &Arc<ListenerEntry<St, X>> {
        &self.entry
    }

    pub(crate) fn scope(&self) -> &Arc<TaskScope> {
        &self.scope
    }

    // ---- state ----

    /// Live state of the host store.
    pub fn get_state(&self) -> St::State {
        self.mw.get_state()
    }

    /// State captured right before the triggering action was reduced.
    ///
    /// Only available until the effect first suspends; afterwards (and once the task has
    /// settled) it fails with [`UsageError::OriginalStateUnavailable`].
    pub fn get_original_state(&self) -> Result<St::State, UsageError> {
        if self.scope.is_suspended() || self.scope.status().is_terminal() {
            return Err(UsageError::OriginalStateUnavailable);
        }
        Ok((*self.original).clone())
    }

    /// Opaque value fixed when the middleware was built.
    pub fn extra(&self) -> &X {
        self.mw.extra()
    }

    // ---- waiting ----

    /// Waits for a future action satisfying `predicate(action, state_after, state_before)`.
    ///
    /// Returns `Ok(None)` on timeout. Only actions dispatched after this call are seen.
    pub async fn take<P>(
        &self,
        predicate: P,
        timeout: Option<Duration>,
    ) -> Result<Option<(St::Action, St::State, St::State)>, TaskAbortError>
    where
        P: Fn(&St::Action, &St::State, &St::State) -> bool + Send + Sync + 'static,
    {
        self.scope.mark_suspended();
        let sig = self.scope.signal();
        sig.ensure_active()?;

        let (guard, rx) = self.mw.waiters().register(self.scope.id(), Arc::new(predicate));
        let matched = async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, rx).await.ok().and_then(Result::ok),
                None => rx.await.ok(),
            }
        };
        let res = signal::pause(sig, matched).await;
        drop(guard);
        res
    }

    /// Like [`take`](Self::take) but only reports whether a match happened in time.
    pub async fn condition<P>(&self, predicate: P, timeout: Option<Duration>) -> Result<bool, TaskAbortError>
    where
        P: Fn(&St::Action, &St::State, &St::State) -> bool + Send + Sync + 'static,
    {
        Ok(self.take(predicate, timeout).await?.is_some())
    }

    /// Sleeps for `duration` unless the task is cancelled first.
    pub async fn delay(&self, duration: Duration) -> Result<(), TaskAbortError> {
        self.scope.mark_suspended();
        signal::delay(self.scope.signal(), duration).await
    }

    /// Awaits `fut` unless the task is cancelled first.
    pub async fn pause<F: Future>(&self, fut: F) -> Result<F::Output, TaskAbortError> {
        self.scope.mark_suspended();
        signal::pause(self.scope.signal(), fut).await
    }

    // ---- task tree ----

    /// Forks a child task; see [`fork_with`](Self::fork_with).
    pub fn fork<T, F, Fut>(&self, executor: F) -> ForkedTask<T>
    where
        T: Send + 'static,
        F: FnOnce(ForkApi) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ListenerError>> + Send + 'static,
    {
        self.fork_with(executor, ForkOptions::default())
    }

    /// Forks a child task bound to this task's lifetime.
    ///
    /// The executor starts according to [`Config::fork_start`](crate::Config::fork_start)
    /// and is aborted with `listener-completed` once this task finishes, or with this
    /// task's cancel reason if it is cancelled. With `auto_join`, this task waits for
    /// the child to settle before it settles itself, whatever the effect returned.
    pub fn fork_with<T, F, Fut>(&self, executor: F, options: ForkOptions) -> ForkedTask<T>
    where
        T: Send + 'static,
        F: FnOnce(ForkApi) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ListenerError>> + Send + 'static,
    {
        let id = self.mw.next_task_id();
        let child = self.scope.signal().child();
        let (status_tx, status_rx) = watch::channel(TaskStatus::Running);
        let (result_tx, result_rx) = oneshot::channel();

        if options.auto_join {
            self.scope.join_on(status_rx.clone());
        }
        self.mw.bus().publish(
            Event::new(EventKind::ForkStarted)
                .with_listener(self.entry.id())
                .with_task(id),
        );

        let ctx = ForkContext {
            id,
            listener: self.entry.id(),
            signal: child.clone(),
            sink: Arc::clone(self.mw.sink()),
            bus: self.mw.bus().clone(),
        };
        self.mw.launcher().launch(
            self.mw.config().fork_start,
            runner::run_fork(ctx, executor, status_tx, result_tx),
        );

        ForkedTask::new(id, child, Arc::clone(&self.scope), status_rx, result_rx)
    }

    /// Cancels the other running tasks of this listener, leaving this one alone.
    pub fn cancel_active_listeners(&self) {
        self.entry.cancel_active(Some(self.scope.id()));
    }

    /// Cancels this task with `listener-cancelled`.
    pub fn cancel(&self) {
        self.scope.signal().abort(AbortReason::ListenerCancelled);
    }

    /// Fails if this task was cancelled.
    pub fn ensure_active(&self) -> Result<(), TaskAbortError> {
        self.scope.signal().ensure_active()
    }

    /// This task's signal.
    pub fn signal(&self) -> &AbortSignal {
        self.scope.signal()
    }

    /// This task's id, unique within the middleware.
    pub fn task_id(&self) -> u64 {
        self.scope.id()
    }

    /// Id of the listener entry this task belongs to.
    pub fn listener_id(&self) -> u64 {
        self.entry.id()
    }

    // ---- registry ----

    /// Removes this listener from the registry. Running tasks (this one included) keep
    /// running.
    pub fn unsubscribe(&self) {
        self.mw.remove_entry(&self.entry, Default::default());
    }

    /// Puts this listener back into the registry (at the end). No-op if it is already
    /// registered.
    pub fn subscribe(&self) {
        self.mw.resubscribe(&self.entry);
    }

    /// Registers another listener on the same middleware.
    pub fn start_listening(&self, options: ListenerOptions<St, X>) -> Unsubscribe<St, X> {
        self.mw.start_listening(options)
    }

    // ---- dispatch ----

    /// Dispatches through the middleware, so other listeners see the action.
    pub fn dispatch(&self, action: St::Action) -> St::Output {
        self.mw.dispatch(action)
    }

    /// Dispatches a listener control action.
    pub fn dispatch_listener_action(
        &self,
        action: ListenerAction<St, X>,
    ) -> ListenerActionOutcome<St, X> {
        self.mw.dispatch_listener_action(action)
    }
}

impl<St: Store, X> fmt::Debug for ListenerApi<St, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerApi")
            .field("listener", &self.entry.id())
            .field("task", &self.scope.id())
            .field("signal", self.scope.signal())
            .finish_non_exhaustive()
    }
}
