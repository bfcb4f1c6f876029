//! # Task runners: drive one listener task or one forked task to a terminal status.
//!
//! ## Listener task
//! ```text
//! effect.run(action, api) ─► await (panics caught)
//! join auto-joined forks             (every outcome; no race against the signal)
//! signal.abort(listener-completed)   (children see it before the task settles)
//! entry.untrack(task) ─► scope.settle(status):
//!   ├─ Ok(()), signal untouched → ok        ─► TaskCompleted
//!   ├─ Err(Aborted) / aborted   → cancelled ─► TaskCancelled
//!   └─ Err(other)/panic         → rejected  ─► TaskFailed + ErrorSink (raised_by = effect)
//! ```
//!
//! ## Forked task
//! ```text
//! signal active? ─► executor(ForkApi) ─► await (panics caught) ─► signal still active?
//! signal.abort(task-completed) ─► status ─► publish ForkCompleted ─► result sent
//! ```
//!
//! ## Rules
//! - Exactly one terminal event per task.
//! - A task whose signal was aborted before it settled ends `cancelled`, whatever the
//!   effect returned.
//! - Children are aborted **before** the parent's status becomes terminal.
//! - A task never settles while one of its auto-joined forks is still running.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};

use crate::config::StartPolicy;
use crate::core::api::ListenerApi;
use crate::core::sink::{ErrorContext, ErrorSink, RaisedBy};
use crate::error::ListenerError;
use crate::events::{Bus, Event, EventKind};
use crate::store::Store;
use crate::tasks::{AbortReason, AbortSignal, ForkApi, TaskResult, TaskStatus};

/// Starts task futures according to a [`StartPolicy`].
#[derive(Clone, Debug)]
pub(crate) struct Launcher {
    handle: Handle,
}

impl Launcher {
    pub(crate) fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Starts `fut`.
    ///
    /// `Immediate` polls it once on the calling thread (inside the runtime context, so
    /// timers and channels can register) and spawns the remainder only if it is still
    /// pending. The spawned task is polled again by the runtime, which re-registers the
    /// real waker in place of the no-op one used here.
    pub(crate) fn launch<F>(&self, policy: StartPolicy, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match policy {
            StartPolicy::Deferred => {
                self.handle.spawn(fut);
            }
            StartPolicy::Immediate => {
                let mut fut = Box::pin(fut);
                let waker = futures::task::noop_waker();
                let mut cx = Context::from_waker(&waker);
                let polled = {
                    let _rt = self.handle.enter();
                    fut.as_mut().poll(&mut cx)
                };
                if let Poll::Pending = polled {
                    self.handle.spawn(fut);
                }
            }
        }
    }
}

/// Runs one listener task to completion.
pub(crate) async fn run_listener<St, X>(api: ListenerApi<St, X>, action: St::Action)
where
    St: Store,
    X: Send + Sync + 'static,
{
    let entry = Arc::clone(api.entry());
    let scope = Arc::clone(api.scope());
    let mw = Arc::clone(api.middleware());
    let listener = entry.id();
    let task = scope.id();
    let sig = scope.signal().clone();

    let started = std::panic::catch_unwind(AssertUnwindSafe(|| entry.effect().run(action, api)));
    let outcome = match started {
        Ok(fut) => AssertUnwindSafe(fut)
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ListenerError::from_panic(panic))),
        Err(panic) => Err(ListenerError::from_panic(panic)),
    };

    // Auto-joined forks are awaited whatever the effect returned. A cancelled task's
    // forks are already aborted through the signal tree and only need to settle.
    scope.join_children().await;

    let cancelled_with = sig.reason();
    sig.abort(AbortReason::ListenerCompleted);
    entry.untrack(task);

    let bus = mw.bus();
    match (outcome, cancelled_with) {
        (Err(ListenerError::Aborted(err)), _) => {
            scope.settle(TaskStatus::Cancelled);
            publish_cancelled(bus, listener, task, err.reason());
        }
        (Ok(()), Some(reason)) => {
            scope.settle(TaskStatus::Cancelled);
            publish_cancelled(bus, listener, task, &reason);
        }
        (Ok(()), None) => {
            scope.settle(TaskStatus::Ok);
            bus.publish(
                Event::new(EventKind::TaskCompleted)
                    .with_listener(listener)
                    .with_task(task),
            );
        }
        (Err(err), _) => {
            scope.settle(TaskStatus::Rejected);
            bus.publish(
                Event::new(EventKind::TaskFailed)
                    .with_listener(listener)
                    .with_task(task)
                    .with_reason(err.to_string()),
            );
            mw.sink().report(
                &err,
                ErrorContext {
                    raised_by: RaisedBy::Effect,
                    listener: Some(listener),
                    task: Some(task),
                },
            );
        }
    }
    mw.task_finished();
}

fn publish_cancelled(bus: &Bus, listener: u64, task: u64, reason: &AbortReason) {
    bus.publish(
        Event::new(EventKind::TaskCancelled)
            .with_listener(listener)
            .with_task(task)
            .with_reason(reason.as_str()),
    );
}

/// Everything a forked task reports to.
pub(crate) struct ForkContext {
    pub(crate) id: u64,
    pub(crate) listener: u64,
    pub(crate) signal: AbortSignal,
    pub(crate) sink: Arc<ErrorSink>,
    pub(crate) bus: Bus,
}

/// Runs one forked executor to completion.
pub(crate) async fn run_fork<T, F, Fut>(
    ctx: ForkContext,
    executor: F,
    status: watch::Sender<TaskStatus>,
    result: oneshot::Sender<TaskResult<T>>,
) where
    T: Send + 'static,
    F: FnOnce(ForkApi) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, ListenerError>> + Send + 'static,
{
    let sig = ctx.signal;

    let outcome = match sig.ensure_active() {
        Err(err) => Err(err.into()),
        Ok(()) => {
            let api = ForkApi::new(sig.clone());
            match std::panic::catch_unwind(AssertUnwindSafe(|| executor(api))) {
                Ok(fut) => AssertUnwindSafe(fut)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(ListenerError::from_panic(panic))),
                Err(panic) => Err(ListenerError::from_panic(panic)),
            }
        }
    };
    // A value produced after cancellation does not count.
    let outcome = outcome.and_then(|value| {
        sig.ensure_active()?;
        Ok(value)
    });

    sig.abort(AbortReason::TaskCompleted);
    let settled = TaskResult::from_outcome(outcome);

    if let TaskResult::Rejected(err) = &settled {
        ctx.sink.report(
            err,
            ErrorContext {
                raised_by: RaisedBy::Effect,
                listener: Some(ctx.listener),
                task: Some(ctx.id),
            },
        );
    }

    let terminal = settled.status();
    status.send_replace(terminal);
    ctx.bus.publish(
        Event::new(EventKind::ForkCompleted)
            .with_listener(ctx.listener)
            .with_task(ctx.id)
            .with_reason(terminal.as_str()),
    );
    // Nobody may be waiting for the result; that is fine.
    let _ = result.send(settled);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn ctx(signal: AbortSignal, bus: &Bus) -> ForkContext {
        ForkContext {
            id: 2,
            listener: 1,
            signal,
            sink: Arc::new(ErrorSink::new(None, bus.clone())),
            bus: bus.clone(),
        }
    }

    #[tokio::test]
    async fn immediate_launch_runs_synchronously_until_first_await() {
        let launcher = Launcher::new(Handle::current());
        let reached = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let (r, f) = (reached.clone(), finished.clone());
        let (tx, rx) = oneshot::channel::<()>();

        launcher.launch(StartPolicy::Immediate, async move {
            r.store(true, Ordering::SeqCst);
            let _ = rx.await;
            f.store(true, Ordering::SeqCst);
        });
        assert!(reached.load(Ordering::SeqCst));
        assert!(!finished.load(Ordering::SeqCst));

        tx.send(()).unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn deferred_launch_never_runs_inline() {
        let launcher = Launcher::new(Handle::current());
        let reached = Arc::new(AtomicBool::new(false));
        let r = reached.clone();

        launcher.launch(StartPolicy::Deferred, async move {
            r.store(true, Ordering::SeqCst);
        });
        assert!(!reached.load(Ordering::SeqCst));

        tokio::task::yield_now().await;
        assert!(reached.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn fork_result_and_status_agree() {
        let bus = Bus::new(8);
        let mut events = bus.subscribe();
        let (status_tx, status_rx) = watch::channel(TaskStatus::Running);
        let (result_tx, result_rx) = oneshot::channel();
        let signal = AbortSignal::new();

        run_fork(ctx(signal.clone(), &bus), |_api| async { Ok(42) }, status_tx, result_tx).await;

        assert_eq!(result_rx.await.unwrap(), TaskResult::Ok(42));
        assert_eq!(*status_rx.borrow(), TaskStatus::Ok);
        assert_eq!(signal.reason(), Some(AbortReason::TaskCompleted));
        let ev = events.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::ForkCompleted);
        assert_eq!(ev.reason.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn cancelled_fork_never_starts_its_executor() {
        let bus = Bus::new(8);
        let (status_tx, _status_rx) = watch::channel(TaskStatus::Running);
        let (result_tx, result_rx) = oneshot::channel::<TaskResult<()>>();
        let signal = AbortSignal::new();
        signal.abort(AbortReason::TaskCancelled);
        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();

        run_fork(
            ctx(signal, &bus),
            move |_api| async move {
                r.store(true, Ordering::SeqCst);
                Ok(())
            },
            status_tx,
            result_tx,
        )
        .await;

        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(result_rx.await.unwrap().status(), TaskStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_fork_is_rejected_and_reported() {
        let bus = Bus::new(8);
        let mut events = bus.subscribe();
        let (status_tx, _status_rx) = watch::channel(TaskStatus::Running);
        let (result_tx, result_rx) = oneshot::channel::<TaskResult<()>>();

        run_fork(
            ctx(AbortSignal::new(), &bus),
            |api: ForkApi| async move {
                api.delay(Duration::from_millis(1)).await?;
                panic!("executor blew up");
            },
            status_tx,
            result_tx,
        )
        .await;

        match result_rx.await.unwrap() {
            TaskResult::Rejected(ListenerError::Panicked { message }) => {
                assert_eq!(message, "executor blew up");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(events.recv().await.unwrap().kind, EventKind::EffectFailed);
        assert_eq!(events.recv().await.unwrap().kind, EventKind::ForkCompleted);
    }
}
