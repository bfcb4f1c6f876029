//! # ListenerMiddleware: the dispatch point that fans actions out to listeners.
//!
//! The [`ListenerMiddleware`] wraps a host [`Store`], owns the listener registry, the
//! `take`/`condition` waiters, the event bus and the error sink. Instances are fully
//! independent of each other.
//!
//! ## Dispatch
//! ```text
//! dispatch(a)
//!   ├─► before = store.get_state()
//!   ├─► out    = store.dispatch(a)                 (always, unchanged)
//!   ├─► after  = store.get_state()
//!   ├─► entries = registry.snapshot(); waiters = waiters.snapshot()
//!   ├─► for entry in entries (registration order):
//!   │     predicate(a, after, before)?  ── panic ──► ErrorSink (raised_by = predicate)
//!   │     still registered?             ── no    ──► skip
//!   │     start task: ListenerApi ─► Launcher::launch(effect_start, run_listener)
//!   ├─► waiters.resolve(a, after, before)
//!   └─► return out
//! ```
//!
//! ## Rules
//! - `dispatch` never fails because of a listener; user failures go to the error sink.
//! - Listeners registered or waiters created while an action is being fanned out do not
//!   see that action.
//! - `unsubscribe` only removes registry membership; `clear_listeners` also cancels.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::broadcast;

use crate::config::Config;
use crate::core::api::ListenerApi;
use crate::core::builder::ListenerMiddlewareBuilder;
use crate::core::registry::{ListenerEntry, Registry};
use crate::core::runner::{self, Launcher};
use crate::core::sink::{ErrorContext, ErrorSink, RaisedBy};
use crate::core::waiters::Waiters;
use crate::events::{Bus, Event, EventKind};
use crate::listeners::{ListenerAction, ListenerActionOutcome, ListenerOptions, UnsubscribeOptions};
use crate::store::{Action, Store};
use crate::subscribers::SubscriberSet;
use crate::tasks::AbortSignal;
use crate::tasks::scope::TaskScope;

/// Action-driven listener middleware around a host store.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicI64, Ordering};
/// use listenvisor::{Action, EffectFn, ListenerApi, ListenerMiddleware, ListenerOptions, Store};
///
/// #[derive(Clone, Debug)]
/// enum Act { Inc }
/// impl Action for Act {
///     fn action_type(&self) -> &str { "inc" }
/// }
///
/// #[derive(Default)]
/// struct Counter(AtomicI64);
/// impl Store for Counter {
///     type State = i64;
///     type Action = Act;
///     type Output = i64;
///     fn get_state(&self) -> i64 { self.0.load(Ordering::SeqCst) }
///     fn dispatch(&self, _: Act) -> i64 { self.0.fetch_add(1, Ordering::SeqCst) + 1 }
/// }
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mw = ListenerMiddleware::builder(Counter::default()).build()?;
///
///     let seen = Arc::new(AtomicI64::new(0));
///     let s = seen.clone();
///     let _unsubscribe = mw.start_listening(ListenerOptions::action_type(
///         "inc",
///         EffectFn::arc(move |_action: Act, api: ListenerApi<Counter>| {
///             let s = s.clone();
///             async move {
///                 s.store(api.get_state(), Ordering::SeqCst);
///                 Ok(())
///             }
///         }),
///     ));
///
///     assert_eq!(mw.dispatch(Act::Inc), 1);
///     assert_eq!(seen.load(Ordering::SeqCst), 1);
///     Ok(())
/// }
/// ```
pub struct ListenerMiddleware<St: Store, X = ()> {
    cfg: Config,
    store: St,
    extra: X,
    registry: Registry<St, X>,
    waiters: Arc<Waiters<St::State, St::Action>>,
    sink: Arc<ErrorSink>,
    launcher: Launcher,
    bus: Bus,
    subscribers: Option<Arc<SubscriberSet>>,
    next_task_id: AtomicU64,
    active_tasks: AtomicUsize,
}

impl<St: Store> ListenerMiddleware<St, ()> {
    /// Starts building a middleware around `store`.
    pub fn builder(store: St) -> ListenerMiddlewareBuilder<St, ()> {
        ListenerMiddlewareBuilder::new(store)
    }
}

impl<St, X> ListenerMiddleware<St, X>
where
    St: Store,
    X: Send + Sync + 'static,
{
    pub(crate) fn new_internal(
        cfg: Config,
        store: St,
        extra: X,
        sink: ErrorSink,
        launcher: Launcher,
        bus: Bus,
        subscribers: Option<Arc<SubscriberSet>>,
    ) -> Self {
        Self {
            cfg,
            store,
            extra,
            registry: Registry::new(),
            waiters: Arc::new(Waiters::new()),
            sink: Arc::new(sink),
            launcher,
            bus,
            subscribers,
            next_task_id: AtomicU64::new(1),
            active_tasks: AtomicUsize::new(0),
        }
    }

    // ---- registry ----

    /// Registers a listener and returns its unsubscribe handle.
    ///
    /// Registering an identical `(selector, effect)` pair again does not add a second
    /// entry; the returned handle controls the existing one.
    pub fn start_listening(self: &Arc<Self>, options: ListenerOptions<St, X>) -> Unsubscribe<St, X> {
        let kind = options.selector().kind();
        let (entry, inserted) = self.registry.add(options);
        if inserted {
            self.bus.publish(
                Event::new(EventKind::ListenerAdded)
                    .with_listener(entry.id())
                    .with_reason(kind),
            );
        }
        Unsubscribe {
            mw: Arc::downgrade(self),
            entry,
        }
    }

    /// Removes the listener registered for `options`. Returns whether one was found.
    pub fn stop_listening(&self, options: &ListenerOptions<St, X>, opts: UnsubscribeOptions) -> bool {
        match self.registry.find(options.selector(), options.effect()) {
            Some(entry) => self.remove_entry(&entry, opts),
            None => false,
        }
    }

    /// Removes every listener and cancels all of their running tasks.
    pub fn clear_listeners(&self) {
        let drained = self.registry.drain();
        for entry in &drained {
            entry.cancel_active(None);
        }
        self.bus.publish(Event::new(EventKind::ListenersCleared));
    }

    pub(crate) fn remove_entry(&self, entry: &Arc<ListenerEntry<St, X>>, opts: UnsubscribeOptions) -> bool {
        let removed = self.registry.remove(entry);
        if opts.cancel_active {
            entry.cancel_active(None);
        }
        if removed {
            self.bus
                .publish(Event::new(EventKind::ListenerRemoved).with_listener(entry.id()));
        }
        removed
    }

    pub(crate) fn resubscribe(&self, entry: &Arc<ListenerEntry<St, X>>) {
        if self.registry.reinsert(entry) {
            self.bus.publish(
                Event::new(EventKind::ListenerAdded)
                    .with_listener(entry.id())
                    .with_reason(entry.selector().kind()),
            );
        }
    }

    // ---- dispatch ----

    /// Forwards `action` to the store, then starts every matching listener.
    ///
    /// Returns exactly what the store returned.
    pub fn dispatch(self: &Arc<Self>, action: St::Action) -> St::Output {
        let before = self.store.get_state();
        let output = self.store.dispatch(action.clone());
        let after = self.store.get_state();

        let entries = self.registry.snapshot();
        let waiters = self.waiters.snapshot();
        let original = Arc::new(before);

        for entry in entries {
            let matched = match entry.matches(&action, &after, &original) {
                Ok(matched) => matched,
                Err(err) => {
                    self.sink.report(
                        &err,
                        ErrorContext {
                            raised_by: RaisedBy::Predicate,
                            listener: Some(entry.id()),
                            task: None,
                        },
                    );
                    continue;
                }
            };
            // An earlier effect may have unsubscribed this entry during this dispatch.
            if matched && entry.is_registered() {
                self.start_task(&entry, action.clone(), Arc::clone(&original));
            }
        }

        self.waiters
            .resolve(&waiters, &action, &after, &original, &self.sink);
        output
    }

    fn start_task(
        self: &Arc<Self>,
        entry: &Arc<ListenerEntry<St, X>>,
        action: St::Action,
        original: Arc<St::State>,
    ) {
        let id = self.next_task_id();
        let scope = Arc::new(TaskScope::new(id, AbortSignal::new()));
        entry.track(id, scope.signal().clone());
        self.active_tasks.fetch_add(1, Ordering::AcqRel);
        self.bus.publish(
            Event::new(EventKind::TaskStarted)
                .with_listener(entry.id())
                .with_task(id)
                .with_reason(action.action_type()),
        );

        let api = ListenerApi::new(Arc::clone(self), Arc::clone(entry), scope, original);
        self.launcher
            .launch(self.cfg.effect_start, runner::run_listener(api, action));
    }

    /// Handles a listener control action. It never reaches the host store.
    pub fn dispatch_listener_action(
        self: &Arc<Self>,
        action: ListenerAction<St, X>,
    ) -> ListenerActionOutcome<St, X> {
        match action {
            ListenerAction::Add(options) => {
                ListenerActionOutcome::Subscribed(self.start_listening(options))
            }
            ListenerAction::Remove(options, opts) => {
                ListenerActionOutcome::Removed(self.stop_listening(&options, opts))
            }
            ListenerAction::ClearAll => {
                self.clear_listeners();
                ListenerActionOutcome::Cleared
            }
        }
    }

    // ---- accessors ----

    /// Current state of the host store.
    pub fn get_state(&self) -> St::State {
        self.store.get_state()
    }

    /// The wrapped host store.
    pub fn store(&self) -> &St {
        &self.store
    }

    /// Opaque value handed to every effect.
    pub fn extra(&self) -> &X {
        &self.extra
    }

    /// Configuration this middleware was built with.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Subscribes to runtime events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    /// Events dropped so far for the subscriber called `name` because its queue was full.
    ///
    /// `None` when no subscriber has that name.
    pub fn dropped_events(&self, name: &str) -> Option<u64> {
        self.subscribers.as_ref()?.dropped(name)
    }

    /// Number of listener tasks that have started and not yet settled.
    pub fn active_task_count(&self) -> usize {
        self.active_tasks.load(Ordering::Acquire)
    }

    // ---- crate internals ----

    pub(crate) fn next_task_id(&self) -> u64 {
        self.next_task_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn task_finished(&self) {
        self.active_tasks.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn bus(&self) -> &Bus {
        &self.bus
    }

    pub(crate) fn sink(&self) -> &Arc<ErrorSink> {
        &self.sink
    }

    pub(crate) fn launcher(&self) -> &Launcher {
        &self.launcher
    }

    pub(crate) fn waiters(&self) -> &Arc<Waiters<St::State, St::Action>> {
        &self.waiters
    }
}

impl<St: Store, X> fmt::Debug for ListenerMiddleware<St, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerMiddleware")
            .field("config", &self.cfg)
            .field("listeners", &self.registry.len())
            .field("active_tasks", &self.active_tasks.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

/// Handle returned by [`ListenerMiddleware::start_listening`].
///
/// Holds the middleware weakly; once the middleware is dropped, unsubscribing is a no-op.
pub struct Unsubscribe<St: Store, X = ()> {
    mw: Weak<ListenerMiddleware<St, X>>,
    entry: Arc<ListenerEntry<St, X>>,
}

impl<St, X> Unsubscribe<St, X>
where
    St: Store,
    X: Send + Sync + 'static,
{
    /// Removes the listener. Its running tasks keep running.
    pub fn unsubscribe(&self) -> bool {
        self.unsubscribe_with(UnsubscribeOptions::default())
    }

    /// Removes the listener; with `cancel_active` its running tasks are cancelled with
    /// `listener-cancelled`, even if it was already removed.
    pub fn unsubscribe_with(&self, opts: UnsubscribeOptions) -> bool {
        match self.mw.upgrade() {
            Some(mw) => mw.remove_entry(&self.entry, opts),
            None => false,
        }
    }

    /// Id of the listener entry.
    pub fn listener_id(&self) -> u64 {
        self.entry.id()
    }

    /// True while the listener is in the registry.
    pub fn is_subscribed(&self) -> bool {
        self.entry.is_registered()
    }
}

impl<St: Store, X> Clone for Unsubscribe<St, X> {
    fn clone(&self) -> Self {
        Self {
            mw: Weak::clone(&self.mw),
            entry: Arc::clone(&self.entry),
        }
    }
}

impl<St: Store, X> fmt::Debug for Unsubscribe<St, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("listener", &self.entry.id())
            .field("subscribed", &self.entry.is_registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use parking_lot::Mutex;

    use crate::error::{ListenerError, TaskAbortError, UsageError};
    use crate::listeners::{EffectFn, EffectRef, add_listener, remove_listener};
    use crate::testing::{CounterStore, TestAction};
    use crate::tasks::AbortReason;

    type Mw = Arc<ListenerMiddleware<CounterStore>>;

    fn middleware() -> Mw {
        ListenerMiddleware::builder(CounterStore::default())
            .build()
            .unwrap()
    }

    fn counting(hits: &Arc<AtomicUsize>) -> EffectRef<CounterStore> {
        let hits = Arc::clone(hits);
        EffectFn::arc(move |_a: TestAction, _api: ListenerApi<CounterStore>| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    fn never(_: &TestAction, _: &i64, _: &i64) -> bool {
        false
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn forwards_every_action_and_returns_store_output() {
        let mw = middleware();
        let hits = Arc::new(AtomicUsize::new(0));
        let _u = mw.start_listening(ListenerOptions::action_type("counter/increment", counting(&hits)));

        assert_eq!(mw.dispatch(TestAction::Increment), TestAction::Increment);
        assert_eq!(mw.dispatch(TestAction::Add(5)), TestAction::Add(5));
        assert_eq!(mw.get_state(), 6);
        assert_eq!(
            mw.store().dispatched(),
            vec![TestAction::Increment, TestAction::Add(5)]
        );
        // immediate start: the effect already ran
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_registration_runs_once() {
        let mw = middleware();
        let hits = Arc::new(AtomicUsize::new(0));
        let effect = counting(&hits);

        let first = mw.start_listening(ListenerOptions::action_type("counter/increment", effect.clone()));
        let second = mw.start_listening(ListenerOptions::action_type("counter/increment", effect));
        assert_eq!(first.listener_id(), second.listener_id());
        assert_eq!(mw.listener_count(), 1);

        mw.dispatch(TestAction::Increment);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(second.unsubscribe());
        assert!(!first.unsubscribe());
        mw.dispatch(TestAction::Increment);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn original_state_is_only_available_before_suspending() {
        let mw = middleware();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let _u = mw.start_listening(ListenerOptions::action_type(
            "counter/add",
            EffectFn::arc(move |_a: TestAction, api: ListenerApi<CounterStore>| {
                let s = s.clone();
                async move {
                    s.lock().push((api.get_original_state(), api.get_state()));
                    api.delay(Duration::from_millis(1)).await?;
                    s.lock().push((api.get_original_state(), api.get_state()));
                    Ok(())
                }
            }),
        ));

        mw.dispatch(TestAction::Add(10));
        mw.dispatch(TestAction::Add(1));
        tokio::time::sleep(Duration::from_millis(5)).await;

        let seen = seen.lock().clone();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], (Ok(0), 10));
        assert_eq!(seen[1], (Ok(10), 11));
        assert!(
            seen[2..]
                .iter()
                .all(|(orig, _)| *orig == Err(UsageError::OriginalStateUnavailable))
        );
    }

    #[tokio::test]
    async fn predicate_panic_skips_only_that_listener() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let e = errors.clone();
        let mw = ListenerMiddleware::builder(CounterStore::default())
            .with_on_error(move |err: &ListenerError, ctx: &ErrorContext| {
                e.lock().push((err.as_label(), ctx.raised_by));
            })
            .build()
            .unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let _bad = mw.start_listening(ListenerOptions::predicate(
            Arc::new(|_: &TestAction, _: &i64, _: &i64| panic!("predicate blew up")),
            counting(&hits),
        ));
        let _good = mw.start_listening(ListenerOptions::action_type("counter/increment", counting(&hits)));

        assert_eq!(mw.dispatch(TestAction::Increment), TestAction::Increment);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(*errors.lock(), vec![("panicked", RaisedBy::Predicate)]);
    }

    #[tokio::test]
    async fn failing_effects_are_reported_with_their_listener() {
        let mw = middleware();
        let mut events = mw.subscribe_events();
        let u = mw.start_listening(ListenerOptions::action_type(
            "counter/decrement",
            EffectFn::arc(|_a: TestAction, _api: ListenerApi<CounterStore>| async {
                Err(ListenerError::fail("boom"))
            }),
        ));

        mw.dispatch(TestAction::Decrement);

        let mut kinds = Vec::new();
        while let Ok(ev) = events.try_recv() {
            if ev.kind == EventKind::EffectFailed {
                assert_eq!(ev.listener, Some(u.listener_id()));
                assert_eq!(ev.raised_by, Some(RaisedBy::Effect));
            }
            kinds.push(ev.kind);
        }
        assert_eq!(
            kinds,
            vec![
                EventKind::ListenerAdded,
                EventKind::TaskStarted,
                EventKind::TaskFailed,
                EventKind::EffectFailed,
            ]
        );
        assert_eq!(mw.active_task_count(), 0);
    }

    #[tokio::test]
    async fn listener_unsubscribed_mid_dispatch_does_not_start() {
        let mw = middleware();
        let hits = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Unsubscribe<CounterStore>>>> = Arc::new(Mutex::new(None));
        let s = slot.clone();

        let _first = mw.start_listening(ListenerOptions::action_type(
            "counter/increment",
            EffectFn::arc(move |_a: TestAction, _api: ListenerApi<CounterStore>| {
                if let Some(second) = s.lock().as_ref() {
                    second.unsubscribe();
                }
                async { Ok(()) }
            }),
        ));
        let second = mw.start_listening(ListenerOptions::action_type("counter/increment", counting(&hits)));
        *slot.lock() = Some(second.clone());

        mw.dispatch(TestAction::Increment);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(!second.is_subscribed());
    }

    #[tokio::test]
    async fn control_actions_never_reach_the_store() {
        let mw = middleware();
        let hits = Arc::new(AtomicUsize::new(0));
        let opts = ListenerOptions::action_type("counter/increment", counting(&hits));

        let handle = mw
            .dispatch_listener_action(add_listener(opts.clone()))
            .into_unsubscribe()
            .unwrap();
        mw.dispatch(TestAction::Increment);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let removed = mw.dispatch_listener_action(remove_listener(opts.clone(), UnsubscribeOptions::default()));
        assert_eq!(removed.removed(), Some(true));
        let removed = mw.dispatch_listener_action(remove_listener(opts, UnsubscribeOptions::default()));
        assert_eq!(removed.removed(), Some(false));
        assert!(!handle.is_subscribed());

        assert_eq!(mw.store().dispatched(), vec![TestAction::Increment]);
    }

    #[tokio::test]
    async fn unsubscribe_keeps_tasks_but_clear_cancels_them() {
        let mw = middleware();
        let results = Arc::new(Mutex::new(Vec::new()));
        let r = results.clone();
        let effect: EffectRef<CounterStore> =
            EffectFn::arc(move |_a: TestAction, api: ListenerApi<CounterStore>| {
                let r = r.clone();
                async move {
                    let res = api.condition(never, None).await;
                    r.lock().push(res.clone());
                    res?;
                    Ok(())
                }
            });

        let kept = mw.start_listening(ListenerOptions::action_type("counter/increment", effect.clone()));
        mw.dispatch(TestAction::Increment);
        assert!(kept.unsubscribe());
        settle().await;
        assert_eq!(mw.active_task_count(), 1);
        assert!(results.lock().is_empty());

        let _again = mw.start_listening(ListenerOptions::action_type("counter/add", effect));
        mw.dispatch(TestAction::Add(1));
        assert_eq!(mw.active_task_count(), 2);

        mw.clear_listeners();
        settle().await;
        assert_eq!(mw.listener_count(), 0);
        // only the registered listener's task was cancelled
        assert_eq!(mw.active_task_count(), 1);
        assert_eq!(
            *results.lock(),
            vec![Err(TaskAbortError::new(AbortReason::ListenerCancelled))]
        );

        assert!(!kept.unsubscribe_with(UnsubscribeOptions::cancel_active()));
        settle().await;
        assert_eq!(mw.active_task_count(), 0);
        assert_eq!(results.lock().len(), 2);
    }

    #[tokio::test]
    async fn separate_middlewares_do_not_share_listeners() {
        let a = middleware();
        let b = middleware();
        let hits = Arc::new(AtomicUsize::new(0));
        let _u = a.start_listening(ListenerOptions::action_type("counter/increment", counting(&hits)));

        b.dispatch(TestAction::Increment);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(b.listener_count(), 0);
    }
}
