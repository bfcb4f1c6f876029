//! # One-shot action waiters behind `take` and `condition`.
//!
//! A waiter is a predicate plus a oneshot sender. It is registered on the middleware's
//! action stream independently of the listener registry and fires at most once.
//!
//! ```text
//! api.take(pred, timeout)
//!   └─► Waiters::register ──► (guard, rx)
//!          dispatch(a) ──► resolve(snapshot) ──► pred(a, after, before)?
//!                                                  └─ true → tx.send(..), slot removed
//!   rx / signal.aborted() / timeout   (first one wins)
//!   guard dropped ──► slot removed (no-op if already resolved)
//! ```
//!
//! Dropping the guard is the only cleanup path, so every exit of `take` (match, abort,
//! timeout, or the caller dropping the future) deregisters the waiter.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::core::sink::{ErrorContext, ErrorSink, RaisedBy};
use crate::error::ListenerError;
use crate::listeners::PredicateFn;

/// What a satisfied waiter receives: `(action, state_after, state_before)`.
pub(crate) type Taken<S, A> = (A, S, S);

pub(crate) struct Waiter<S, A> {
    task: u64,
    predicate: PredicateFn<S, A>,
    tx: Mutex<Option<oneshot::Sender<Taken<S, A>>>>,
}

pub(crate) struct Waiters<S, A> {
    next_id: AtomicU64,
    slots: Mutex<BTreeMap<u64, Arc<Waiter<S, A>>>>,
}

/// Deregisters its waiter on drop.
pub(crate) struct WaiterGuard<S, A> {
    id: u64,
    owner: Arc<Waiters<S, A>>,
}

impl<S, A> Drop for WaiterGuard<S, A> {
    fn drop(&mut self) {
        self.owner.slots.lock().remove(&self.id);
    }
}

impl<S, A> Waiters<S, A>
where
    S: Clone,
    A: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            slots: Mutex::new(BTreeMap::new()),
        }
    }

    /// Registers a waiter owned by `task`.
    pub(crate) fn register(
        self: &Arc<Self>,
        task: u64,
        predicate: PredicateFn<S, A>,
    ) -> (WaiterGuard<S, A>, oneshot::Receiver<Taken<S, A>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let waiter = Arc::new(Waiter {
            task,
            predicate,
            tx: Mutex::new(Some(tx)),
        });
        self.slots.lock().insert(id, waiter);
        (
            WaiterGuard {
                id,
                owner: Arc::clone(self),
            },
            rx,
        )
    }

    /// Waiters registered so far, keyed by registration id.
    pub(crate) fn snapshot(&self) -> Vec<(u64, Arc<Waiter<S, A>>)> {
        self.slots
            .lock()
            .iter()
            .map(|(id, w)| (*id, Arc::clone(w)))
            .collect()
    }

    /// Offers one dispatched action to every waiter in `snapshot`.
    ///
    /// A panicking predicate is reported and that waiter keeps waiting.
    pub(crate) fn resolve(
        &self,
        snapshot: &[(u64, Arc<Waiter<S, A>>)],
        action: &A,
        after: &S,
        before: &S,
        sink: &ErrorSink,
    ) {
        for (id, waiter) in snapshot {
            if waiter.tx.lock().is_none() {
                continue;
            }
            let hit = std::panic::catch_unwind(AssertUnwindSafe(|| {
                (waiter.predicate)(action, after, before)
            }));
            match hit {
                Ok(false) => {}
                Ok(true) => {
                    let tx = waiter.tx.lock().take();
                    self.slots.lock().remove(id);
                    if let Some(tx) = tx {
                        // The receiver is gone if the waiting task already gave up.
                        let _ = tx.send((action.clone(), after.clone(), before.clone()));
                    }
                }
                Err(panic) => sink.report(
                    &ListenerError::from_panic(panic),
                    ErrorContext {
                        raised_by: RaisedBy::Predicate,
                        listener: None,
                        task: Some(waiter.task),
                    },
                ),
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.lock().len()
    }
}
