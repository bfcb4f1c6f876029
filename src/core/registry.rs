//! # Listener registry: the set of active listener entries.
//!
//! Entries are kept in registration order. Each entry owns its normalized predicate, its
//! effect and the signals of the tasks it currently has running.
//!
//! ## Architecture
//! ```text
//! start_listening(opts) ──► Registry::add ──► dedup on (selector, effect)
//!                                               ├─ found    → existing entry
//!                                               └─ missing  → new entry appended
//! dispatch(a) ──► Registry::snapshot ──► [entry₁, entry₂, ...]   (registration order)
//! stop/unsubscribe ──► Registry::remove(entry) ──► entry.registered = false
//! clear ──► Registry::drain ──► every entry.cancel_active(None)
//! ```
//!
//! ## Rules
//! - At most one entry per `(selector, effect)` identity.
//! - The `registered` flag only changes under the registry lock, so a dispatch that
//!   checks it after `remove` returns never starts that entry.
//! - Re-subscribing an entry appends it at the end.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::ListenerError;
use crate::listeners::{EffectRef, ListenerOptions, PredicateFn, Selector};
use crate::store::Store;
use crate::tasks::{AbortReason, AbortSignal};

/// One registered `(selector, effect)` pair.
pub(crate) struct ListenerEntry<St: Store, X> {
    id: u64,
    selector: Selector<St::State, St::Action>,
    predicate: PredicateFn<St::State, St::Action>,
    effect: EffectRef<St, X>,
    pending: Mutex<HashMap<u64, AbortSignal>>,
    registered: AtomicBool,
}

impl<St: Store, X> ListenerEntry<St, X> {
    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn selector(&self) -> &Selector<St::State, St::Action> {
        &self.selector
    }

    pub(crate) fn effect(&self) -> &EffectRef<St, X> {
        &self.effect
    }

    /// Evaluates the normalized predicate; a panic becomes an error.
    pub(crate) fn matches(
        &self,
        action: &St::Action,
        after: &St::State,
        before: &St::State,
    ) -> Result<bool, ListenerError> {
        std::panic::catch_unwind(AssertUnwindSafe(|| (self.predicate)(action, after, before)))
            .map_err(ListenerError::from_panic)
    }

    fn is_same(&self, selector: &Selector<St::State, St::Action>, effect: &EffectRef<St, X>) -> bool {
        self.selector.same_as(selector)
            && std::ptr::addr_eq(Arc::as_ptr(&self.effect), Arc::as_ptr(effect))
    }

    /// Records a running task.
    pub(crate) fn track(&self, task: u64, signal: AbortSignal) {
        self.pending.lock().insert(task, signal);
    }

    /// Forgets a finished task.
    pub(crate) fn untrack(&self, task: u64) {
        self.pending.lock().remove(&task);
    }

    /// Number of tasks currently running for this entry.
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Aborts running tasks with `listener-cancelled`, skipping `except`.
    ///
    /// Signals are collected first so no lock is held while abort wakes waiters.
    pub(crate) fn cancel_active(&self, except: Option<u64>) {
        let signals: Vec<AbortSignal> = self
            .pending
            .lock()
            .iter()
            .filter(|(id, _)| Some(**id) != except)
            .map(|(_, signal)| signal.clone())
            .collect();
        for signal in signals {
            signal.abort(AbortReason::ListenerCancelled);
        }
    }

    #[inline]
    pub(crate) fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }
}

/// Ordered set of listener entries.
pub(crate) struct Registry<St: Store, X> {
    entries: Mutex<Vec<Arc<ListenerEntry<St, X>>>>,
    next_id: AtomicU64,
}

impl<St: Store, X> Registry<St, X> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers `options`, returning the entry and whether it was newly inserted.
    pub(crate) fn add(&self, options: ListenerOptions<St, X>) -> (Arc<ListenerEntry<St, X>>, bool) {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries
            .iter()
            .find(|e| e.is_same(&options.selector, &options.effect))
        {
            return (Arc::clone(existing), false);
        }

        let entry = Arc::new(ListenerEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            predicate: options.selector.to_predicate(),
            selector: options.selector,
            effect: options.effect,
            pending: Mutex::new(HashMap::new()),
            registered: AtomicBool::new(true),
        });
        entries.push(Arc::clone(&entry));
        (entry, true)
    }

    /// Puts a previously removed entry back at the end. Returns `false` if it (or an
    /// identical registration) is already present.
    pub(crate) fn reinsert(&self, entry: &Arc<ListenerEntry<St, X>>) -> bool {
        let mut entries = self.entries.lock();
        if entries
            .iter()
            .any(|e| Arc::ptr_eq(e, entry) || e.is_same(&entry.selector, &entry.effect))
        {
            return false;
        }
        entry.registered.store(true, Ordering::Release);
        entries.push(Arc::clone(entry));
        true
    }

    /// Removes `entry`. Returns `false` if it was not registered.
    pub(crate) fn remove(&self, entry: &Arc<ListenerEntry<St, X>>) -> bool {
        let mut entries = self.entries.lock();
        let Some(pos) = entries.iter().position(|e| Arc::ptr_eq(e, entry)) else {
            return false;
        };
        let removed = entries.remove(pos);
        removed.registered.store(false, Ordering::Release);
        true
    }

    /// Finds the entry registered for `(selector, effect)`.
    pub(crate) fn find(
        &self,
        selector: &Selector<St::State, St::Action>,
        effect: &EffectRef<St, X>,
    ) -> Option<Arc<ListenerEntry<St, X>>> {
        self.entries
            .lock()
            .iter()
            .find(|e| e.is_same(selector, effect))
            .cloned()
    }

    /// Entries in registration order, as of now.
    pub(crate) fn snapshot(&self) -> Vec<Arc<ListenerEntry<St, X>>> {
        self.entries.lock().clone()
    }

    /// Removes and returns every entry.
    pub(crate) fn drain(&self) -> Vec<Arc<ListenerEntry<St, X>>> {
        let drained = std::mem::take(&mut *self.entries.lock());
        for entry in &drained {
            entry.registered.store(false, Ordering::Release);
        }
        drained
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
