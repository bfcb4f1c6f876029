//! # Listener registration options and control actions.
//!
//! [`ListenerOptions`] pairs a [`Selector`] with an [`EffectRef`]. The same value is used
//! to start listening, to stop listening, and inside the dispatchable
//! [`ListenerAction`]s built by [`add_listener`], [`remove_listener`] and
//! [`clear_all_listeners`].

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::core::Unsubscribe;
use crate::listeners::selector::{ActionCreator, MatcherFn, PredicateFn, Selector};
use crate::listeners::EffectRef;
use crate::store::Store;

/// A `(selector, effect)` pair.
pub struct ListenerOptions<St: Store, X = ()> {
    pub(crate) selector: Selector<St::State, St::Action>,
    pub(crate) effect: EffectRef<St, X>,
}

impl<St: Store, X> ListenerOptions<St, X> {
    /// Pairs `selector` with `effect`.
    pub fn new(selector: Selector<St::State, St::Action>, effect: EffectRef<St, X>) -> Self {
        Self { selector, effect }
    }

    /// Listen for actions whose type string equals `ty`.
    pub fn action_type(ty: impl Into<Cow<'static, str>>, effect: EffectRef<St, X>) -> Self {
        Self::new(Selector::Type(ty.into()), effect)
    }

    /// Listen for actions built by `creator`.
    pub fn action_creator(
        creator: Arc<dyn ActionCreator<St::Action>>,
        effect: EffectRef<St, X>,
    ) -> Self {
        Self::new(Selector::ActionCreator(creator), effect)
    }

    /// Listen for actions accepted by `matcher`.
    pub fn matcher(matcher: MatcherFn<St::Action>, effect: EffectRef<St, X>) -> Self {
        Self::new(Selector::Matcher(matcher), effect)
    }

    /// Listen for actions for which `predicate(action, state_after, state_before)` holds.
    pub fn predicate(
        predicate: PredicateFn<St::State, St::Action>,
        effect: EffectRef<St, X>,
    ) -> Self {
        Self::new(Selector::Predicate(predicate), effect)
    }

    /// The selector.
    pub fn selector(&self) -> &Selector<St::State, St::Action> {
        &self.selector
    }

    /// The effect.
    pub fn effect(&self) -> &EffectRef<St, X> {
        &self.effect
    }
}

impl<St: Store, X> Clone for ListenerOptions<St, X> {
    fn clone(&self) -> Self {
        Self {
            selector: self.selector.clone(),
            effect: Arc::clone(&self.effect),
        }
    }
}

impl<St: Store, X> fmt::Debug for ListenerOptions<St, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerOptions")
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

/// Options for unsubscribing / removing a listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnsubscribeOptions {
    /// Also cancel the listener's running tasks with `listener-cancelled`.
    pub cancel_active: bool,
}

impl UnsubscribeOptions {
    /// Options with `cancel_active` enabled.
    pub fn cancel_active() -> Self {
        Self {
            cancel_active: true,
        }
    }
}

/// Dispatchable listener control action.
///
/// Intercepted by the middleware; never forwarded to the host store.
pub enum ListenerAction<St: Store, X = ()> {
    /// Register a listener.
    Add(ListenerOptions<St, X>),
    /// Remove a listener.
    Remove(ListenerOptions<St, X>, UnsubscribeOptions),
    /// Remove every listener and cancel their running tasks.
    ClearAll,
}

impl<St: Store, X> ListenerAction<St, X> {
    /// Stable type string of the control action.
    pub fn action_type(&self) -> &'static str {
        match self {
            ListenerAction::Add(_) => "listenerMiddleware/add",
            ListenerAction::Remove(..) => "listenerMiddleware/remove",
            ListenerAction::ClearAll => "listenerMiddleware/removeAll",
        }
    }
}

impl<St: Store, X> fmt::Debug for ListenerAction<St, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerAction::Add(o) => f.debug_tuple("Add").field(o).finish(),
            ListenerAction::Remove(o, opts) => f.debug_tuple("Remove").field(o).field(opts).finish(),
            ListenerAction::ClearAll => f.write_str("ClearAll"),
        }
    }
}

/// What dispatching a [`ListenerAction`] produced.
pub enum ListenerActionOutcome<St: Store, X = ()> {
    /// The listener is registered; the handle unsubscribes it.
    Subscribed(Unsubscribe<St, X>),
    /// Whether a matching listener was found and removed.
    Removed(bool),
    /// All listeners were cleared.
    Cleared,
}

impl<St: Store, X> ListenerActionOutcome<St, X> {
    /// Returns the unsubscribe handle of a `Subscribed` outcome.
    pub fn into_unsubscribe(self) -> Option<Unsubscribe<St, X>> {
        match self {
            ListenerActionOutcome::Subscribed(handle) => Some(handle),
            _ => None,
        }
    }

    /// Returns the flag of a `Removed` outcome.
    pub fn removed(&self) -> Option<bool> {
        match self {
            ListenerActionOutcome::Removed(found) => Some(*found),
            _ => None,
        }
    }
}

impl<St: Store, X> fmt::Debug for ListenerActionOutcome<St, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerActionOutcome::Subscribed(h) => f.debug_tuple("Subscribed").field(h).finish(),
            ListenerActionOutcome::Removed(found) => f.debug_tuple("Removed").field(found).finish(),
            ListenerActionOutcome::Cleared => f.write_str("Cleared"),
        }
    }
}

/// Builds the dispatchable "add listener" action.
pub fn add_listener<St: Store, X>(options: ListenerOptions<St, X>) -> ListenerAction<St, X> {
    ListenerAction::Add(options)
}

/// Builds the dispatchable "remove listener" action.
pub fn remove_listener<St: Store, X>(
    options: ListenerOptions<St, X>,
    opts: UnsubscribeOptions,
) -> ListenerAction<St, X> {
    ListenerAction::Remove(options, opts)
}

/// Builds the dispatchable "clear all listeners" action.
pub fn clear_all_listeners<St: Store, X>() -> ListenerAction<St, X> {
    ListenerAction::ClearAll
}
